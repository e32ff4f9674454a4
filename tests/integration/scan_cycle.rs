//! Full scan cycles through the public API.
//!
//! Each test wires a `MockMarket` into a `Scanner`, drives it tick by tick,
//! and checks what viewers observe on their subscriptions.

use std::time::Duration;

use trend_scanner::engine::broadcaster::Subscription;
use trend_scanner::engine::scanner::{Scanner, ScannerHandle, ScannerOptions, TickOutcome};
use trend_scanner::types::{
    ConfigUpdate, ScanConfig, ScanEvent, ScanSettings, SettingsPatch, Trend, TurnType,
};

use crate::mock_market::MockMarket;

fn setup(symbols: &[&str], market: &MockMarket) -> (ScannerHandle, Scanner) {
    let config = ScanConfig {
        symbols: symbols.iter().map(|s| s.to_string()).collect(),
        settings: ScanSettings::default(),
    };
    let handle = ScannerHandle::new(config, 1024);
    let scanner = Scanner::new(&handle, Box::new(market.clone()), ScannerOptions::default());
    (handle, scanner)
}

fn drain(sub: &mut Subscription) -> Vec<ScanEvent> {
    let mut out = Vec::new();
    while let Some(ev) = sub.try_recv() {
        out.push((*ev).clone());
    }
    out
}

fn alerts(events: &[ScanEvent]) -> Vec<(String, TurnType)> {
    events
        .iter()
        .filter_map(|ev| match ev {
            ScanEvent::Alert(a) => Some((a.sym.clone(), a.turn)),
            _ => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Cursor and configuration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_cursor_equals_ticks_mod_len() {
    let market = MockMarket::new();
    let (handle, mut scanner) = setup(&["A", "B", "C", "D", "E"], &market);
    handle.start();

    for n in 1..=23 {
        scanner.tick().await;
        assert_eq!(scanner.cursor(), n % 5);
    }
    assert_eq!(market.calls().len(), 23);
    assert_eq!(&market.calls()[..6], ["A", "B", "C", "D", "E", "A"]);
}

#[tokio::test]
async fn test_list_replacement_mid_cycle() {
    let market = MockMarket::new();
    market.script("A", &[101.0]);
    market.script("B", &[99.0]);
    let (handle, mut scanner) = setup(&["A", "B", "C"], &market);
    handle.start();

    scanner.tick().await;
    scanner.tick().await;
    assert_eq!(scanner.trend("A"), Some(Trend::Up));
    assert_eq!(scanner.trend("B"), Some(Trend::Down));

    // Same symbols supplied again still count as a replacement.
    let snapshot = handle
        .apply_config(ConfigUpdate {
            symbols: Some(vec!["a".into(), "b".into(), "c".into()]),
            settings: None,
        })
        .unwrap();
    assert_eq!(snapshot.symbols_count, 3);

    match scanner.tick().await {
        TickOutcome::Scanned { symbol, .. } => assert_eq!(symbol, "A"),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(scanner.trend("B"), None);
    assert_eq!(scanner.tracked_symbols(), 1);
}

#[tokio::test]
async fn test_replace_and_stop_during_tick_apply_at_boundary() {
    let market = MockMarket::new();
    market.script("A", &[101.0]);
    let (handle, mut scanner) = setup(&["A", "B"], &market);
    handle.start();

    let gate = market.gate_next_fetch();
    let control = async {
        gate.entered.notified().await;
        handle
            .apply_config(ConfigUpdate {
                symbols: Some(vec!["X".into(), "Y".into()]),
                settings: None,
            })
            .unwrap();
        assert!(handle.stop());
        gate.release.notify_one();
    };
    let (in_flight, ()) = tokio::join!(scanner.tick(), control);

    // The running tick finishes on the configuration it started with.
    assert_eq!(
        in_flight,
        TickOutcome::Scanned {
            symbol: "A".into(),
            alert: None
        }
    );
    assert_eq!(scanner.trend("A"), Some(Trend::Up));
    assert_eq!(scanner.cursor(), 1);

    // The next boundary adopts the new list, then honours the stop.
    assert_eq!(scanner.tick().await, TickOutcome::Idle);
    assert_eq!(scanner.tracked_symbols(), 0);
    assert_eq!(scanner.cursor(), 0);

    handle.start();
    match scanner.tick().await {
        TickOutcome::Scanned { symbol, .. } => assert_eq!(symbol, "X"),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(scanner.tracked_symbols(), 1);
    assert_eq!(market.calls(), ["A", "X"]);
}

#[tokio::test]
async fn test_emptied_list_goes_idle() {
    let market = MockMarket::new();
    let (handle, mut scanner) = setup(&["A", "B"], &market);
    handle.start();
    scanner.tick().await;

    handle
        .apply_config(ConfigUpdate {
            symbols: Some(Vec::new()),
            settings: None,
        })
        .unwrap();
    assert_eq!(scanner.tick().await, TickOutcome::Idle);
    assert_eq!(scanner.cursor(), 0);
    assert_eq!(scanner.tracked_symbols(), 0);
}

// ---------------------------------------------------------------------------
// Signals and alerts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_neutral_up_down_confirm() {
    let market = MockMarket::new();
    market.script("A", &[100.0, 100.5, 99.0]);
    let (handle, mut scanner) = setup(&["A"], &market);
    let mut sub = handle.subscribe();
    handle.start();

    let mut trends = Vec::new();
    for _ in 0..3 {
        scanner.tick().await;
        trends.push(scanner.trend("A").unwrap());
    }
    assert_eq!(trends, [Trend::Neutral, Trend::Up, Trend::Down]);

    let events = drain(&mut sub);
    let kinds: Vec<_> = events.iter().map(ScanEvent::kind).collect();
    assert_eq!(kinds, ["hello", "scan", "scan", "scan", "alert"]);
    match &events[4] {
        ScanEvent::Alert(a) => {
            assert_eq!(a.turn, TurnType::Confirm);
            assert_eq!(a.dir, "UP→DOWN");
            assert_eq!(a.price, 99.0);
            assert_eq!(a.ma30, 100.0);
            assert_eq!(a.ttl_ms, 300_000);
        }
        other => panic!("expected alert, got {other:?}"),
    }
}

#[tokio::test]
async fn test_near_deduplicated_across_cycles() {
    let market = MockMarket::new();
    market.script("A", &[101.0, 99.8]);
    let (handle, mut scanner) = setup(&["A", "B"], &market);
    let mut sub = handle.subscribe();
    handle.start();

    // Four full cycles; A hovers near the lower edge from cycle two on.
    for _ in 0..8 {
        assert!(matches!(scanner.tick().await, TickOutcome::Scanned { .. }));
    }

    assert_eq!(alerts(&drain(&mut sub)), [("A".to_string(), TurnType::Near)]);
    assert_eq!(scanner.trend("A"), Some(Trend::Up));
}

#[tokio::test]
async fn test_confirm_follows_near_immediately() {
    let market = MockMarket::new();
    market.script("A", &[101.0, 99.8, 99.0]);
    let (handle, mut scanner) = setup(&["A"], &market);
    let mut sub = handle.subscribe();
    handle.start();

    for _ in 0..3 {
        scanner.tick().await;
    }
    assert_eq!(
        alerts(&drain(&mut sub)),
        [
            ("A".to_string(), TurnType::Near),
            ("A".to_string(), TurnType::Confirm)
        ]
    );
}

#[tokio::test]
async fn test_rsi_filter_drops_disagreeing_alert() {
    let market = MockMarket::new();
    // Falling closes: RSI14 = 0, MA30 = 100 over the last 30.
    let mut closes: Vec<f64> = (0..31).map(|i| 115.0 - i as f64).collect();
    let shift = 100.0 - closes[1..].iter().sum::<f64>() / 30.0;
    closes.iter_mut().for_each(|c| *c += shift);
    market.set_closes("A", closes);
    // DOWN → UP reversal with RSI at 0.
    market.script("A", &[99.0, 101.0]);

    let (handle, mut scanner) = setup(&["A"], &market);
    handle
        .apply_config(ConfigUpdate {
            symbols: None,
            settings: Some(SettingsPatch {
                rsi_filter: Some(true),
                ..Default::default()
            }),
        })
        .unwrap();
    let mut sub = handle.subscribe();
    handle.start();

    scanner.tick().await;
    assert_eq!(
        scanner.tick().await,
        TickOutcome::Scanned {
            symbol: "A".into(),
            alert: None
        }
    );
    assert_eq!(scanner.trend("A"), Some(Trend::Up));
    assert!(alerts(&drain(&mut sub)).is_empty());
}

// ---------------------------------------------------------------------------
// Failure isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_failing_symbol_isolated() {
    let market = MockMarket::new();
    market.script("A", &[101.0]);
    market.script("C", &[99.0]);
    let (handle, mut scanner) = setup(&["A", "B", "C"], &market);
    let mut sub = handle.subscribe();
    handle.start();

    for _ in 0..3 {
        scanner.tick().await;
    }
    market.set_error("A");
    market.set_closes("C", vec![100.0; 5]);

    assert!(matches!(scanner.tick().await, TickOutcome::Failed { .. }));
    assert!(matches!(scanner.tick().await, TickOutcome::Scanned { .. }));
    assert!(matches!(scanner.tick().await, TickOutcome::Failed { .. }));

    assert_eq!(scanner.trend("A"), Some(Trend::Up));
    assert_eq!(scanner.trend("C"), Some(Trend::Down));

    let errors: Vec<_> = drain(&mut sub)
        .into_iter()
        .filter_map(|ev| match ev {
            ScanEvent::Error { sym, message } => Some((sym, message)),
            _ => None,
        })
        .collect();
    assert_eq!(
        errors,
        [
            ("A".to_string(), "HTTP 503 service unavailable".to_string()),
            (
                "C".to_string(),
                "not enough candles for C: have 5, need 31".to_string()
            ),
        ]
    );

    // Next visit is the retry.
    market.clear_error("A");
    assert!(matches!(scanner.tick().await, TickOutcome::Scanned { .. }));
}

// ---------------------------------------------------------------------------
// Viewers
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_viewer_disconnect_isolated() {
    let market = MockMarket::new();
    let (handle, mut scanner) = setup(&["A"], &market);
    let mut first = handle.subscribe();
    let leaving = handle.subscribe();
    let mut third = handle.subscribe();
    handle.start();

    scanner.tick().await;
    drop(leaving);
    assert_eq!(handle.broadcaster().subscriber_count(), 2);
    scanner.tick().await;

    for sub in [&mut first, &mut third] {
        let kinds: Vec<_> = drain(sub).iter().map(|ev| ev.kind()).collect();
        assert_eq!(kinds, ["hello", "scan", "scan"]);
    }
}

#[tokio::test]
async fn test_late_viewer_sees_current_snapshot() {
    let market = MockMarket::new();
    let (handle, mut scanner) = setup(&["A", "B"], &market);
    handle.start();
    scanner.tick().await;

    let mut sub = handle.subscribe();
    match &*sub.recv().await.unwrap() {
        ScanEvent::Hello(snapshot) => {
            assert!(snapshot.running);
            assert_eq!(snapshot.symbols_count, 2);
        }
        other => panic!("expected hello, got {other:?}"),
    }
    assert!(sub.try_recv().is_none());
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_start_stop_idempotent_through_loop() {
    let market = MockMarket::new();
    let handle = ScannerHandle::new(
        ScanConfig {
            symbols: vec!["A".into(), "B".into()],
            settings: ScanSettings::default(),
        },
        1024,
    );
    let options = ScannerOptions {
        tick_delay: Duration::from_millis(1),
        idle_retry: Duration::from_millis(5),
    };
    let scanner = Scanner::new(&handle, Box::new(market.clone()), options);
    let task = tokio::spawn(scanner.run());

    // Stopped: nothing is fetched.
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(market.calls().is_empty());

    assert!(handle.start());
    assert!(!handle.start());
    let mut sub = handle.subscribe();
    for _ in 0..3 {
        loop {
            let ev = tokio::time::timeout(Duration::from_secs(5), sub.recv())
                .await
                .unwrap()
                .unwrap();
            if ev.kind() == "scan" {
                break;
            }
        }
    }

    assert!(handle.stop());
    assert!(!handle.stop());
    tokio::time::sleep(Duration::from_millis(30)).await;
    let calls = market.calls().len();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(market.calls().len(), calls);

    drop(sub);
    drop(handle);
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();
}
