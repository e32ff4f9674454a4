//! Core engine: the round-robin scan → evaluate → alert loop.

pub mod broadcaster;
pub mod dedup;
pub mod history;
pub mod scanner;
