//! Work targets for a personal time tracker. Resolves the calendar window a daily, weekly,
//! monthly or tomorrow target applies to, picks the target that should be highlighted right now
//! and measures recorded sessions against it.
//!

pub mod cli;
pub mod config;
pub mod storage;
pub mod targets;
pub mod utils;
