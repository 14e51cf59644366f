//! skein aggregates posts and comment threads from Reddit, Hacker News,
//! Lobsters and RSS/Atom feeds behind one cached, TTL-gated interface.

pub mod config;
pub mod feed;
pub mod providers;
pub mod storage;
pub mod util;
