//! Built-in source backends.
//!
//! Each provider owns a clone of the shared [`HttpClient`] and can be pointed
//! at a different base URL, which is how the tests run them against a mock
//! server.

mod hackernews;
mod lobsters;
mod reddit;
mod rss;

use std::sync::Arc;

use crate::config::Config;
use crate::feed::{HttpClient, Registry};

pub use hackernews::HackerNewsProvider;
pub use lobsters::LobstersProvider;
pub use reddit::RedditProvider;
pub use rss::RssProvider;

/// Registers the Reddit, Hacker News, Lobsters and RSS providers.
pub fn register_defaults(registry: &Registry, http: &HttpClient, config: &Config) {
    registry.register(Arc::new(RedditProvider::new(http.clone())));
    registry.register(Arc::new(HackerNewsProvider::new(
        http.clone(),
        config.tree_limits(),
    )));
    registry.register(Arc::new(LobstersProvider::new(http.clone())));
    registry.register(Arc::new(RssProvider::new(
        http.clone(),
        config.allow_private_hosts,
    )));
}
