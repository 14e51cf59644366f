//! Aggregation core: provider contract, registry, comment-tree fetching and
//! the cache-aware manager.
//!
//! # Architecture
//!
//! - [`types`] - Source, post and comment records shared by every layer
//! - [`provider`] - The [`Provider`] trait every content backend implements
//! - [`registry`] - Kind-keyed lookup of registered providers
//! - [`tree`] - Bounded-concurrency, order-preserving comment tree fetcher
//! - [`manager`] - TTL-gated fetching, subscriptions and cache maintenance
//!
//! # Example
//!
//! ```ignore
//! use skein::feed::{Manager, Registry};
//!
//! let registry = Arc::new(Registry::new());
//! skein::providers::register_defaults(&registry, client, &config);
//!
//! let manager = Manager::new(db, registry);
//! let posts = manager.fetch_all().await?;
//! ```

mod cancel;
mod http;
mod manager;
mod provider;
mod registry;
mod tree;
mod types;

pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use http::HttpClient;
pub use manager::{needs_refresh, Manager, ManagerError, ManagerSettings};
pub use provider::{FetchError, Provider};
pub use registry::{Registry, RegistryError};
pub use tree::{gather_ordered, FetchedNode, NodeSource, TreeFetcher, TreeLimits};
pub(crate) use types::from_unix;
pub use types::{Comment, Post, Source, SourceKind, SourceMetadata};
