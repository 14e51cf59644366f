use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;

use super::cancel::CancelToken;
use super::provider::FetchError;
use super::registry::{Registry, RegistryError};
use super::types::{Comment, Post, Source};
use crate::storage::{CacheCleared, Database, DatabaseError, NewSource, UpsertOutcome};

const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Errors surfaced to callers of [`Manager`].
///
/// Inside [`Manager::fetch_all`] every variant except a failure to load the
/// source list is contained to the source that produced it.
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    UnknownKind(#[from] RegistryError),
    #[error("already subscribed to this source")]
    AlreadySubscribed,
    #[error("source not found: {0}")]
    NotFound(i64),
    /// The provider rejected the identifier; shown to the caller unchanged
    #[error(transparent)]
    Validation(FetchError),
    #[error(transparent)]
    Fetch(FetchError),
    #[error("fetch cancelled")]
    Cancelled,
    #[error(transparent)]
    Storage(#[from] DatabaseError),
}

/// Cache policy for a [`Manager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerSettings {
    /// Maximum age of a source's cached posts before it is fetched again
    pub refresh_interval: Duration,
    /// Maximum age of a cached comment tree; `None` makes every call live
    pub comment_cache_ttl: Option<Duration>,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            comment_cache_ttl: None,
        }
    }
}

/// Whether something last fetched at `last` must be fetched again at `now`.
///
/// A `last` in the future (clock skew) counts as fresh.
pub fn needs_refresh(last: Option<DateTime<Utc>>, now: DateTime<Utc>, interval: Duration) -> bool {
    match last {
        None => true,
        Some(last) => match (now - last).to_std() {
            Ok(elapsed) => elapsed > interval,
            Err(_) => false,
        },
    }
}

/// Orchestrates fetching, caching and subscriptions across all sources.
///
/// Cheap to clone: the database is a pool handle and the registry is shared.
#[derive(Clone)]
pub struct Manager {
    db: Database,
    registry: Arc<Registry>,
    settings: ManagerSettings,
}

impl Manager {
    pub fn new(db: Database, registry: Arc<Registry>) -> Self {
        Self {
            db,
            registry,
            settings: ManagerSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ManagerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> ManagerSettings {
        self.settings
    }

    // ========================================================================
    // Aggregate Fetch
    // ========================================================================

    /// Posts from every subscribed source, fetched or served from cache.
    ///
    /// See [`Manager::fetch_all_with_cancel`].
    pub async fn fetch_all(&self) -> Result<Vec<Post>, ManagerError> {
        self.fetch_all_with_cancel(CancelToken::never()).await
    }

    /// Posts from every subscribed source, one task per source.
    ///
    /// A source that fails (unknown kind, network, parse, cancellation)
    /// is logged and contributes nothing; it never fails the call or delays
    /// the other sources. The result has no cross-source ordering.
    /// Dropping the returned future aborts all in-flight source tasks.
    ///
    /// # Errors
    ///
    /// Only a failure to load the source list is returned.
    pub async fn fetch_all_with_cancel(
        &self,
        cancel: CancelToken,
    ) -> Result<Vec<Post>, ManagerError> {
        let sources = self.db.list_sources().await?;
        if sources.is_empty() {
            return Ok(Vec::new());
        }

        let total = sources.len();
        let mut tasks = JoinSet::new();

        for source in sources {
            let manager = self.clone();
            let mut cancel = cancel.clone();
            tasks.spawn(async move {
                let outcome = tokio::select! {
                    result = manager.refresh_source(&source) => result,
                    _ = cancel.cancelled() => Err(ManagerError::Cancelled),
                };

                match outcome {
                    Ok(posts) => posts,
                    Err(e) => {
                        tracing::warn!(
                            source_id = source.id,
                            kind = %source.kind,
                            identifier = %source.identifier,
                            error = %e,
                            "Source fetch failed, skipping"
                        );
                        Vec::new()
                    }
                }
            });
        }

        let mut all_posts = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(posts) => all_posts.extend(posts),
                Err(e) => tracing::warn!(error = %e, "Source task did not complete"),
            }
        }

        tracing::debug!(sources = total, posts = all_posts.len(), "Aggregate fetch complete");
        Ok(all_posts)
    }

    /// Cache-or-fetch for one source.
    ///
    /// Fresh sources are served from the store without a network call. Stale
    /// ones are fetched; the fetch timestamp advances even when the provider
    /// returns nothing, and each post is upserted on its own so a single bad
    /// row cannot sink the batch. The fetched list is returned, not a re-read.
    async fn refresh_source(&self, source: &Source) -> Result<Vec<Post>, ManagerError> {
        let provider = self.registry.resolve(&source.kind)?;
        let now = Utc::now();

        if !needs_refresh(source.last_fetched_at, now, self.settings.refresh_interval) {
            let cached = self.db.posts_for_source(source.id).await?;
            tracing::debug!(
                source_id = source.id,
                posts = cached.len(),
                "Serving cached posts"
            );
            return Ok(cached);
        }

        let mut posts = provider
            .fetch_posts(source)
            .await
            .map_err(ManagerError::Fetch)?;

        tracing::debug!(
            source_id = source.id,
            kind = %source.kind,
            fetched = posts.len(),
            "Fetched posts"
        );

        if let Err(e) = self.db.set_source_fetched(source.id, now).await {
            tracing::warn!(source_id = source.id, error = %e, "Failed to record fetch time");
        }

        let mut saved = 0usize;
        for post in posts.iter_mut() {
            post.source_id = source.id;
            if post.id.is_empty() {
                tracing::debug!(source_id = source.id, title = %post.title, "Post has empty id, not caching");
                continue;
            }

            match self.db.upsert_post(source.id, post).await {
                Ok(UpsertOutcome::Inserted) => saved += 1,
                Ok(UpsertOutcome::Updated) => {}
                Err(e) => tracing::warn!(
                    source_id = source.id,
                    post_id = %post.id,
                    error = %e,
                    "Failed to cache post, skipping"
                ),
            }
        }

        tracing::info!(
            source_id = source.id,
            display_name = %source.display_name,
            saved = saved,
            "Saved new posts"
        );
        Ok(posts)
    }

    // ========================================================================
    // Comments
    // ========================================================================

    /// The comment tree of `post`, from its provider.
    ///
    /// With a comment cache TTL configured and the post cached, a tree stored
    /// within the TTL is returned without a network call; otherwise the live
    /// tree replaces the stored one.
    pub async fn fetch_comments(&self, post: &Post) -> Result<Vec<Comment>, ManagerError> {
        let provider = self.registry.resolve(&post.source_kind)?;

        let Some(ttl) = self.settings.comment_cache_ttl else {
            return provider
                .fetch_comments(post)
                .await
                .map_err(ManagerError::Fetch);
        };

        let stored = self
            .db
            .find_post(&post.source_kind, &post.id, post.source_id)
            .await?;
        let Some((post_row_id, stored)) = stored else {
            return provider
                .fetch_comments(post)
                .await
                .map_err(ManagerError::Fetch);
        };

        let now = Utc::now();
        if !needs_refresh(stored.comments_fetched_at, now, ttl) {
            tracing::debug!(post_id = %post.id, "Serving cached comments");
            return Ok(self.db.load_comment_tree(post_row_id).await?);
        }

        let comments = provider
            .fetch_comments(post)
            .await
            .map_err(ManagerError::Fetch)?;

        match self.db.replace_comments(post_row_id, &comments).await {
            Ok(written) => {
                tracing::debug!(post_id = %post.id, comments = written, "Cached comments");
                if let Err(e) = self.db.set_comments_fetched(post_row_id, Some(now)).await {
                    tracing::warn!(post_id = %post.id, error = %e, "Failed to record comment fetch time");
                }
            }
            Err(e) => tracing::warn!(post_id = %post.id, error = %e, "Failed to cache comments"),
        }

        Ok(comments)
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Validate and store a new subscription.
    ///
    /// The stored identifier is the provider's canonical name, which may
    /// differ from `identifier` (e.g. `rust` becomes `rust:best`).
    ///
    /// # Errors
    ///
    /// - [`ManagerError::AlreadySubscribed`] if `(kind, identifier)` or its
    ///   canonical form is already stored
    /// - [`ManagerError::UnknownKind`] if no provider serves `kind`
    /// - [`ManagerError::Validation`] with the provider's own error otherwise
    pub async fn subscribe(&self, kind: &str, identifier: &str) -> Result<Source, ManagerError> {
        if self.db.find_source(kind, identifier).await?.is_some() {
            return Err(ManagerError::AlreadySubscribed);
        }

        let provider = self.registry.resolve(kind)?;
        let metadata = provider
            .validate_source(identifier)
            .await
            .map_err(ManagerError::Validation)?;

        if metadata.name != identifier && self.db.find_source(kind, &metadata.name).await?.is_some()
        {
            return Err(ManagerError::AlreadySubscribed);
        }

        // A concurrent subscribe may win between the lookups and the insert
        let source = self
            .db
            .insert_source(&NewSource {
                kind: provider.kind().as_str().to_string(),
                identifier: metadata.name,
                display_name: metadata.display_name,
                description: metadata.description,
                icon_url: metadata.icon_url,
            })
            .await
            .map_err(|e| match e {
                DatabaseError::AlreadyExists => ManagerError::AlreadySubscribed,
                other => ManagerError::Storage(other),
            })?;

        tracing::info!(
            source_id = source.id,
            kind = %source.kind,
            identifier = %source.identifier,
            "Subscribed"
        );
        Ok(source)
    }

    /// Remove a subscription and everything cached for it.
    pub async fn unsubscribe(&self, id: i64) -> Result<(), ManagerError> {
        if self.db.delete_source(id).await? == 0 {
            return Err(ManagerError::NotFound(id));
        }
        tracing::info!(source_id = id, "Unsubscribed");
        Ok(())
    }

    pub async fn list_sources(&self) -> Result<Vec<Source>, ManagerError> {
        Ok(self.db.list_sources().await?)
    }

    // ========================================================================
    // Cache Maintenance
    // ========================================================================

    /// Drop all cached posts and comments; the next fetch goes upstream.
    pub async fn clear_cache(&self) -> Result<CacheCleared, ManagerError> {
        let cleared = self.db.clear_cache().await?;
        tracing::info!(
            posts = cleared.posts,
            comments = cleared.comments,
            "Cache cleared"
        );
        Ok(cleared)
    }

    /// Drop posts and comments first cached more than `age` ago.
    pub async fn purge_older_than(&self, age: Duration) -> Result<CacheCleared, ManagerError> {
        let age = chrono::Duration::from_std(age).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now()
            .checked_sub_signed(age)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let purged = self.db.purge_cached_before(cutoff).await?;
        tracing::info!(
            posts = purged.posts,
            comments = purged.comments,
            "Purged old cache entries"
        );
        Ok(purged)
    }
}
