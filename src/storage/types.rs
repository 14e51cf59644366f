use thiserror::Error;

use crate::feed::{from_unix, Post, Source};

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another instance of the application has locked the database
    #[error("Another instance of skein appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// Posts are keyed by external id; an empty one cannot be stored
    #[error("Post has an empty external id")]
    EmptyExternalId,

    /// A uniqueness constraint rejected the write
    #[error("Row already exists")]
    AlreadyExists,

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }

    /// Like [`DatabaseError::from_sqlx`], but a unique-constraint violation
    /// becomes [`DatabaseError::AlreadyExists`]
    pub(crate) fn from_insert(err: sqlx::Error) -> Self {
        match err.as_database_error() {
            Some(db_err) if db_err.is_unique_violation() => DatabaseError::AlreadyExists,
            _ => Self::from_sqlx(err),
        }
    }
}

pub(crate) fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

// ============================================================================
// Write Inputs & Outcomes
// ============================================================================

/// A source ready to be inserted, built from validated metadata.
#[derive(Debug, Clone)]
pub struct NewSource {
    pub kind: String,
    pub identifier: String,
    pub display_name: String,
    pub description: String,
    pub icon_url: String,
}

/// Whether an upsert created a row or refreshed an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Row counts removed by a cache clear or purge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheCleared {
    pub posts: u64,
    pub comments: u64,
}

// ============================================================================
// Row Types
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct SourceRow {
    pub id: i64,
    pub kind: String,
    pub identifier: String,
    pub display_name: String,
    pub description: String,
    pub icon_url: String,
    pub last_fetched: Option<i64>,
}

impl SourceRow {
    pub(crate) fn into_source(self) -> Source {
        Source {
            id: self.id,
            kind: self.kind,
            identifier: self.identifier,
            display_name: self.display_name,
            description: self.description,
            icon_url: self.icon_url,
            last_fetched_at: self.last_fetched.map(from_unix),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct PostRow {
    pub source_id: i64,
    pub source_kind: String,
    pub external_id: String,
    pub source_name: String,
    pub title: String,
    pub author: String,
    pub permalink: String,
    pub url: String,
    pub score: i64,
    pub num_comments: i64,
    pub created_utc: i64,
    pub content: Option<String>,
    pub thumbnail: Option<String>,
    pub nsfw: bool,
    pub comments_fetched: Option<i64>,
}

impl PostRow {
    pub(crate) fn into_post(self) -> Post {
        Post {
            id: self.external_id,
            source_id: self.source_id,
            source_kind: self.source_kind,
            source_name: self.source_name,
            title: self.title,
            author: self.author,
            permalink: self.permalink,
            url: self.url,
            score: self.score,
            num_comments: self.num_comments,
            created_at: from_unix(self.created_utc),
            content: self.content,
            thumbnail: self.thumbnail,
            nsfw: self.nsfw,
            comments_fetched_at: self.comments_fetched.map(from_unix),
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CommentRow {
    pub id: i64,
    pub parent_id: Option<i64>,
    pub external_id: String,
    pub author: String,
    pub body: String,
    pub score: i64,
    pub created_utc: i64,
}
