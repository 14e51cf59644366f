use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Source Kinds
// ============================================================================

/// The closed set of source kinds a provider can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceKind {
    Reddit,
    HackerNews,
    Lobsters,
    Rss,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Reddit,
        SourceKind::HackerNews,
        SourceKind::Lobsters,
        SourceKind::Rss,
    ];

    /// Name stored in the `kind` column of the sources table.
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Reddit => "reddit",
            SourceKind::HackerNews => "hackernews",
            SourceKind::Lobsters => "lobsters",
            SourceKind::Rss => "rss",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// A subscribed feed instance.
///
/// `kind` is kept as the raw stored string so that a row naming a kind with no
/// registered provider can still be loaded and reported per-source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub id: i64,
    pub kind: String,
    /// Opaque to everything except the provider for `kind` (e.g. `rust:hot`, a URL)
    pub identifier: String,
    pub display_name: String,
    pub description: String,
    pub icon_url: String,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

/// Descriptive metadata returned by a successful source validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMetadata {
    /// Canonical identifier; this, not the caller's input, is what gets stored
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub icon_url: String,
}

/// A cached content item.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    /// Externally assigned id, unique within (source kind, source)
    pub id: String,
    pub source_id: i64,
    pub source_kind: String,
    pub source_name: String,
    pub title: String,
    pub author: String,
    pub permalink: String,
    pub url: String,
    pub score: i64,
    pub num_comments: i64,
    pub created_at: DateTime<Utc>,
    pub content: Option<String>,
    pub thumbnail: Option<String>,
    pub nsfw: bool,
    pub comments_fetched_at: Option<DateTime<Utc>>,
}

/// A single discussion node and its replies.
///
/// `depth` and `parent_id` are assigned when replies are attached, so a tree
/// built through [`Comment::with_replies`] always has
/// `reply.depth == parent.depth + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: String,
    pub author: String,
    pub body: String,
    pub score: i64,
    pub created_at: DateTime<Utc>,
    parent_id: Option<String>,
    depth: u32,
    replies: Vec<Comment>,
}

impl Comment {
    /// Creates a childless top-level comment (depth 0, no parent).
    pub fn new(
        id: impl Into<String>,
        author: impl Into<String>,
        body: impl Into<String>,
        score: i64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            author: author.into(),
            body: body.into(),
            score,
            created_at,
            parent_id: None,
            depth: 0,
            replies: Vec::new(),
        }
    }

    /// Attaches `replies` below this comment, re-basing each reply subtree.
    pub fn with_replies(mut self, replies: Vec<Comment>) -> Self {
        self.replies = replies;
        self.rebase(self.depth, self.parent_id.clone());
        self
    }

    fn rebase(&mut self, depth: u32, parent_id: Option<String>) {
        self.depth = depth;
        self.parent_id = parent_id;
        let child_depth = depth + 1;
        for reply in &mut self.replies {
            reply.rebase(child_depth, Some(self.id.clone()));
        }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    pub fn replies(&self) -> &[Comment] {
        &self.replies
    }

    /// Total number of comments in this subtree, including `self`.
    pub fn count(&self) -> usize {
        1 + self.replies.iter().map(Comment::count).sum::<usize>()
    }
}

/// Unix seconds to UTC, falling back to the epoch for out-of-range values.
pub(crate) fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}
