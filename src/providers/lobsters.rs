use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::feed::{
    from_unix, Comment, FetchError, HttpClient, Post, Provider, Source, SourceKind,
    SourceMetadata,
};

const BASE_URL: &str = "https://lobste.rs";
const CATEGORIES: [&str; 2] = ["active", "recent"];

#[derive(Debug, Deserialize)]
struct Story {
    short_id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    comment_count: i64,
    #[serde(default)]
    description: String,
    #[serde(default)]
    comments_url: String,
    #[serde(default)]
    submitter_user: User,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    comments: Vec<RawComment>,
}

#[derive(Debug, Deserialize)]
struct RawComment {
    short_id: String,
    #[serde(default)]
    comment_plain: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    commenting_user: User,
    #[serde(default)]
    comments: Vec<RawComment>,
}

/// Older payloads give the user as a bare name, newer ones as an object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum User {
    Name(String),
    Profile { username: String },
}

impl Default for User {
    fn default() -> Self {
        User::Name(String::new())
    }
}

impl User {
    fn into_name(self) -> String {
        match self {
            User::Name(name) | User::Profile { username: name } => name,
        }
    }
}

fn parse_time(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| from_unix(0))
}

fn check_category(identifier: &str) -> Result<&str, FetchError> {
    if CATEGORIES.contains(&identifier) {
        Ok(identifier)
    } else {
        Err(FetchError::InvalidSource(format!(
            "invalid lobsters category: {identifier} (use 'active' or 'recent')"
        )))
    }
}

/// Lobste.rs story lists and their threaded comments.
#[derive(Debug, Clone)]
pub struct LobstersProvider {
    http: HttpClient,
    base_url: String,
}

impl LobstersProvider {
    pub fn new(http: HttpClient) -> Self {
        Self::with_base_url(http, BASE_URL)
    }

    pub fn with_base_url(http: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl Provider for LobstersProvider {
    fn kind(&self) -> SourceKind {
        SourceKind::Lobsters
    }

    async fn fetch_posts(&self, source: &Source) -> Result<Vec<Post>, FetchError> {
        let category = check_category(&source.identifier)?;
        let url = format!("{}/{}.json", self.base_url, category);

        let stories: Vec<Story> = self.http.get_json(&url).await?;
        Ok(stories
            .into_iter()
            .map(|story| to_post(story, source.id, category))
            .collect())
    }

    async fn fetch_comments(&self, post: &Post) -> Result<Vec<Comment>, FetchError> {
        let url = format!("{}/s/{}.json", self.base_url, post.id);
        let story: Story = self.http.get_json(&url).await?;
        Ok(story.comments.into_iter().map(to_comment).collect())
    }

    async fn validate_source(&self, identifier: &str) -> Result<SourceMetadata, FetchError> {
        let category = check_category(identifier)?;
        Ok(SourceMetadata {
            name: category.to_string(),
            display_name: format!("Lobsters - {category}"),
            description: format!("Lobste.rs {category} stories"),
            icon_url: format!("{BASE_URL}/apple-touch-icon-144.png"),
        })
    }
}

fn to_post(story: Story, source_id: i64, category: &str) -> Post {
    Post {
        id: story.short_id,
        source_id,
        source_kind: SourceKind::Lobsters.as_str().to_string(),
        source_name: format!("lobsters/{category}"),
        title: story.title,
        author: story.submitter_user.into_name(),
        permalink: story.comments_url,
        url: story.url,
        score: story.score,
        num_comments: story.comment_count,
        created_at: parse_time(&story.created_at),
        content: (!story.description.is_empty()).then_some(story.description),
        thumbnail: None,
        nsfw: false,
        comments_fetched_at: None,
    }
}

fn to_comment(raw: RawComment) -> Comment {
    let replies = raw.comments.into_iter().map(to_comment).collect();
    Comment::new(
        raw.short_id,
        raw.commenting_user.into_name(),
        raw.comment_plain,
        raw.score,
        parse_time(&raw.created_at),
    )
    .with_replies(replies)
}
