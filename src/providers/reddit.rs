use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::feed::{
    from_unix, Comment, FetchError, HttpClient, Post, Provider, Source, SourceKind,
    SourceMetadata,
};

const BASE_URL: &str = "https://www.reddit.com";
const DEFAULT_SORT: &str = "best";
const SORTS: [&str; 5] = ["hot", "new", "rising", "top", "best"];

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct Listing<T> {
    data: ListingData<T>,
}

#[derive(Debug, Deserialize)]
struct ListingData<T> {
    #[serde(default = "Vec::new")]
    children: Vec<Thing<T>>,
}

#[derive(Debug, Deserialize)]
struct Thing<T> {
    #[serde(default)]
    kind: String,
    data: T,
}

#[derive(Debug, Deserialize)]
struct RawPost {
    #[serde(default)]
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    num_comments: i64,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    is_self: bool,
    #[serde(default)]
    selftext: String,
    #[serde(default)]
    thumbnail: String,
    #[serde(default)]
    over_18: bool,
}

/// `t1` payload. `replies` is either `""` or a nested listing.
#[derive(Debug, Deserialize)]
struct RawComment {
    #[serde(default)]
    id: String,
    author: Option<String>,
    body: Option<String>,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    replies: Value,
}

#[derive(Debug, Deserialize)]
struct About {
    data: AboutData,
}

#[derive(Debug, Deserialize)]
struct AboutData {
    display_name: Option<String>,
    #[serde(default)]
    public_description: String,
    #[serde(default)]
    icon_img: String,
}

// ============================================================================
// Identifier
// ============================================================================

/// `name[:sort]`, with the sort defaulting to `best`.
fn parse_identifier(identifier: &str) -> (&str, &str) {
    match identifier.split_once(':') {
        Some((name, sort)) => (name, sort),
        None => (identifier, DEFAULT_SORT),
    }
}

fn check_identifier(identifier: &str) -> Result<(&str, &str), FetchError> {
    let (name, sort) = parse_identifier(identifier);

    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(FetchError::InvalidSource(format!(
            "invalid subreddit name: {name:?}"
        )));
    }
    if !SORTS.contains(&sort) {
        return Err(FetchError::InvalidSource(format!(
            "invalid sort type: {sort} (use hot, new, rising, top, or best)"
        )));
    }
    Ok((name, sort))
}

// ============================================================================
// Provider
// ============================================================================

/// Subreddit listings through Reddit's public JSON endpoints.
#[derive(Debug, Clone)]
pub struct RedditProvider {
    http: HttpClient,
    base_url: String,
}

impl RedditProvider {
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
impl Provider for RedditProvider {
    fn kind(&self) -> SourceKind {
        SourceKind::Reddit
    }

    async fn fetch_posts(&self, source: &Source) -> Result<Vec<Post>, FetchError> {
        let (name, sort) = check_identifier(&source.identifier)?;
        let url = format!("{}/r/{}/{}.json", self.base_url, name, sort);

        let listing: Listing<RawPost> = self.http.get_json(&url).await?;
        let posts: Vec<Post> = listing
            .data
            .children
            .into_iter()
            .map(|thing| to_post(thing.data, source, name))
            .filter(|post| !post.id.is_empty())
            .collect();

        tracing::debug!(subreddit = name, sort = sort, posts = posts.len(), "Parsed listing");
        Ok(posts)
    }

    async fn fetch_comments(&self, post: &Post) -> Result<Vec<Comment>, FetchError> {
        if post.permalink.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!(
            "{}{}.json",
            self.base_url,
            post.permalink.trim_end_matches('/')
        );

        // [post listing, comment listing]
        let pages: Vec<Value> = self.http.get_json(&url).await?;
        let Some(comment_page) = pages.into_iter().nth(1) else {
            return Ok(Vec::new());
        };

        Ok(parse_comment_listing(comment_page))
    }

    async fn validate_source(&self, identifier: &str) -> Result<SourceMetadata, FetchError> {
        let (name, sort) = check_identifier(identifier)?;
        let url = format!("{}/r/{}/about.json", self.base_url, name);

        let not_found = || FetchError::InvalidSource("subreddit not found or unavailable".into());

        let about: About = match self.http.get_json(&url).await {
            Ok(about) => about,
            Err(FetchError::HttpStatus(_)) | Err(FetchError::Parse(_)) => return Err(not_found()),
            Err(e) => return Err(e),
        };
        let display_name = about.data.display_name.ok_or_else(not_found)?;

        Ok(SourceMetadata {
            name: format!("{name}:{sort}"),
            display_name: format!("r/{display_name} ({sort})"),
            description: about.data.public_description,
            icon_url: about.data.icon_img,
        })
    }
}

fn to_post(raw: RawPost, source: &Source, subreddit: &str) -> Post {
    let content = (raw.is_self && !raw.selftext.is_empty()).then_some(raw.selftext);
    // Reddit uses "self", "default", "nsfw" etc. as placeholder thumbnails
    let thumbnail = raw.thumbnail.starts_with("http").then_some(raw.thumbnail);

    Post {
        id: raw.id,
        source_id: source.id,
        source_kind: SourceKind::Reddit.as_str().to_string(),
        source_name: format!("r/{subreddit}"),
        title: raw.title,
        author: raw.author,
        permalink: raw.permalink,
        url: raw.url,
        score: raw.score,
        num_comments: raw.num_comments,
        created_at: from_unix(raw.created_utc as i64),
        content,
        thumbnail,
        nsfw: raw.over_18,
        comments_fetched_at: None,
    }
}

/// Parses a comment listing, keeping only `t1` nodes with an author and body.
fn parse_comment_listing(listing: Value) -> Vec<Comment> {
    let Ok(listing) = serde_json::from_value::<Listing<Value>>(listing) else {
        return Vec::new();
    };

    listing
        .data
        .children
        .into_iter()
        .filter(|thing| thing.kind == "t1")
        .filter_map(|thing| serde_json::from_value::<RawComment>(thing.data).ok())
        .filter_map(to_comment)
        .collect()
}

fn to_comment(raw: RawComment) -> Option<Comment> {
    let (Some(author), Some(body)) = (raw.author, raw.body) else {
        return None;
    };
    if body.is_empty() {
        return None;
    }

    let replies = match raw.replies {
        Value::Object(_) => parse_comment_listing(raw.replies),
        _ => Vec::new(),
    };

    Some(
        Comment::new(raw.id, author, body, raw.score, from_unix(raw.created_utc as i64))
            .with_replies(replies),
    )
}
