use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use crate::feed::{
    from_unix, gather_ordered, Comment, FetchError, FetchedNode, HttpClient, NodeSource, Post,
    Provider, Source, SourceKind, SourceMetadata, TreeFetcher, TreeLimits,
};

const API_URL: &str = "https://hacker-news.firebaseio.com/v0";
const SITE_URL: &str = "https://news.ycombinator.com";

/// Stories fetched per listing
const MAX_STORIES: usize = 20;
/// Concurrent item lookups while fetching a listing
const STORY_POOL: usize = 20;

/// (identifier, API endpoint, display name)
const CATEGORIES: [(&str, &str, &str); 6] = [
    ("top", "topstories", "Top Stories"),
    ("new", "newstories", "New Stories"),
    ("best", "beststories", "Best Stories"),
    ("ask", "askstories", "Ask HN"),
    ("show", "showstories", "Show HN"),
    ("job", "jobstories", "Jobs"),
];

fn category(identifier: &str) -> Result<(&'static str, &'static str), FetchError> {
    CATEGORIES
        .iter()
        .find(|(id, _, _)| *id == identifier)
        .map(|(_, endpoint, name)| (*endpoint, *name))
        .ok_or_else(|| {
            FetchError::InvalidSource(
                "invalid category. Valid options: top, new, best, ask, show, job".into(),
            )
        })
}

/// The Firebase item payload, shared by stories and comments.
#[derive(Debug, Deserialize)]
struct Item {
    id: u64,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    by: String,
    #[serde(default)]
    time: i64,
    #[serde(default)]
    text: String,
    #[serde(default)]
    dead: bool,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    kids: Vec<u64>,
    url: Option<String>,
    #[serde(default)]
    score: i64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    descendants: i64,
}

impl Item {
    fn is_gone(&self) -> bool {
        self.dead || self.deleted
    }
}

/// Item lookups against the Firebase API; also the node source for comment trees.
#[derive(Debug)]
struct ItemApi {
    http: HttpClient,
    base_url: String,
}

impl ItemApi {
    /// `Ok(None)` when the API returns `null` for the id.
    async fn item(&self, id: u64) -> Result<Option<Item>, FetchError> {
        let url = format!("{}/item/{}.json", self.base_url, id);
        self.http.get_json(&url).await
    }
}

#[async_trait]
impl NodeSource for ItemApi {
    type Id = u64;

    async fn fetch_node(&self, id: &u64) -> Result<Option<FetchedNode<u64>>, FetchError> {
        let Some(item) = self.item(*id).await? else {
            return Ok(None);
        };
        if item.is_gone() || item.kind != "comment" {
            return Ok(None);
        }

        Ok(Some(FetchedNode {
            comment: Comment::new(
                item.id.to_string(),
                item.by,
                item.text,
                item.score,
                from_unix(item.time),
            ),
            children: item.kids,
        }))
    }
}

/// Hacker News story listings, with comment trees fetched one item at a time.
pub struct HackerNewsProvider {
    api: Arc<ItemApi>,
    limits: TreeLimits,
}

impl HackerNewsProvider {
    pub fn new(http: HttpClient, limits: TreeLimits) -> Self {
        Self::with_base_url(http, limits, API_URL)
    }

    pub fn with_base_url(http: HttpClient, limits: TreeLimits, base_url: impl Into<String>) -> Self {
        Self {
            api: Arc::new(ItemApi {
                http,
                base_url: base_url.into().trim_end_matches('/').to_string(),
            }),
            limits,
        }
    }
}

#[async_trait]
impl Provider for HackerNewsProvider {
    fn kind(&self) -> SourceKind {
        SourceKind::HackerNews
    }

    async fn fetch_posts(&self, source: &Source) -> Result<Vec<Post>, FetchError> {
        let (endpoint, _) = category(&source.identifier)?;
        let url = format!("{}/{}.json", self.api.base_url, endpoint);

        let mut ids: Vec<u64> = self.api.http.get_json(&url).await?;
        ids.truncate(MAX_STORIES);

        let api = Arc::clone(&self.api);
        let source_id = source.id;
        let category = source.identifier.clone();

        let posts = gather_ordered(ids, STORY_POOL, move |id| {
            let api = Arc::clone(&api);
            let category = category.clone();
            async move {
                match api.item(id).await {
                    Ok(Some(item)) if !item.is_gone() => Some(to_post(item, source_id, &category)),
                    Ok(_) => None,
                    Err(e) => {
                        tracing::debug!(id = id, error = %e, "Story fetch failed, skipping");
                        None
                    }
                }
            }
        })
        .await;

        Ok(posts)
    }

    async fn fetch_comments(&self, post: &Post) -> Result<Vec<Comment>, FetchError> {
        let story_id: u64 = post
            .id
            .parse()
            .map_err(|_| FetchError::InvalidSource(format!("invalid story id: {}", post.id)))?;

        let Some(story) = self.api.item(story_id).await? else {
            return Ok(Vec::new());
        };
        if story.kids.is_empty() {
            return Ok(Vec::new());
        }

        let fetcher = TreeFetcher::new(Arc::clone(&self.api), self.limits);
        Ok(fetcher.fetch(story.kids).await)
    }

    async fn validate_source(&self, identifier: &str) -> Result<SourceMetadata, FetchError> {
        let (_, name) = category(identifier)?;
        Ok(SourceMetadata {
            name: identifier.to_string(),
            display_name: format!("HackerNews - {name}"),
            description: format!("HackerNews {name} feed"),
            icon_url: format!("{SITE_URL}/favicon.ico"),
        })
    }
}

fn to_post(item: Item, source_id: i64, category: &str) -> Post {
    let permalink = format!("/item?id={}", item.id);
    let url = item
        .url
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| format!("{SITE_URL}{permalink}"));

    Post {
        id: item.id.to_string(),
        source_id,
        source_kind: SourceKind::HackerNews.as_str().to_string(),
        source_name: format!("HackerNews/{category}"),
        title: item.title,
        author: item.by,
        permalink,
        url,
        score: item.score,
        num_comments: item.descendants,
        created_at: from_unix(item.time),
        content: (!item.text.is_empty()).then_some(item.text),
        thumbnail: None,
        nsfw: false,
        comments_fetched_at: None,
    }
}
