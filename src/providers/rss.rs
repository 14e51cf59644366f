use async_trait::async_trait;
use chrono::Utc;
use feed_rs::parser;

use crate::feed::{
    Comment, FetchError, HttpClient, Post, Provider, Source, SourceKind, SourceMetadata,
};
use crate::util::validate_feed_url;

/// RSS and Atom feeds, parsed with `feed-rs`. The identifier is the feed URL.
#[derive(Debug, Clone)]
pub struct RssProvider {
    http: HttpClient,
    allow_private_hosts: bool,
}

impl RssProvider {
    pub fn new(http: HttpClient, allow_private_hosts: bool) -> Self {
        Self {
            http,
            allow_private_hosts,
        }
    }

    async fn load(&self, identifier: &str) -> Result<(url::Url, feed_rs::model::Feed), FetchError> {
        let url = validate_feed_url(identifier, self.allow_private_hosts)
            .map_err(|e| FetchError::InvalidSource(e.to_string()))?;

        let bytes = self.http.get_bytes(url.as_str()).await?;
        let feed = parser::parse(bytes.as_slice())
            .map_err(|e| FetchError::Parse(format!("error parsing feed: {e}")))?;

        Ok((url, feed))
    }
}

#[async_trait]
impl Provider for RssProvider {
    fn kind(&self) -> SourceKind {
        SourceKind::Rss
    }

    async fn fetch_posts(&self, source: &Source) -> Result<Vec<Post>, FetchError> {
        let (_, feed) = self.load(&source.identifier).await?;
        let source_name = format!("rss/{}", source.display_name);
        let now = Utc::now();

        let posts: Vec<Post> = feed
            .entries
            .into_iter()
            .map(|entry| {
                let link = entry.links.first().map(|l| l.href.clone()).unwrap_or_default();
                let id = match entry.id.trim() {
                    "" => link.clone(),
                    id => id.to_string(),
                };
                let author = entry
                    .authors
                    .into_iter()
                    .map(|p| p.name)
                    .find(|name| !name.trim().is_empty())
                    .unwrap_or_else(|| "Unknown".to_string());
                let content = entry
                    .content
                    .and_then(|c| c.body)
                    .or_else(|| entry.summary.map(|s| s.content))
                    .filter(|c| !c.is_empty());
                let thumbnail = entry
                    .media
                    .iter()
                    .flat_map(|m| m.thumbnails.iter())
                    .map(|t| t.image.uri.clone())
                    .next();

                Post {
                    id,
                    source_id: source.id,
                    source_kind: SourceKind::Rss.as_str().to_string(),
                    source_name: source_name.clone(),
                    title: entry
                        .title
                        .map(|t| t.content)
                        .unwrap_or_else(|| "Untitled".to_string()),
                    author,
                    permalink: link.clone(),
                    url: link,
                    score: 0,
                    num_comments: 0,
                    created_at: entry.published.or(entry.updated).unwrap_or(now),
                    content,
                    thumbnail,
                    nsfw: false,
                    comments_fetched_at: None,
                }
            })
            .collect();

        tracing::debug!(url = %source.identifier, entries = posts.len(), "Parsed feed");
        Ok(posts)
    }

    async fn fetch_comments(&self, _post: &Post) -> Result<Vec<Comment>, FetchError> {
        Ok(Vec::new())
    }

    async fn validate_source(&self, identifier: &str) -> Result<SourceMetadata, FetchError> {
        let (url, feed) = self.load(identifier).await?;

        let display_name = feed
            .title
            .map(|t| t.content)
            .filter(|t| !t.trim().is_empty())
            .or_else(|| url.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string());
        let icon_url = feed
            .icon
            .or(feed.logo)
            .map(|image| image.uri)
            .unwrap_or_default();

        Ok(SourceMetadata {
            // The URL, not the title, so the stored identifier stays fetchable
            name: url.to_string(),
            display_name,
            description: feed.description.map(|d| d.content).unwrap_or_default(),
            icon_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Example Blog</title>
    <description>Posts about things</description>
    <link>https://example.com</link>
    <item>
      <title>With guid</title>
      <link>https://example.com/one</link>
      <guid>urn:example:1</guid>
      <author>writer@example.com (Writer)</author>
      <pubDate>Tue, 02 Jan 2024 10:00:00 GMT</pubDate>
      <description>Summary one</description>
    </item>
    <item>
      <title>Without date</title>
      <link>https://example.com/two</link>
      <guid>urn:example:2</guid>
    </item>
  </channel>
</rss>"#;

    async fn serve(body: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body)
                    .insert_header("content-type", "application/rss+xml"),
            )
            .mount(&server)
            .await;
        server
    }

    fn source(url: String) -> Source {
        Source {
            id: 4,
            kind: "rss".into(),
            identifier: url,
            display_name: "Example Blog".into(),
            description: String::new(),
            icon_url: String::new(),
            last_fetched_at: None,
        }
    }

    #[tokio::test]
    async fn test_fetch_posts_maps_entries() {
        let server = serve(RSS).await;
        let provider = RssProvider::new(HttpClient::default(), true);
        let before = Utc::now();

        let posts = provider
            .fetch_posts(&source(format!("{}/feed.xml", server.uri())))
            .await
            .unwrap();

        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].id, "urn:example:1");
        assert_eq!(posts[0].url, "https://example.com/one");
        assert_eq!(posts[0].source_name, "rss/Example Blog");
        assert_eq!(posts[0].content.as_deref(), Some("Summary one"));
        assert_eq!(posts[0].created_at.timestamp(), 1_704_189_600);
        assert_eq!(posts[1].author, "Unknown");
        assert!(posts[1].created_at >= before);
    }

    #[tokio::test]
    async fn test_validate_uses_url_as_canonical_name() {
        let server = serve(RSS).await;
        let provider = RssProvider::new(HttpClient::default(), true);
        let url = format!("{}/feed.xml", server.uri());

        let meta = provider.validate_source(&url).await.unwrap();
        assert_eq!(meta.name, url);
        assert_eq!(meta.display_name, "Example Blog");
        assert_eq!(meta.description, "Posts about things");
    }

    #[tokio::test]
    async fn test_validate_rejects_unparseable_feed() {
        let server = serve("this is not xml").await;
        let provider = RssProvider::new(HttpClient::default(), true);

        let err = provider
            .validate_source(&format!("{}/feed.xml", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)));
    }

    #[tokio::test]
    async fn test_private_hosts_rejected_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
            .expect(0)
            .mount(&server)
            .await;
        let provider = RssProvider::new(HttpClient::default(), false);

        let err = provider
            .validate_source(&format!("{}/feed.xml", server.uri()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("private or local host"));
    }

    #[tokio::test]
    async fn test_comments_always_empty() {
        let provider = RssProvider::new(HttpClient::default(), false);
        let post = Post {
            id: "x".into(),
            source_id: 1,
            source_kind: "rss".into(),
            source_name: "rss/x".into(),
            title: String::new(),
            author: String::new(),
            permalink: String::new(),
            url: String::new(),
            score: 0,
            num_comments: 0,
            created_at: Utc::now(),
            content: None,
            thumbnail: None,
            nsfw: false,
            comments_fetched_at: None,
        };
        assert!(provider.fetch_comments(&post).await.unwrap().is_empty());
    }
}
