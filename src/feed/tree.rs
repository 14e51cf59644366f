//! Bounded-concurrency scatter/gather for sources that need one request per
//! comment node.
//!
//! [`gather_ordered`] is the general routine: one task per item, admission
//! through a counting semaphore, results tagged with their input index and
//! reassembled in input order once every task has finished.
//! [`TreeFetcher`] applies it level by level to build a depth- and
//! fan-out-limited comment tree.

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::provider::FetchError;
use super::types::Comment;

/// Runs `fetch` over every item with at most `pool_size` running at once.
///
/// The output keeps the order of `items`. Items whose fetch yields `None`
/// (or whose task panics) are left out without affecting their siblings.
/// Dropping the returned future aborts every task still running.
pub async fn gather_ordered<I, T, F, Fut>(items: Vec<I>, pool_size: usize, fetch: F) -> Vec<T>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<T>> + Send + 'static,
{
    if items.is_empty() {
        return Vec::new();
    }

    let total = items.len();
    let pool = Arc::new(Semaphore::new(pool_size.max(1)));
    let fetch = Arc::new(fetch);
    let mut tasks = JoinSet::new();

    for (index, item) in items.into_iter().enumerate() {
        let pool = Arc::clone(&pool);
        let fetch = Arc::clone(&fetch);
        tasks.spawn(async move {
            // Held until the task finishes, whatever the outcome
            let _permit = pool.acquire_owned().await.ok()?;
            (*fetch)(item).await.map(|value| (index, value))
        });
    }

    let mut gathered: HashMap<usize, T> = HashMap::with_capacity(total);
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Some((index, value))) => {
                gathered.insert(index, value);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Scatter task did not complete"),
        }
    }

    (0..total).filter_map(|index| gathered.remove(&index)).collect()
}

/// One fetched comment node plus the ids of its direct replies.
#[derive(Debug, Clone)]
pub struct FetchedNode<Id> {
    pub comment: Comment,
    pub children: Vec<Id>,
}

/// Per-node lookup against an upstream API.
#[async_trait]
pub trait NodeSource: Send + Sync + 'static {
    type Id: Clone + fmt::Debug + Send + Sync + 'static;

    /// Returns `Ok(None)` for nodes that are missing, deleted or removed.
    async fn fetch_node(&self, id: &Self::Id) -> Result<Option<FetchedNode<Self::Id>>, FetchError>;
}

/// Bounds on the work a single tree fetch may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeLimits {
    /// Deepest depth returned; nodes at this depth are leaves
    pub max_depth: u32,
    /// Top-level comments fetched per post
    pub max_top_level: usize,
    /// Replies explored per comment
    pub max_replies: usize,
    /// Concurrent lookups for the top-level list
    pub top_level_pool: usize,
    /// Concurrent lookups for each reply list
    pub reply_pool: usize,
}

impl Default for TreeLimits {
    fn default() -> Self {
        Self {
            max_depth: 1,
            max_top_level: 20,
            max_replies: 5,
            top_level_pool: 30,
            reply_pool: 10,
        }
    }
}

impl TreeLimits {
    fn pool_size(&self, depth: u32) -> usize {
        if depth == 0 {
            self.top_level_pool
        } else {
            self.reply_pool
        }
    }
}

/// Builds comment trees from a [`NodeSource`] within [`TreeLimits`].
pub struct TreeFetcher<S> {
    source: Arc<S>,
    limits: TreeLimits,
}

impl<S: NodeSource> TreeFetcher<S> {
    pub fn new(source: Arc<S>, limits: TreeLimits) -> Self {
        Self { source, limits }
    }

    /// Fetches the trees rooted at `roots`, keeping sibling order.
    ///
    /// Failed or missing nodes are dropped along with their subtrees; the
    /// rest of the tree is still returned.
    pub async fn fetch(&self, mut roots: Vec<S::Id>) -> Vec<Comment> {
        roots.truncate(self.limits.max_top_level);
        fetch_level(Arc::clone(&self.source), self.limits, roots, 0).await
    }
}

fn fetch_level<S: NodeSource>(
    source: Arc<S>,
    limits: TreeLimits,
    ids: Vec<S::Id>,
    depth: u32,
) -> BoxFuture<'static, Vec<Comment>> {
    let pool_size = limits.pool_size(depth);
    gather_ordered(ids, pool_size, move |id| {
        fetch_subtree(Arc::clone(&source), limits, id, depth)
    })
    .boxed()
}

async fn fetch_subtree<S: NodeSource>(
    source: Arc<S>,
    limits: TreeLimits,
    id: S::Id,
    depth: u32,
) -> Option<Comment> {
    let FetchedNode {
        comment,
        mut children,
    } = match source.fetch_node(&id).await {
        Ok(Some(node)) => node,
        Ok(None) => return None,
        Err(e) => {
            tracing::debug!(id = ?id, depth = depth, error = %e, "Comment node fetch failed, skipping");
            return None;
        }
    };

    if depth >= limits.max_depth || children.is_empty() {
        return Some(comment);
    }

    children.truncate(limits.max_replies);
    let replies = fetch_level(source, limits, children, depth + 1).await;
    Some(comment.with_replies(replies))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::types::from_unix;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// In-memory tree with per-node latency and in-flight tracking.
    #[derive(Default)]
    struct SyntheticTree {
        nodes: HashMap<u32, (Vec<u32>, Duration)>,
        failing: Vec<u32>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl SyntheticTree {
        fn node(mut self, id: u32, children: Vec<u32>, delay_ms: u64) -> Self {
            self.nodes
                .insert(id, (children, Duration::from_millis(delay_ms)));
            self
        }
    }

    #[async_trait]
    impl NodeSource for SyntheticTree {
        type Id = u32;

        async fn fetch_node(&self, id: &u32) -> Result<Option<FetchedNode<u32>>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let found = self.nodes.get(id).cloned();
            if let Some((_, delay)) = &found {
                tokio::time::sleep(*delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(id) {
                return Err(FetchError::HttpStatus(500));
            }
            Ok(found.map(|(children, _)| FetchedNode {
                comment: Comment::new(id.to_string(), "user", "text", 0, from_unix(0)),
                children,
            }))
        }
    }

    fn ids(comments: &[Comment]) -> Vec<&str> {
        comments.iter().map(|c| c.id.as_str()).collect()
    }

    fn deep_limits(max_depth: u32, max_replies: usize) -> TreeLimits {
        TreeLimits {
            max_depth,
            max_replies,
            ..TreeLimits::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sibling_order_survives_out_of_order_completion() {
        let tree = SyntheticTree::default()
            .node(1, vec![], 40)
            .node(2, vec![], 10)
            .node(3, vec![], 30)
            .node(4, vec![], 0);
        let fetcher = TreeFetcher::new(Arc::new(tree), TreeLimits::default());

        let comments = fetcher.fetch(vec![1, 2, 3, 4]).await;
        assert_eq!(ids(&comments), vec!["1", "2", "3", "4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_order_survives_out_of_order_completion() {
        let tree = SyntheticTree::default()
            .node(1, vec![10, 11, 12], 5)
            .node(10, vec![], 30)
            .node(11, vec![], 20)
            .node(12, vec![], 10);
        let fetcher = TreeFetcher::new(Arc::new(tree), TreeLimits::default());

        let comments = fetcher.fetch(vec![1]).await;
        assert_eq!(ids(comments[0].replies()), vec!["10", "11", "12"]);
        assert!(comments[0].replies().iter().all(|r| r.depth() == 1));
        assert!(comments[0]
            .replies()
            .iter()
            .all(|r| r.parent_id() == Some("1")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_depth_limit_makes_leaves() {
        let tree = Arc::new(
            SyntheticTree::default()
                .node(1, vec![2], 1)
                .node(2, vec![3], 1)
                .node(3, vec![4], 1)
                .node(4, vec![], 1),
        );
        let fetcher = TreeFetcher::new(Arc::clone(&tree), deep_limits(1, 5));

        let comments = fetcher.fetch(vec![1]).await;
        let child = &comments[0].replies()[0];
        assert_eq!(child.id, "2");
        assert_eq!(child.depth(), 1);
        assert!(child.replies().is_empty());
        // Nodes below the limit are never requested
        assert_eq!(tree.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deeper_limit_recurses_further() {
        let tree = SyntheticTree::default()
            .node(1, vec![2], 1)
            .node(2, vec![3], 1)
            .node(3, vec![4], 1)
            .node(4, vec![], 1);
        let fetcher = TreeFetcher::new(Arc::new(tree), deep_limits(2, 5));

        let comments = fetcher.fetch(vec![1]).await;
        let grandchild = &comments[0].replies()[0].replies()[0];
        assert_eq!(grandchild.id, "3");
        assert_eq!(grandchild.depth(), 2);
        assert!(grandchild.replies().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_fan_out_is_capped() {
        let mut tree = SyntheticTree::default().node(1, (100..110).collect(), 1);
        for id in 100..110 {
            tree = tree.node(id, vec![], 1);
        }
        let fetcher = TreeFetcher::new(Arc::new(tree), deep_limits(1, 3));

        let comments = fetcher.fetch(vec![1]).await;
        assert_eq!(ids(comments[0].replies()), vec!["100", "101", "102"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_top_level_list_is_capped() {
        let mut tree = SyntheticTree::default();
        for id in 0..30 {
            tree = tree.node(id, vec![], 1);
        }
        let limits = TreeLimits {
            max_top_level: 4,
            ..TreeLimits::default()
        };
        let fetcher = TreeFetcher::new(Arc::new(tree), limits);

        let comments = fetcher.fetch((0..30).collect()).await;
        assert_eq!(ids(&comments), vec!["0", "1", "2", "3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_and_failing_nodes_are_skipped() {
        let mut tree = SyntheticTree::default()
            .node(1, vec![], 1)
            .node(3, vec![], 1)
            .node(4, vec![], 1);
        tree.failing.push(3);
        let fetcher = TreeFetcher::new(Arc::new(tree), TreeLimits::default());

        // 2 does not exist upstream, 3 errors
        let comments = fetcher.fetch(vec![1, 2, 3, 4]).await;
        assert_eq!(ids(&comments), vec!["1", "4"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_bounds_concurrent_lookups() {
        let mut tree = SyntheticTree::default();
        for id in 0..12 {
            tree = tree.node(id, vec![], 10);
        }
        let tree = Arc::new(tree);
        let limits = TreeLimits {
            top_level_pool: 3,
            ..TreeLimits::default()
        };
        let fetcher = TreeFetcher::new(Arc::clone(&tree), limits);

        let comments = fetcher.fetch((0..12).collect()).await;
        assert_eq!(comments.len(), 12);
        assert_eq!(tree.peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gather_ordered_empty_input() {
        let out: Vec<u32> = gather_ordered(Vec::<u32>::new(), 4, |n| async move { Some(n) }).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_gather_ordered_drops_none_and_keeps_order() {
        let out = gather_ordered((0..10u32).collect(), 2, |n| async move {
            (n % 3 != 0).then_some(n * 10)
        })
        .await;
        assert_eq!(out, vec![10, 20, 40, 50, 70, 80]);
    }

    #[tokio::test]
    async fn test_gather_ordered_zero_pool_still_runs() {
        let out = gather_ordered(vec![1u32, 2], 0, |n| async move { Some(n) }).await;
        assert_eq!(out, vec![1, 2]);
    }
}
