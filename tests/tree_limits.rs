//! Property tests for the comment-tree fetcher: whatever the upstream shape,
//! the fetched tree matches a sequential walk truncated by the limits.

use async_trait::async_trait;
use chrono::DateTime;
use proptest::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;

use skein::feed::{Comment, FetchError, FetchedNode, NodeSource, TreeFetcher, TreeLimits};

/// Node id -> (child ids, missing?)
struct MapTree {
    nodes: HashMap<u32, (Vec<u32>, bool)>,
}

#[async_trait]
impl NodeSource for MapTree {
    type Id = u32;

    async fn fetch_node(&self, id: &u32) -> Result<Option<FetchedNode<u32>>, FetchError> {
        tokio::task::yield_now().await;
        match self.nodes.get(id) {
            Some((_, true)) | None => Ok(None),
            Some((children, false)) => Ok(Some(FetchedNode {
                comment: Comment::new(
                    id.to_string(),
                    "user",
                    "body",
                    0,
                    DateTime::from_timestamp(0, 0).unwrap_or_default(),
                ),
                children: children.clone(),
            })),
        }
    }
}

/// Builds a tree with ids assigned breadth-first from the fan-out list.
fn build_tree(root_count: usize, fanouts: &[usize], missing_every: u32) -> (MapTree, Vec<u32>) {
    let mut nodes = HashMap::new();
    let mut next = 0u32;
    let mut queue = std::collections::VecDeque::new();

    let roots: Vec<u32> = (0..root_count)
        .map(|_| {
            next += 1;
            next
        })
        .collect();
    queue.extend(roots.iter().copied());

    let mut fanout = fanouts.iter().copied().cycle();
    while let Some(id) = queue.pop_front() {
        // Bound the total size so each case stays fast
        let count = if next > 400 { 0 } else { fanout.next().unwrap_or(0) };
        let children: Vec<u32> = (0..count)
            .map(|_| {
                next += 1;
                next
            })
            .collect();
        queue.extend(children.iter().copied());
        let missing = missing_every > 0 && id % missing_every == 0;
        nodes.insert(id, (children, missing));
    }

    (MapTree { nodes }, roots)
}

/// The sequential answer the concurrent fetcher must reproduce.
fn expected(tree: &MapTree, ids: &[u32], depth: u32, limits: &TreeLimits) -> Vec<(String, u32)> {
    let cap = if depth == 0 {
        limits.max_top_level
    } else {
        limits.max_replies
    };
    let mut out = Vec::new();
    for id in ids.iter().take(cap) {
        let Some((children, false)) = tree.nodes.get(id) else {
            continue;
        };
        out.push((id.to_string(), depth));
        if depth < limits.max_depth {
            out.extend(expected(tree, children, depth + 1, limits));
        }
    }
    out
}

fn flatten(comments: &[Comment]) -> Vec<(String, u32)> {
    let mut out = Vec::new();
    for comment in comments {
        out.push((comment.id.clone(), comment.depth()));
        out.extend(flatten(comment.replies()));
    }
    out
}

fn check_invariants(comments: &[Comment], depth: u32, limits: &TreeLimits) {
    assert!(comments.len() <= if depth == 0 { limits.max_top_level } else { limits.max_replies });
    for comment in comments {
        assert_eq!(comment.depth(), depth);
        assert!(comment.depth() <= limits.max_depth);
        for reply in comment.replies() {
            assert_eq!(reply.parent_id(), Some(comment.id.as_str()));
        }
        check_invariants(comment.replies(), depth + 1, limits);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn fetched_tree_respects_limits(
        root_count in 0usize..30,
        fanouts in prop::collection::vec(0usize..8, 1..12),
        missing_every in 0u32..7,
        max_depth in 0u32..4,
        max_top_level in 1usize..25,
        max_replies in 0usize..7,
        top_level_pool in 1usize..8,
        reply_pool in 1usize..4,
    ) {
        let limits = TreeLimits { max_depth, max_top_level, max_replies, top_level_pool, reply_pool };
        let (tree, roots) = build_tree(root_count, &fanouts, missing_every);
        let want = expected(&tree, &roots, 0, &limits);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let fetched = runtime.block_on(TreeFetcher::new(Arc::new(tree), limits).fetch(roots));

        check_invariants(&fetched, 0, &limits);
        prop_assert_eq!(flatten(&fetched), want);
    }
}
