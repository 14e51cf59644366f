use chrono::Utc;
use std::collections::HashMap;

use super::schema::Database;
use super::types::{CommentRow, DatabaseError};
use crate::feed::{from_unix, Comment};

impl Database {
    /// Replace the stored comment tree of a post.
    ///
    /// Parent links are stored as comment row ids and sibling order as
    /// `position`, so [`Database::load_comment_tree`] returns the same shape.
    /// Returns the number of comments written.
    pub async fn replace_comments(
        &self,
        post_row_id: i64,
        comments: &[Comment],
    ) -> Result<usize, DatabaseError> {
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM comments WHERE post_id = ?")
            .bind(post_row_id)
            .execute(&mut *tx)
            .await?;

        // Explicit stack: (comment, parent row id, sibling position)
        let mut pending: Vec<(&Comment, Option<i64>, i64)> = comments
            .iter()
            .enumerate()
            .rev()
            .map(|(i, c)| (c, None, i as i64))
            .collect();
        let mut written = 0;

        while let Some((comment, parent_row, position)) = pending.pop() {
            let (row_id,): (i64,) = sqlx::query_as(
                r#"
                INSERT INTO comments
                    (post_id, parent_id, external_id, author, body, score, created_utc,
                     depth, position, cached_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                RETURNING id
            "#,
            )
            .bind(post_row_id)
            .bind(parent_row)
            .bind(&comment.id)
            .bind(&comment.author)
            .bind(&comment.body)
            .bind(comment.score)
            .bind(comment.created_at.timestamp())
            .bind(comment.depth() as i64)
            .bind(position)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;
            written += 1;

            for (i, reply) in comment.replies().iter().enumerate().rev() {
                pending.push((reply, Some(row_id), i as i64));
            }
        }

        tx.commit().await?;
        Ok(written)
    }

    /// Rebuild a post's stored comment tree in upstream order
    pub async fn load_comment_tree(&self, post_row_id: i64) -> Result<Vec<Comment>, DatabaseError> {
        let rows = sqlx::query_as::<_, CommentRow>(
            r#"
            SELECT id, parent_id, external_id, author, body, score, created_utc
            FROM comments
            WHERE post_id = ?
            ORDER BY position, id
        "#,
        )
        .bind(post_row_id)
        .fetch_all(&self.pool)
        .await?;

        let mut children: HashMap<Option<i64>, Vec<CommentRow>> = HashMap::new();
        for row in rows {
            children.entry(row.parent_id).or_default().push(row);
        }

        Ok(assemble(None, &mut children))
    }
}

fn assemble(
    parent: Option<i64>,
    children: &mut HashMap<Option<i64>, Vec<CommentRow>>,
) -> Vec<Comment> {
    let Some(rows) = children.remove(&parent) else {
        return Vec::new();
    };

    rows.into_iter()
        .map(|row| {
            let replies = assemble(Some(row.id), children);
            Comment::new(
                row.external_id,
                row.author,
                row.body,
                row.score,
                from_unix(row.created_utc),
            )
            .with_replies(replies)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::feed::{from_unix, Comment, Post};
    use crate::storage::{Database, NewSource};
    use pretty_assertions::assert_eq;

    async fn db_with_post() -> (Database, i64) {
        let db = Database::open(":memory:").await.unwrap();
        let source = db
            .insert_source(&NewSource {
                kind: "lobsters".into(),
                identifier: "active".into(),
                display_name: "Lobsters - active".into(),
                description: String::new(),
                icon_url: String::new(),
            })
            .await
            .unwrap();
        let post = Post {
            id: "s1".into(),
            source_id: source.id,
            source_kind: "lobsters".into(),
            source_name: "lobsters/active".into(),
            title: "Story".into(),
            author: "a".into(),
            permalink: String::new(),
            url: String::new(),
            score: 0,
            num_comments: 0,
            created_at: from_unix(1),
            content: None,
            thumbnail: None,
            nsfw: false,
            comments_fetched_at: None,
        };
        db.upsert_post(source.id, &post).await.unwrap();
        let (row_id, _) = db.find_post("lobsters", "s1", source.id).await.unwrap().unwrap();
        (db, row_id)
    }

    fn leaf(id: &str) -> Comment {
        Comment::new(id, "user", format!("body {id}"), 1, from_unix(100))
    }

    fn shape(comments: &[Comment]) -> Vec<(String, u32, Option<String>)> {
        let mut out = Vec::new();
        for c in comments {
            out.push((c.id.clone(), c.depth(), c.parent_id().map(str::to_string)));
            out.extend(shape(c.replies()));
        }
        out
    }

    #[tokio::test]
    async fn test_comment_tree_survives_store_round_trip() {
        let (db, post_row) = db_with_post().await;
        let tree = vec![
            leaf("a").with_replies(vec![leaf("a1").with_replies(vec![leaf("a1x")]), leaf("a2")]),
            leaf("b"),
        ];

        assert_eq!(db.replace_comments(post_row, &tree).await.unwrap(), 5);

        let loaded = db.load_comment_tree(post_row).await.unwrap();
        assert_eq!(shape(&loaded), shape(&tree));
        assert_eq!(loaded, tree);
    }

    #[tokio::test]
    async fn test_replace_discards_previous_tree() {
        let (db, post_row) = db_with_post().await;
        db.replace_comments(post_row, &[leaf("old")]).await.unwrap();
        db.replace_comments(post_row, &[leaf("new")]).await.unwrap();

        let loaded = db.load_comment_tree(post_row).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "new");
    }

    #[tokio::test]
    async fn test_load_without_comments_is_empty() {
        let (db, post_row) = db_with_post().await;
        assert!(db.load_comment_tree(post_row).await.unwrap().is_empty());
    }
}
