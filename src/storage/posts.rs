use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{CacheCleared, DatabaseError, PostRow, UpsertOutcome};
use crate::feed::Post;

impl Database {
    // ========================================================================
    // Post Queries
    // ========================================================================

    /// Every cached post for a source, newest first
    pub async fn posts_for_source(&self, source_id: i64) -> Result<Vec<Post>, DatabaseError> {
        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT source_id, source_kind, external_id, source_name, title, author, permalink,
                   url, score, num_comments, created_utc, content, thumbnail, nsfw,
                   comments_fetched
            FROM posts
            WHERE source_id = ?
            ORDER BY created_utc DESC, id DESC
        "#,
        )
        .bind(source_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PostRow::into_post).collect())
    }

    /// Row id and cached state of a post, by its upsert key
    pub async fn find_post(
        &self,
        source_kind: &str,
        external_id: &str,
        source_id: i64,
    ) -> Result<Option<(i64, Post)>, DatabaseError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM posts WHERE source_kind = ? AND external_id = ? AND source_id = ?",
        )
        .bind(source_kind)
        .bind(external_id)
        .bind(source_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some((row_id,)) = row else {
            return Ok(None);
        };

        let post = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT source_id, source_kind, external_id, source_name, title, author, permalink,
                   url, score, num_comments, created_utc, content, thumbnail, nsfw,
                   comments_fetched
            FROM posts
            WHERE id = ?
        "#,
        )
        .bind(row_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(Some((row_id, post.into_post())))
    }

    /// Number of cached rows for an external post id across all sources of a kind
    pub async fn count_posts(
        &self,
        source_kind: &str,
        external_id: &str,
    ) -> Result<i64, DatabaseError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM posts WHERE source_kind = ? AND external_id = ?")
                .bind(source_kind)
                .bind(external_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    // ========================================================================
    // Post Mutations
    // ========================================================================

    /// Insert or update a post keyed by (source kind, external id, source id)
    ///
    /// Two-phase: `INSERT OR IGNORE` reports via `rows_affected` whether the
    /// key was new; otherwise the existing row is updated in place. The
    /// `cached_at` of an existing row is left untouched so purges age from the
    /// first time a post was seen.
    pub async fn upsert_post(
        &self,
        source_id: i64,
        post: &Post,
    ) -> Result<UpsertOutcome, DatabaseError> {
        if post.id.is_empty() {
            return Err(DatabaseError::EmptyExternalId);
        }

        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO posts
                (source_id, source_kind, external_id, source_name, title, author, permalink,
                 url, score, num_comments, created_utc, content, thumbnail, nsfw, cached_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        )
        .bind(source_id)
        .bind(&post.source_kind)
        .bind(&post.id)
        .bind(&post.source_name)
        .bind(&post.title)
        .bind(&post.author)
        .bind(&post.permalink)
        .bind(&post.url)
        .bind(post.score)
        .bind(post.num_comments)
        .bind(post.created_at.timestamp())
        .bind(&post.content)
        .bind(&post.thumbnail)
        .bind(post.nsfw)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let outcome = if inserted.rows_affected() > 0 {
            UpsertOutcome::Inserted
        } else {
            sqlx::query(
                r#"
                UPDATE posts SET
                    source_name = ?, title = ?, author = ?, permalink = ?, url = ?,
                    score = ?, num_comments = ?, created_utc = ?, content = ?,
                    thumbnail = ?, nsfw = ?
                WHERE source_kind = ? AND external_id = ? AND source_id = ?
            "#,
            )
            .bind(&post.source_name)
            .bind(&post.title)
            .bind(&post.author)
            .bind(&post.permalink)
            .bind(&post.url)
            .bind(post.score)
            .bind(post.num_comments)
            .bind(post.created_at.timestamp())
            .bind(&post.content)
            .bind(&post.thumbnail)
            .bind(post.nsfw)
            .bind(&post.source_kind)
            .bind(&post.id)
            .bind(source_id)
            .execute(&mut *tx)
            .await?;
            UpsertOutcome::Updated
        };

        tx.commit().await?;
        Ok(outcome)
    }

    /// Stamp the time a post's comment tree was cached
    pub async fn set_comments_fetched(
        &self,
        post_row_id: i64,
        at: Option<DateTime<Utc>>,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE posts SET comments_fetched = ? WHERE id = ?")
            .bind(at.map(|t| t.timestamp()))
            .bind(post_row_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ========================================================================
    // Cache Maintenance
    // ========================================================================

    /// Delete every cached post and comment and reset all fetch timestamps,
    /// so the next fetch goes upstream for every source.
    pub async fn clear_cache(&self) -> Result<CacheCleared, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        let comments = sqlx::query("DELETE FROM comments").execute(&mut *tx).await?;
        let posts = sqlx::query("DELETE FROM posts").execute(&mut *tx).await?;
        sqlx::query("UPDATE sources SET last_fetched = NULL")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(CacheCleared {
            posts: posts.rows_affected(),
            comments: comments.rows_affected(),
        })
    }

    /// Delete posts and comments first cached before `cutoff`
    pub async fn purge_cached_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<CacheCleared, DatabaseError> {
        let cutoff = cutoff.timestamp();
        let mut tx = self.pool.begin().await?;

        let comments = sqlx::query(
            "DELETE FROM comments WHERE cached_at < ? OR post_id IN (SELECT id FROM posts WHERE cached_at < ?)",
        )
        .bind(cutoff)
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;
        let posts = sqlx::query("DELETE FROM posts WHERE cached_at < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(CacheCleared {
            posts: posts.rows_affected(),
            comments: comments.rows_affected(),
        })
    }
}
