use chrono::{DateTime, Utc};

use super::schema::Database;
use super::types::{DatabaseError, NewSource, SourceRow};
use crate::feed::Source;

impl Database {
    // ========================================================================
    // Source Queries
    // ========================================================================

    /// All subscribed sources, oldest subscription first
    pub async fn list_sources(&self) -> Result<Vec<Source>, DatabaseError> {
        let rows = sqlx::query_as::<_, SourceRow>(
            r#"
            SELECT id, kind, identifier, display_name, description, icon_url, last_fetched
            FROM sources
            ORDER BY id
        "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(SourceRow::into_source).collect())
    }

    /// Find a source by its natural key
    pub async fn find_source(
        &self,
        kind: &str,
        identifier: &str,
    ) -> Result<Option<Source>, DatabaseError> {
        let row = sqlx::query_as::<_, SourceRow>(
            r#"
            SELECT id, kind, identifier, display_name, description, icon_url, last_fetched
            FROM sources
            WHERE kind = ? AND identifier = ?
        "#,
        )
        .bind(kind)
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SourceRow::into_source))
    }

    pub async fn get_source(&self, id: i64) -> Result<Option<Source>, DatabaseError> {
        let row = sqlx::query_as::<_, SourceRow>(
            r#"
            SELECT id, kind, identifier, display_name, description, icon_url, last_fetched
            FROM sources
            WHERE id = ?
        "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(SourceRow::into_source))
    }

    // ========================================================================
    // Source Mutations
    // ========================================================================

    /// Insert a new source, returning it with its assigned id
    ///
    /// Violating `UNIQUE(kind, identifier)` surfaces as `DatabaseError::AlreadyExists`.
    pub async fn insert_source(&self, source: &NewSource) -> Result<Source, DatabaseError> {
        let row = sqlx::query_as::<_, SourceRow>(
            r#"
            INSERT INTO sources (kind, identifier, display_name, description, icon_url)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, kind, identifier, display_name, description, icon_url, last_fetched
        "#,
        )
        .bind(&source.kind)
        .bind(&source.identifier)
        .bind(&source.display_name)
        .bind(&source.description)
        .bind(&source.icon_url)
        .fetch_one(&self.pool)
        .await
        .map_err(DatabaseError::from_insert)?;

        Ok(row.into_source())
    }

    /// Record a successful fetch of `source_id` at `at`
    pub async fn set_source_fetched(
        &self,
        source_id: i64,
        at: DateTime<Utc>,
    ) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE sources SET last_fetched = ? WHERE id = ?")
            .bind(at.timestamp())
            .bind(source_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Delete a source together with its cached posts and comments.
    ///
    /// Returns the number of source rows removed (0 or 1).
    pub async fn delete_source(&self, source_id: i64) -> Result<u64, DatabaseError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "DELETE FROM comments WHERE post_id IN (SELECT id FROM posts WHERE source_id = ?)",
        )
        .bind(source_id)
        .execute(&mut *tx)
        .await?;

        let posts = sqlx::query("DELETE FROM posts WHERE source_id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("DELETE FROM sources WHERE id = ?")
            .bind(source_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(
            source_id = source_id,
            posts = posts.rows_affected(),
            "Deleted source and cached posts"
        );
        Ok(result.rows_affected())
    }
}
