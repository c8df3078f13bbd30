use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    db::EdgeStore,
    error::AppResult,
    models::{Edge, EdgeSet, RecommendationRow},
};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Rows inserted per statement when replacing recommendations
const INSERT_CHUNK: usize = 10_000;

/// Edge store backed by the crawler's `connections` table
pub struct PgEdgeStore {
    pool: PgPool,
}

impl PgEdgeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl EdgeStore for PgEdgeStore {
    async fn fetch_edges(&self) -> AppResult<EdgeSet> {
        let edges: Vec<Edge> = sqlx::query_as(
            r#"
            SELECT song_id::BIGINT AS item_id,
                   sampled_by_song_id::BIGINT AS user_id,
                   is_connected::INT AS label
            FROM connections
            ORDER BY song_id, sampled_by_song_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        tracing::info!(edges = edges.len(), "Loaded edges from connections table");

        Ok(edges.into())
    }

    async fn save_recommendations(&self, rows: &[RecommendationRow]) -> AppResult<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM recommendations")
            .execute(&mut *tx)
            .await?;

        let mut written = 0u64;
        for chunk in rows.chunks(INSERT_CHUNK) {
            let users: Vec<i64> = chunk.iter().map(|r| r.user_song_id).collect();
            let items: Vec<i64> = chunk.iter().map(|r| r.item_song_id).collect();
            let ratings: Vec<f32> = chunk.iter().map(|r| r.rating).collect();

            let result = sqlx::query(
                r#"
                INSERT INTO recommendations (user_song_id, item_song_id, rating)
                SELECT * FROM UNNEST($1::BIGINT[], $2::BIGINT[], $3::REAL[])
                "#,
            )
            .bind(&users)
            .bind(&items)
            .bind(&ratings)
            .execute(&mut *tx)
            .await?;

            written += result.rows_affected();
        }

        tx.commit().await?;

        tracing::info!(rows = written, "Replaced recommendations table");

        Ok(written)
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
