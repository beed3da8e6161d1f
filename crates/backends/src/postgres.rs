//! PostgreSQL + pgvector backend
//!
//! One table per collection:
//!
//! ```sql
//! CREATE TABLE vh_c{id} (
//!     id          BIGSERIAL PRIMARY KEY,
//!     embedding   vector({dimensions}) NOT NULL,
//!     metadata    JSONB NOT NULL DEFAULT '{}',
//!     document_id TEXT UNIQUE,
//!     created_at  TIMESTAMPTZ NOT NULL DEFAULT now()
//! )
//! ```
//!
//! Search orders by cosine distance (`<=>`, in `[0, 2]`) and reports
//! `1 - distance`. Each ingestion chunk is one transaction. The UNIQUE
//! constraint makes document ids strictly unique even under concurrent
//! ingestion.

use crate::{BackendCapabilities, BackendQuery, VectorBackend};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tokio::sync::OnceCell;
use tracing::debug;
use vectorhub_core::similarity::similarity_from_cosine_distance;
use vectorhub_core::{
    metadata_from_json, metadata_to_json, BackendType, Collection, CollectionStats, Page,
    SearchResult, VectorEntry, VectorError, VectorId, VectorRecord, VectorResult,
};

/// Largest dimension pgvector can build an HNSW index for
const HNSW_MAX_DIMENSIONS: usize = 2_000;

/// PostgreSQL + pgvector adapter
#[derive(Debug)]
pub struct PostgresBackend {
    pool: PgPool,
    batch_size: usize,
    extension: OnceCell<()>,
}

impl PostgresBackend {
    /// Build a lazily connecting pool
    ///
    /// Must be called inside a tokio runtime. No connection is opened until
    /// the first operation.
    ///
    /// # Errors
    ///
    /// `Config` if the connection string cannot be parsed.
    pub fn connect(url: &str, max_connections: u32, batch_size: usize) -> VectorResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_lazy(url)
            .map_err(|e| VectorError::Config(format!("invalid postgres url: {}", e)))?;
        Ok(Self::with_pool(pool, batch_size))
    }

    /// Wrap an existing pool
    pub fn with_pool(pool: PgPool, batch_size: usize) -> Self {
        PostgresBackend {
            pool,
            batch_size: batch_size.max(1),
            extension: OnceCell::new(),
        }
    }

    async fn ensure_extension(&self) -> VectorResult<()> {
        self.extension
            .get_or_try_init(|| async {
                sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
                    .execute(&self.pool)
                    .await
                    .map_err(|e| map_sqlx_error(e, "extension"))?;
                Ok::<(), VectorError>(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl VectorBackend for PostgresBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Postgres
    }

    fn capabilities(&self) -> BackendCapabilities {
        BackendCapabilities {
            strict_document_uniqueness: true,
            read_after_write: true,
            transactional_batches: true,
            max_dimensions: BackendType::Postgres.max_dimensions(),
            max_top_k: None,
        }
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn create_collection(&self, collection: &Collection) -> VectorResult<()> {
        self.ensure_extension().await?;
        let table = collection.physical_name();

        sqlx::query(&create_table_sql(&table, collection.dimensions))
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, &table))?;

        if collection.dimensions <= HNSW_MAX_DIMENSIONS {
            let sql = format!(
                "CREATE INDEX IF NOT EXISTS {table}_embedding_idx ON {table} \
                 USING hnsw (embedding vector_cosine_ops)"
            );
            sqlx::query(&sql)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error(e, &table))?;
        }
        Ok(())
    }

    async fn drop_collection(&self, collection: &Collection) -> VectorResult<()> {
        let table = collection.physical_name();
        sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, &table))?;
        Ok(())
    }

    async fn add_vectors(
        &self,
        collection: &Collection,
        records: &[VectorRecord],
    ) -> VectorResult<Vec<VectorResult<VectorId>>> {
        let table = collection.physical_name();
        let sql = format!(
            "INSERT INTO {} (embedding, metadata, document_id) VALUES ($1::vector, $2, $3) \
             ON CONFLICT (document_id) DO NOTHING RETURNING id",
            table
        );

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error(e, &table))?;
        let mut results = Vec::with_capacity(records.len());
        for record in records {
            let inserted: Option<i64> = sqlx::query_scalar(&sql)
                .bind(vector_literal(&record.embedding))
                .bind(metadata_to_json(&record.metadata))
                .bind(record.document_id.as_deref())
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error(e, &table))?;
            results.push(match inserted {
                Some(id) => Ok(VectorId::Int(id)),
                None => Err(VectorError::DuplicateDocument {
                    collection: collection.name.clone(),
                    document_id: record.document_id.clone().unwrap_or_default(),
                }),
            });
        }
        tx.commit().await.map_err(|e| map_sqlx_error(e, &table))?;

        debug!(table = %table, records = records.len(), "inserted chunk");
        Ok(results)
    }

    async fn search(
        &self,
        collection: &Collection,
        query: &BackendQuery,
    ) -> VectorResult<Vec<SearchResult>> {
        let table = collection.physical_name();
        let sql = search_sql(&table, query.filter.len(), query.include_vectors);

        let mut q = sqlx::query(&sql).bind(vector_literal(&query.vector));
        for (key, value) in query.filter.iter() {
            q = q.bind(key.to_string()).bind(value.to_json());
        }
        let rows = q
            .bind(query.limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, &table))?;

        rows.iter()
            .map(|row| result_from_row(row, query.include_vectors))
            .collect()
    }

    async fn delete_vectors(&self, collection: &Collection, ids: &[VectorId]) -> VectorResult<()> {
        let table = collection.physical_name();
        let ints = ids
            .iter()
            .map(|id| {
                id.as_int().ok_or_else(|| VectorError::BadRequest {
                    message: format!("postgres vector ids are integers, got '{}'", id),
                })
            })
            .collect::<VectorResult<Vec<i64>>>()?;

        sqlx::query(&format!("DELETE FROM {} WHERE id = ANY($1)", table))
            .bind(ints)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, &table))?;
        Ok(())
    }

    async fn find_document(
        &self,
        collection: &Collection,
        document_id: &str,
    ) -> VectorResult<Option<VectorId>> {
        let table = collection.physical_name();
        let id: Option<i64> =
            sqlx::query_scalar(&format!("SELECT id FROM {} WHERE document_id = $1", table))
                .bind(document_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| map_sqlx_error(e, &table))?;
        Ok(id.map(VectorId::Int))
    }

    async fn get_vector(
        &self,
        collection: &Collection,
        id: &VectorId,
    ) -> VectorResult<Option<VectorEntry>> {
        let Some(id) = id.as_int() else {
            return Ok(None);
        };
        let table = collection.physical_name();
        let sql = format!("{} WHERE id = $1", select_entries_sql(&table));
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, &table))?;
        row.as_ref().map(entry_from_row).transpose()
    }

    async fn list_vectors(
        &self,
        collection: &Collection,
        page: Page,
    ) -> VectorResult<Vec<VectorEntry>> {
        let table = collection.physical_name();
        let sql = format!("{} ORDER BY id OFFSET $1 LIMIT $2", select_entries_sql(&table));
        let rows = sqlx::query(&sql)
            .bind(page.offset as i64)
            .bind(page.limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, &table))?;
        rows.iter().map(entry_from_row).collect()
    }

    async fn stats(&self, collection: &Collection) -> VectorResult<CollectionStats> {
        let table = collection.physical_name();
        let sql = format!(
            "SELECT COUNT(*)::bigint, \
                    pg_total_relation_size($1::regclass)::bigint, \
                    pg_size_pretty(pg_total_relation_size($1::regclass)) \
             FROM {}",
            table
        );
        let (count, size_bytes, size_pretty): (i64, i64, String) = sqlx::query_as(&sql)
            .bind(&table)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error(e, &table))?;

        Ok(CollectionStats::new(BackendType::Postgres, count.max(0) as u64)
            .with_detail("table", table)
            .with_detail("size_bytes", size_bytes)
            .with_detail("size_pretty", size_pretty)
            .with_detail("dimensions", collection.dimensions))
    }
}

// =============================================================================
// SQL helpers
// =============================================================================

fn create_table_sql(table: &str, dimensions: usize) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (\
            id BIGSERIAL PRIMARY KEY, \
            embedding vector({dimensions}) NOT NULL, \
            metadata JSONB NOT NULL DEFAULT '{{}}'::jsonb, \
            document_id TEXT UNIQUE, \
            created_at TIMESTAMPTZ NOT NULL DEFAULT now())"
    )
}

/// Build the k-NN statement
///
/// Parameters: `$1` query vector, then one `(key, value)` pair per filter
/// condition, then the limit.
fn search_sql(table: &str, conditions: usize, include_vectors: bool) -> String {
    let mut sql = String::from(
        "SELECT id, metadata, document_id, (embedding <=> $1::vector)::float8 AS distance",
    );
    if include_vectors {
        sql.push_str(", embedding::text AS embedding_text");
    }
    sql.push_str(" FROM ");
    sql.push_str(table);

    let clauses: Vec<String> = (0..conditions)
        .map(|i| format!("metadata -> ${} = ${}::jsonb", 2 + 2 * i, 3 + 2 * i))
        .collect();
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }

    sql.push_str(&format!(
        " ORDER BY embedding <=> $1::vector, id LIMIT ${}",
        2 + 2 * conditions
    ));
    sql
}

fn select_entries_sql(table: &str) -> String {
    format!(
        "SELECT id, metadata, document_id, embedding::text AS embedding_text FROM {}",
        table
    )
}

/// pgvector text form: `[1,2.5,3]`
fn vector_literal(v: &[f32]) -> String {
    let parts: Vec<String> = v.iter().map(|x| x.to_string()).collect();
    format!("[{}]", parts.join(","))
}

fn parse_vector_literal(s: &str) -> VectorResult<Vec<f32>> {
    let inner = s
        .trim()
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| VectorError::Internal(format!("malformed vector text '{}'", s)))?;
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    inner
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<f32>()
                .map_err(|e| VectorError::Internal(format!("malformed vector component: {}", e)))
        })
        .collect()
}

fn result_from_row(row: &PgRow, include_vectors: bool) -> VectorResult<SearchResult> {
    let decode = |e: sqlx::Error| VectorError::Internal(format!("postgres row decode: {}", e));

    let id: i64 = row.try_get("id").map_err(decode)?;
    let metadata: JsonValue = row.try_get("metadata").map_err(decode)?;
    let document_id: Option<String> = row.try_get("document_id").map_err(decode)?;
    let distance: Option<f64> = row.try_get("distance").map_err(decode)?;
    let embedding = if include_vectors {
        let text: String = row.try_get("embedding_text").map_err(decode)?;
        Some(parse_vector_literal(&text)?)
    } else {
        None
    };

    Ok(SearchResult {
        id: VectorId::Int(id),
        document_id,
        metadata: metadata_from_json(&metadata)?,
        embedding,
        similarity: similarity_from_cosine_distance(distance.unwrap_or(f64::NAN)),
    })
}

fn entry_from_row(row: &PgRow) -> VectorResult<VectorEntry> {
    let decode = |e: sqlx::Error| VectorError::Internal(format!("postgres row decode: {}", e));

    let id: i64 = row.try_get("id").map_err(decode)?;
    let metadata: JsonValue = row.try_get("metadata").map_err(decode)?;
    let text: String = row.try_get("embedding_text").map_err(decode)?;
    Ok(VectorEntry {
        id: VectorId::Int(id),
        document_id: row.try_get("document_id").map_err(decode)?,
        metadata: metadata_from_json(&metadata)?,
        embedding: parse_vector_literal(&text)?,
    })
}

/// Classify a sqlx failure
fn map_sqlx_error(err: sqlx::Error, table: &str) -> VectorError {
    let backend = BackendType::Postgres;
    match err {
        sqlx::Error::PoolTimedOut => VectorError::Timeout {
            operation: "postgres pool acquire".to_string(),
            after_ms: 0,
        },
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Protocol(_) => VectorError::Unavailable {
            backend,
            message: err.to_string(),
        },
        sqlx::Error::Configuration(e) => VectorError::Config(e.to_string()),
        sqlx::Error::Database(db) => {
            let code = db.code().map(|c| c.to_string()).unwrap_or_default();
            let message = db.message().to_string();
            match code.as_str() {
                "28P01" | "28000" => VectorError::Unauthorized { backend, message },
                "42P01" => VectorError::CollectionNotFound {
                    name: table.to_string(),
                },
                "23505" => VectorError::DuplicateDocument {
                    collection: table.to_string(),
                    document_id: message,
                },
                c if c.starts_with("08") || c.starts_with("53") || c.starts_with("57P") => {
                    VectorError::Unavailable { backend, message }
                }
                c if c.starts_with("22") || c.starts_with("42") => {
                    VectorError::BadRequest { message }
                }
                _ => VectorError::Internal(format!("postgres error {}: {}", code, message)),
            }
        }
        other => VectorError::Internal(other.to_string()),
    }
}
