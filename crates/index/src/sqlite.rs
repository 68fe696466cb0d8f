use std::path::Path;

use bytemuck::{cast_slice, pod_collect_to_vec};
use folio_core::ChunkMetadata;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::debug;

use crate::error::{IndexError, Result};
use crate::metric::{rank, Metric};
use crate::{batch_dimensions, check_dimensions, IndexedVector, RetrievalResult, VectorIndex};

/// Persistent, name-scoped collection in a SQLite file. Metric, dimension and
/// content fingerprint live on the collection row; writes run in one
/// transaction each, so a crash mid-population leaves the previous state.
pub struct SqliteIndex {
    conn: Mutex<Connection>,
    collection: String,
    collection_id: i64,
    metric: Metric,
}

impl SqliteIndex {
    pub fn open<P: AsRef<Path>>(path: P, collection: &str, metric: Metric) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        Self::with_connection(conn, collection, metric)
    }

    pub fn open_in_memory(collection: &str, metric: Metric) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, collection, metric)
    }

    fn with_connection(conn: Connection, collection: &str, metric: Metric) -> Result<Self> {
        init(&conn)?;
        let collection_id = ensure_collection(&conn, collection, metric)?;
        Ok(Self {
            conn: Mutex::new(conn),
            collection: collection.to_string(),
            collection_id,
            metric,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn stored_dimensions(conn: &Connection, collection_id: i64) -> Result<Option<usize>> {
        let dims: Option<i64> = conn.query_row(
            "SELECT dimensions FROM collections WHERE id = ?1",
            [collection_id],
            |row| row.get(0),
        )?;
        Ok(dims.map(|d| d as usize))
    }

    fn write_entries(&self, tx: &Transaction<'_>, entries: &[IndexedVector]) -> Result<()> {
        let mut next_seq: i64 = tx.query_row(
            "SELECT COALESCE(MAX(seq), -1) + 1 FROM vectors WHERE collection_id = ?1",
            [self.collection_id],
            |row| row.get(0),
        )?;
        let mut stmt = tx.prepare(
            "INSERT INTO vectors (collection_id, id, seq, text, metadata, embedding)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(collection_id, id) DO UPDATE SET
                text = excluded.text,
                metadata = excluded.metadata,
                embedding = excluded.embedding",
        )?;
        for entry in entries {
            let metadata = serde_json::to_string(&entry.metadata)?;
            let blob = cast_slice::<f32, u8>(&entry.embedding);
            stmt.execute(params![
                self.collection_id,
                entry.id,
                next_seq,
                entry.text,
                metadata,
                blob
            ])?;
            next_seq += 1;
        }
        Ok(())
    }
}

impl VectorIndex for SqliteIndex {
    fn upsert(&self, entries: &[IndexedVector]) -> Result<usize> {
        let Some(dims) = batch_dimensions(entries)? else {
            return Ok(0);
        };
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        check_dimensions(Self::stored_dimensions(&tx, self.collection_id)?, dims)?;
        tx.execute(
            "UPDATE collections SET dimensions = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
            params![dims as i64, self.collection_id],
        )?;
        self.write_entries(&tx, entries)?;
        tx.commit()?;
        debug!("collection" = %self.collection, "upserted" = entries.len());
        Ok(entries.len())
    }

    fn replace_all(&self, entries: &[IndexedVector], fingerprint: &str) -> Result<usize> {
        let dims = batch_dimensions(entries)?;
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM vectors WHERE collection_id = ?1",
            [self.collection_id],
        )?;
        self.write_entries(&tx, entries)?;
        tx.execute(
            "UPDATE collections
             SET dimensions = ?1, fingerprint = ?2, updated_at = CURRENT_TIMESTAMP
             WHERE id = ?3",
            params![dims.map(|d| d as i64), fingerprint, self.collection_id],
        )?;
        tx.commit()?;
        debug!("collection" = %self.collection, "replaced" = entries.len());
        Ok(entries.len())
    }

    fn query(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievalResult>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, text, metadata, embedding FROM vectors
             WHERE collection_id = ?1 ORDER BY seq",
        )?;
        let mut rows = stmt.query([self.collection_id])?;
        let mut hits = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let blob: Vec<u8> = row.get(3)?;
            let embedding = decode_embedding(&id, &blob)?;
            check_dimensions(Some(embedding.len()), vector.len())?;
            let metadata: String = row.get(2)?;
            hits.push(RetrievalResult {
                id,
                text: row.get(1)?,
                metadata: serde_json::from_str::<ChunkMetadata>(&metadata)?,
                distance: Some(self.metric.distance(vector, &embedding)),
            });
        }
        Ok(rank(hits, k))
    }

    fn count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM vectors WHERE collection_id = ?1",
            [self.collection_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn fingerprint(&self) -> Result<Option<String>> {
        let conn = self.conn.lock();
        Ok(conn.query_row(
            "SELECT fingerprint FROM collections WHERE id = ?1",
            [self.collection_id],
            |row| row.get(0),
        )?)
    }

    fn reset(&self) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM vectors WHERE collection_id = ?1",
            [self.collection_id],
        )?;
        tx.execute(
            "UPDATE collections
             SET dimensions = NULL, fingerprint = NULL, updated_at = CURRENT_TIMESTAMP
             WHERE id = ?1",
            [self.collection_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn metric(&self) -> Metric {
        self.metric
    }
}

fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS collections (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            metric TEXT NOT NULL,
            dimensions INTEGER,
            fingerprint TEXT,
            created_at TEXT DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT DEFAULT CURRENT_TIMESTAMP
        );
        CREATE TABLE IF NOT EXISTS vectors (
            collection_id INTEGER NOT NULL,
            id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            text TEXT NOT NULL,
            metadata TEXT NOT NULL,
            embedding BLOB NOT NULL,
            PRIMARY KEY (collection_id, id),
            FOREIGN KEY(collection_id) REFERENCES collections(id)
        );
        CREATE INDEX IF NOT EXISTS idx_vectors_seq ON vectors(collection_id, seq);
        "#,
    )?;
    Ok(())
}

fn ensure_collection(conn: &Connection, name: &str, metric: Metric) -> Result<i64> {
    let existing: Option<(i64, String)> = conn
        .query_row(
            "SELECT id, metric FROM collections WHERE name = ?1",
            [name],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    if let Some((id, stored)) = existing {
        if stored != metric.as_str() {
            return Err(IndexError::MetricMismatch {
                collection: name.to_string(),
                stored,
                requested: metric.to_string(),
            });
        }
        return Ok(id);
    }
    conn.execute(
        "INSERT INTO collections (name, metric) VALUES (?1, ?2)",
        params![name, metric.as_str()],
    )?;
    Ok(conn.last_insert_rowid())
}

fn decode_embedding(id: &str, blob: &[u8]) -> Result<Vec<f32>> {
    if blob.is_empty() || blob.len() % std::mem::size_of::<f32>() != 0 {
        return Err(IndexError::InvalidEmbedding(format!(
            "{id}: {} bytes is not a whole number of f32 values",
            blob.len()
        )));
    }
    Ok(pod_collect_to_vec::<u8, f32>(blob))
}
