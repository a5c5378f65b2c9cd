//! Durable document rows in SQLite
//!
//! Every mutation of a collection is written here before the in-memory
//! copy changes, so a restart reloads exactly what callers last saw.
//! Rows keep the sequence number assigned on first insert; reloads and
//! dumps come back in that order.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rusqlite::{params, Connection, OptionalExtension, Transaction};
use tracing::debug;

use super::error::{StoreError, StoreResult};
use super::schema::{init_schema, needs_init};
use crate::models::{CollectionName, Document};

/// SQLite-backed persistence shared by all collections
pub struct SqlitePersistence {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqlitePersistence {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;

        if needs_init(&conn) {
            init_schema(&conn)?;
        }
        debug!(path = %path.display(), "Opened local store");

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Database file, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load every document of a collection in insertion order
    pub fn load<T: Document>(&self) -> StoreResult<Vec<T>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT body FROM documents WHERE collection = ? ORDER BY seq")?;
        let bodies = stmt
            .query_map([T::COLLECTION.as_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        bodies
            .iter()
            .map(|body| serde_json::from_str(body).map_err(StoreError::from))
            .collect()
    }

    /// Insert or replace a document, keeping its original position
    pub fn upsert<T: Document>(&self, doc: &T) -> StoreResult<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        upsert_row(&tx, doc)?;
        tx.commit()?;
        Ok(())
    }

    /// Physically remove a document; returns whether a row existed
    pub fn delete(&self, collection: CollectionName, id: &str) -> StoreResult<bool> {
        let conn = self.lock();
        let removed = conn.execute(
            "DELETE FROM documents WHERE collection = ? AND id = ?",
            params![collection.as_str(), id],
        )?;
        Ok(removed > 0)
    }

    /// Replace two collections in a single transaction
    ///
    /// Either both collections hold their new rows afterwards, or neither
    /// changed.
    pub fn replace_both<A: Document, B: Document>(
        &self,
        first: &[A],
        second: &[B],
    ) -> StoreResult<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        replace_rows(&tx, first)?;
        replace_rows(&tx, second)?;
        tx.commit()?;
        Ok(())
    }
}

fn replace_rows<T: Document>(tx: &Transaction, docs: &[T]) -> StoreResult<()> {
    tx.execute(
        "DELETE FROM documents WHERE collection = ?",
        [T::COLLECTION.as_str()],
    )?;
    for doc in docs {
        upsert_row(tx, doc)?;
    }
    Ok(())
}

fn upsert_row<T: Document>(tx: &Transaction, doc: &T) -> StoreResult<()> {
    let collection = T::COLLECTION.as_str();
    let body = serde_json::to_string(doc)?;
    let revision = doc.revision().map(|rev| rev.as_str().to_string());

    let existing: Option<i64> = tx
        .query_row(
            "SELECT seq FROM documents WHERE collection = ? AND id = ?",
            params![collection, doc.id()],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(_) => {
            tx.execute(
                "UPDATE documents SET revision = ?, tombstoned = ?, body = ?
                 WHERE collection = ? AND id = ?",
                params![revision, doc.is_tombstoned(), body, collection, doc.id()],
            )?;
        }
        None => {
            tx.execute(
                "INSERT INTO documents (collection, id, seq, revision, tombstoned, body)
                 VALUES (?1, ?2,
                         (SELECT COALESCE(MAX(seq), 0) + 1 FROM documents WHERE collection = ?1),
                         ?3, ?4, ?5)",
                params![collection, doc.id(), revision, doc.is_tombstoned(), body],
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Article, Business, NewArticle, Revision};
    use tempfile::TempDir;

    fn article(id: &str, business_id: &str) -> Article {
        Article::with_id(
            id,
            NewArticle {
                name: "Bolt".to_string(),
                quantity: 1,
                unit_price: 2.0,
                business_id: business_id.to_string(),
            },
        )
    }

    #[test]
    fn test_upsert_and_load_in_insertion_order() {
        let db = SqlitePersistence::open_in_memory().unwrap();
        for id in ["c", "a", "b"] {
            db.upsert(&Business::with_id(id, format!("Biz {}", id))).unwrap();
        }

        let mut first = Business::with_id("c", "Renamed");
        first.meta.revision = Some(Revision::from("1-abc"));
        db.upsert(&first).unwrap();

        let loaded: Vec<Business> = db.load().unwrap();
        let ids: Vec<&str> = loaded.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(loaded[0], first);
    }

    #[test]
    fn test_delete() {
        let db = SqlitePersistence::open_in_memory().unwrap();
        db.upsert(&Business::with_id("b1", "Acme")).unwrap();
        db.upsert(&Business::with_id("b2", "Gone")).unwrap();

        assert!(db.delete(CollectionName::Businesses, "b2").unwrap());
        assert!(!db.delete(CollectionName::Businesses, "b2").unwrap());
        assert!(!db.delete(CollectionName::Articles, "b1").unwrap());

        let loaded: Vec<Business> = db.load().unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn test_mirrored_columns() {
        let db = SqlitePersistence::open_in_memory().unwrap();
        let mut b = Business::with_id("b1", "Acme");
        b.meta.revision = Some(Revision::from("1-a"));
        b.meta.tombstoned = true;
        db.upsert(&b).unwrap();

        let conn = db.lock();
        let (revision, tombstoned): (Option<String>, bool) = conn
            .query_row(
                "SELECT revision, tombstoned FROM documents WHERE id = 'b1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(revision.as_deref(), Some("1-a"));
        assert!(tombstoned);
    }

    #[test]
    fn test_replace_both_rolls_back_together() {
        let db = SqlitePersistence::open_in_memory().unwrap();
        db.upsert(&Business::with_id("old", "Old")).unwrap();
        db.upsert(&article("a-old", "old")).unwrap();

        // Fails the article insert after the businesses were replaced
        db.conn
            .lock()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_bad BEFORE INSERT ON documents
                 WHEN NEW.id = 'bad' BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();
        let err = db.replace_both(&[Business::with_id("n1", "One")], &[article("bad", "n1")]);
        assert!(err.is_err());

        let businesses: Vec<Business> = db.load().unwrap();
        let articles: Vec<Article> = db.load().unwrap();
        assert_eq!(businesses[0].id, "old");
        assert_eq!(businesses.len(), 1);
        assert_eq!(articles[0].id, "a-old");

        db.replace_both(&[Business::with_id("n1", "One")], &[article("a1", "n1")])
            .unwrap();
        let businesses: Vec<Business> = db.load().unwrap();
        let articles: Vec<Article> = db.load().unwrap();
        assert_eq!(businesses[0].id, "n1");
        assert_eq!(articles[0].id, "a1");
    }

    #[test]
    fn test_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("stockroom.db");

        {
            let db = SqlitePersistence::open(&path).unwrap();
            db.upsert(&Business::with_id("b1", "Acme")).unwrap();
        }

        let db = SqlitePersistence::open(&path).unwrap();
        assert_eq!(db.path(), Some(path.as_path()));
        let loaded: Vec<Business> = db.load().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].name, "Acme");
    }
}
