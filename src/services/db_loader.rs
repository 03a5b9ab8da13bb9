use parking_lot::Mutex;
use rusqlite::{params, Connection};
use crate::error::AppError;
use tracing::{info, debug, error};

/// The two independent collections entities are persisted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Datasets,
    Pages,
}

impl Collection {
    fn table(&self) -> &'static str {
        match self {
            Collection::Datasets => "datasets",
            Collection::Pages => "pages",
        }
    }

    // Datasets list newest first, pages oldest first
    fn order(&self) -> &'static str {
        match self {
            Collection::Datasets => "created_at DESC, id ASC",
            Collection::Pages => "created_at ASC, id ASC",
        }
    }
}

/// A whole-entity snapshot as stored: id, creation time and JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntity {
    pub id: String,
    pub created_at: i64,
    pub body: String,
}

/// Durable key-value store with upsert-by-id semantics per collection.
pub trait EntityStore: Send + Sync {
    fn get_all(&self, collection: Collection) -> Result<Vec<StoredEntity>, AppError>;

    fn put(&self, collection: Collection, entity: &StoredEntity) -> Result<(), AppError>;

    /// Upserts all entities in one transaction.
    fn put_many(&self, collection: Collection, entities: &[StoredEntity]) -> Result<(), AppError>;

    fn delete(&self, collection: Collection, id: &str) -> Result<(), AppError>;

    /// Deletes `id` from one collection and upserts `entities` into another,
    /// atomically.
    fn delete_and_put_many(
        &self,
        delete_from: Collection,
        id: &str,
        put_into: Collection,
        entities: &[StoredEntity],
    ) -> Result<(), AppError>;
}

pub struct DbLoader {
    conn: Mutex<Connection>,
}

impl DbLoader {
    pub fn open(path: &str) -> Result<Self, AppError> {
        info!("Opening store at {}", path);
        let conn = Connection::open(path).map_err(|e| {
            error!("Failed to open database {}: {}", path, e);
            AppError::DatabaseError(e.to_string())
        })?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        debug!("Opening in-memory store");
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, AppError> {
        for collection in [Collection::Datasets, Collection::Pages] {
            let create_table_sql = format!(
                "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY, created_at INTEGER NOT NULL, body TEXT NOT NULL)",
                collection.table()
            );
            debug!("Create table SQL: {}", create_table_sql);
            conn.execute(&create_table_sql, [])?;
        }

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn upsert(conn: &Connection, collection: Collection, entity: &StoredEntity) -> Result<(), AppError> {
        let sql = format!(
            "INSERT INTO {} (id, created_at, body) VALUES (?1, ?2, ?3) \
             ON CONFLICT(id) DO UPDATE SET created_at = excluded.created_at, body = excluded.body",
            collection.table()
        );
        conn.execute(&sql, params![entity.id, entity.created_at, entity.body])?;
        Ok(())
    }

    fn remove(conn: &Connection, collection: Collection, id: &str) -> Result<(), AppError> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", collection.table());
        conn.execute(&sql, params![id])?;
        Ok(())
    }
}

impl EntityStore for DbLoader {
    fn get_all(&self, collection: Collection) -> Result<Vec<StoredEntity>, AppError> {
        let conn = self.conn.lock();
        let sql = format!(
            "SELECT id, created_at, body FROM {} ORDER BY {}",
            collection.table(),
            collection.order()
        );
        let mut stmt = conn.prepare(&sql)?;
        let entities = stmt
            .query_map([], |row| {
                Ok(StoredEntity {
                    id: row.get(0)?,
                    created_at: row.get(1)?,
                    body: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Loaded {} entities from {}", entities.len(), collection.table());
        Ok(entities)
    }

    fn put(&self, collection: Collection, entity: &StoredEntity) -> Result<(), AppError> {
        let conn = self.conn.lock();
        Self::upsert(&conn, collection, entity)
    }

    fn put_many(&self, collection: Collection, entities: &[StoredEntity]) -> Result<(), AppError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for entity in entities {
            Self::upsert(&tx, collection, entity)?;
        }
        tx.commit()?;
        debug!("Wrote {} entities to {}", entities.len(), collection.table());
        Ok(())
    }

    fn delete(&self, collection: Collection, id: &str) -> Result<(), AppError> {
        let conn = self.conn.lock();
        Self::remove(&conn, collection, id)
    }

    fn delete_and_put_many(
        &self,
        delete_from: Collection,
        id: &str,
        put_into: Collection,
        entities: &[StoredEntity],
    ) -> Result<(), AppError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        Self::remove(&tx, delete_from, id)?;
        for entity in entities {
            Self::upsert(&tx, put_into, entity)?;
        }
        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(id: &str, created_at: i64) -> StoredEntity {
        StoredEntity {
            id: id.to_string(),
            created_at,
            body: format!(r#"{{"id":"{}"}}"#, id),
        }
    }

    fn ids(entities: &[StoredEntity]) -> Vec<&str> {
        entities.iter().map(|e| e.id.as_str()).collect()
    }

    #[test]
    fn collections_keep_their_load_order() {
        let store = DbLoader::open_in_memory().unwrap();
        for (id, at) in [("a", 1), ("b", 3), ("c", 2)] {
            store.put(Collection::Datasets, &entity(id, at)).unwrap();
            store.put(Collection::Pages, &entity(id, at)).unwrap();
        }

        assert_eq!(ids(&store.get_all(Collection::Datasets).unwrap()), vec!["b", "c", "a"]);
        assert_eq!(ids(&store.get_all(Collection::Pages).unwrap()), vec!["a", "c", "b"]);
    }

    #[test]
    fn put_upserts_by_id() {
        let store = DbLoader::open_in_memory().unwrap();
        store.put(Collection::Pages, &entity("p", 1)).unwrap();
        let mut updated = entity("p", 1);
        updated.body = "{}".to_string();
        store.put(Collection::Pages, &updated).unwrap();

        let all = store.get_all(Collection::Pages).unwrap();
        assert_eq!(all, vec![updated]);
    }

    #[test]
    fn delete_and_put_many_is_one_step() {
        let store = DbLoader::open_in_memory().unwrap();
        store.put(Collection::Datasets, &entity("d", 1)).unwrap();
        store
            .delete_and_put_many(Collection::Datasets, "d", Collection::Pages, &[entity("p1", 1), entity("p2", 2)])
            .unwrap();

        assert!(store.get_all(Collection::Datasets).unwrap().is_empty());
        assert_eq!(ids(&store.get_all(Collection::Pages).unwrap()), vec!["p1", "p2"]);
    }

    #[test]
    fn entities_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.db");
        let path = path.to_str().unwrap();

        DbLoader::open(path).unwrap().put_many(Collection::Datasets, &[entity("x", 5)]).unwrap();
        let reopened = DbLoader::open(path).unwrap();
        assert_eq!(ids(&reopened.get_all(Collection::Datasets).unwrap()), vec!["x"]);
    }
}
