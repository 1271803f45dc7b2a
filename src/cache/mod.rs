use std::fmt;
use std::path::Path;

use error_stack::{IntoReport, Report, ResultExt};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::music::{key_seed, mode_seed, Analysis, Key, Mode};

#[derive(Debug)]
pub struct CacheError;

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Analysis cache error")
    }
}

impl std::error::Error for CacheError {}

pub type CacheResult<T> = error_stack::Result<T, CacheError>;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS keys (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS modes (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS collections (
        id TEXT PRIMARY KEY,
        playlist_id TEXT NOT NULL,
        key_id INTEGER NOT NULL REFERENCES keys(id),
        mode_id INTEGER NOT NULL REFERENCES modes(id)
    );
    CREATE UNIQUE INDEX IF NOT EXISTS collections_playlist_key_mode
        ON collections (playlist_id, key_id, mode_id);
    CREATE TABLE IF NOT EXISTS tracks (
        id TEXT PRIMARY KEY,
        collection_id TEXT NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
        tempo REAL NOT NULL
    );
    CREATE INDEX IF NOT EXISTS tracks_collection ON tracks (collection_id);
";

/// A derived playlist owned by this tool, unique per (source playlist, key, mode).
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionRecord {
    pub id: String,
    pub source_playlist_id: String,
    pub key: Key,
    pub mode: Mode,
}

/// A track that was found to belong to one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedTrack {
    pub id: String,
    pub tempo: f64,
}

/// Local SQLite store of collection records and per-collection track analysis.
///
/// Every mutation runs in its own transaction and is committed before the call returns.
pub struct AnalysisCache {
    conn: Connection,
}

impl AnalysisCache {
    pub fn open(path: &Path) -> CacheResult<Self> {
        let conn = Connection::open(path)
            .into_report()
            .change_context(CacheError)
            .attach_printable(format!("Failed to open the cache at {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> CacheResult<Self> {
        let conn = Connection::open_in_memory()
            .into_report()
            .change_context(CacheError)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> CacheResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .into_report()
            .change_context(CacheError)
            .attach_printable("Failed to enable foreign keys")?;
        let cache = Self { conn };
        cache.initialize()?;
        Ok(cache)
    }

    /// Creates the tables and seeds the static key/mode listing. Safe to run on every open.
    fn initialize(&self) -> CacheResult<()> {
        self.write(|tx| {
            tx.execute_batch(SCHEMA)?;
            for (id, name) in key_seed() {
                tx.execute(
                    "INSERT OR IGNORE INTO keys (id, name) VALUES (?1, ?2)",
                    params![id, name],
                )?;
            }
            for (id, name) in mode_seed() {
                tx.execute(
                    "INSERT OR IGNORE INTO modes (id, name) VALUES (?1, ?2)",
                    params![id, name],
                )?;
            }
            Ok(())
        })
        .attach_printable("Failed to initialize the cache schema")
    }

    fn write<T>(
        &self,
        operation: impl FnOnce(&Transaction<'_>) -> rusqlite::Result<T>,
    ) -> CacheResult<T> {
        let tx = self
            .conn
            .unchecked_transaction()
            .into_report()
            .change_context(CacheError)?;
        let value = operation(&tx).into_report().change_context(CacheError)?;
        tx.commit().into_report().change_context(CacheError)?;
        Ok(value)
    }

    pub fn list_keys(&self) -> CacheResult<Vec<Key>> {
        let ids = self.select_ids("SELECT id FROM keys ORDER BY id")?;
        ids.into_iter()
            .map(|id| {
                Key::from_analysis(id).ok_or_else(|| {
                    Report::new(CacheError).attach_printable(format!("Invalid key id {} in cache", id))
                })
            })
            .collect()
    }

    pub fn list_modes(&self) -> CacheResult<Vec<Mode>> {
        let ids = self.select_ids("SELECT id FROM modes ORDER BY id")?;
        ids.into_iter()
            .map(|id| {
                Mode::from_id(id).ok_or_else(|| {
                    Report::new(CacheError).attach_printable(format!("Invalid mode id {} in cache", id))
                })
            })
            .collect()
    }

    fn select_ids(&self, sql: &str) -> CacheResult<Vec<i64>> {
        let mut stmt = self.conn.prepare(sql).into_report().change_context(CacheError)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, i64>(0))
            .into_report()
            .change_context(CacheError)?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .into_report()
            .change_context(CacheError)
    }

    pub fn find_collection(
        &self,
        source_playlist_id: &str,
        key: Key,
        mode: Mode,
    ) -> CacheResult<Option<CollectionRecord>> {
        let id: Option<String> = self
            .conn
            .query_row(
                "SELECT id FROM collections
                 WHERE playlist_id = ?1 AND key_id = ?2 AND mode_id = ?3",
                params![source_playlist_id, key.id(), mode.id()],
                |row| row.get(0),
            )
            .optional()
            .into_report()
            .change_context(CacheError)?;
        Ok(id.map(|id| CollectionRecord {
            id,
            source_playlist_id: source_playlist_id.to_string(),
            key,
            mode,
        }))
    }

    pub fn create_collection(
        &self,
        collection_id: &str,
        source_playlist_id: &str,
        key: Key,
        mode: Mode,
    ) -> CacheResult<()> {
        self.write(|tx| {
            tx.execute(
                "INSERT INTO collections (id, playlist_id, key_id, mode_id) VALUES (?1, ?2, ?3, ?4)",
                params![collection_id, source_playlist_id, key.id(), mode.id()],
            )
        })
        .attach_printable(format!(
            "Failed to store collection {} for playlist {} ({} {})",
            collection_id, source_playlist_id, key, mode
        ))?;
        Ok(())
    }

    /// Removes the collection record; its cached tracks go with it through the foreign key.
    pub fn delete_collection(&self, collection_id: &str) -> CacheResult<()> {
        self.write(|tx| {
            tx.execute("DELETE FROM collections WHERE id = ?1", params![collection_id])
        })
        .attach_printable(format!("Failed to delete collection {}", collection_id))?;
        Ok(())
    }

    pub fn find_track(&self, track_id: &str, collection_id: &str) -> CacheResult<Option<CachedTrack>> {
        self.conn
            .query_row(
                "SELECT id, tempo FROM tracks WHERE id = ?1 AND collection_id = ?2",
                params![track_id, collection_id],
                |row| {
                    Ok(CachedTrack {
                        id: row.get(0)?,
                        tempo: row.get(1)?,
                    })
                },
            )
            .optional()
            .into_report()
            .change_context(CacheError)
    }

    /// Analysis of a track as recorded by whichever collection cached it.
    pub fn find_analytics(&self, track_id: &str) -> CacheResult<Option<Analysis>> {
        let row: Option<(i64, i64, f64)> = self
            .conn
            .query_row(
                "SELECT collections.key_id, collections.mode_id, tracks.tempo
                 FROM tracks
                 INNER JOIN collections ON collections.id = tracks.collection_id
                 WHERE tracks.id = ?1",
                params![track_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .into_report()
            .change_context(CacheError)?;
        Ok(row.map(|(key_id, mode_id, tempo)| Analysis {
            key: Key::from_analysis(key_id),
            mode: Mode::from_id(mode_id),
            tempo,
        }))
    }

    /// Fails when the track id is already cached under any collection.
    pub fn add_track(&self, track_id: &str, collection_id: &str, tempo: f64) -> CacheResult<()> {
        self.write(|tx| {
            tx.execute(
                "INSERT INTO tracks (id, collection_id, tempo) VALUES (?1, ?2, ?3)",
                params![track_id, collection_id, tempo],
            )
        })
        .attach_printable(format!(
            "Failed to cache track {} for collection {}",
            track_id, collection_id
        ))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d_major() -> (Key, Mode) {
        (Key::new(2).unwrap(), Mode::Major)
    }

    #[test]
    fn test_seed_tables_are_listed() {
        let cache = AnalysisCache::open_in_memory().unwrap();
        assert_eq!(cache.list_keys().unwrap().len(), 12);
        assert_eq!(cache.list_modes().unwrap(), vec![Mode::Minor, Mode::Major]);
    }

    #[test]
    fn test_reopening_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sqlite.db");
        let (key, mode) = d_major();
        {
            let cache = AnalysisCache::open(&path).unwrap();
            cache.create_collection("col", "src", key, mode).unwrap();
        }
        let cache = AnalysisCache::open(&path).unwrap();
        assert_eq!(cache.find_collection("src", key, mode).unwrap().unwrap().id, "col");
        assert_eq!(cache.list_keys().unwrap().len(), 12);
    }

    #[test]
    fn test_collection_lookup_is_exact() {
        let cache = AnalysisCache::open_in_memory().unwrap();
        let (key, mode) = d_major();
        cache.create_collection("col", "src", key, mode).unwrap();

        let record = cache.find_collection("src", key, mode).unwrap().unwrap();
        assert_eq!(record.id, "col");
        assert!(cache.find_collection("src", key, Mode::Minor).unwrap().is_none());
        assert!(cache.find_collection("other", key, mode).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_collection_tuple_is_rejected() {
        let cache = AnalysisCache::open_in_memory().unwrap();
        let (key, mode) = d_major();
        cache.create_collection("col", "src", key, mode).unwrap();
        assert!(cache.create_collection("col-2", "src", key, mode).is_err());
        assert_eq!(cache.find_collection("src", key, mode).unwrap().unwrap().id, "col");
    }

    #[test]
    fn test_delete_collection_cascades_tracks() {
        let cache = AnalysisCache::open_in_memory().unwrap();
        let (key, mode) = d_major();
        cache.create_collection("col", "src", key, mode).unwrap();
        cache.add_track("a", "col", 120.0).unwrap();

        cache.delete_collection("col").unwrap();

        assert!(cache.find_collection("src", key, mode).unwrap().is_none());
        assert!(cache.find_track("a", "col").unwrap().is_none());
        assert!(cache.find_analytics("a").unwrap().is_none());
        // the id is free again once the owning collection is gone
        cache.create_collection("col-2", "src", key, mode).unwrap();
        cache.add_track("a", "col-2", 121.0).unwrap();
    }

    #[test]
    fn test_track_lookup_is_scoped_to_collection() {
        let cache = AnalysisCache::open_in_memory().unwrap();
        let (key, mode) = d_major();
        cache.create_collection("col", "src", key, mode).unwrap();
        cache.create_collection("other", "src", key, Mode::Minor).unwrap();
        cache.add_track("a", "col", 98.5).unwrap();

        assert_eq!(
            cache.find_track("a", "col").unwrap(),
            Some(CachedTrack {
                id: "a".to_string(),
                tempo: 98.5
            })
        );
        assert!(cache.find_track("a", "other").unwrap().is_none());
    }

    #[test]
    fn test_analytics_come_from_owning_collection() {
        let cache = AnalysisCache::open_in_memory().unwrap();
        let (key, mode) = d_major();
        cache.create_collection("col", "src", key, mode).unwrap();
        cache.add_track("a", "col", 120.0).unwrap();

        let analysis = cache.find_analytics("a").unwrap().unwrap();
        assert_eq!(analysis.key, Some(key));
        assert_eq!(analysis.mode, Some(mode));
        assert_eq!(analysis.tempo, 120.0);
        assert!(cache.find_analytics("missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_track_is_fatal() {
        let cache = AnalysisCache::open_in_memory().unwrap();
        let (key, mode) = d_major();
        cache.create_collection("col", "src", key, mode).unwrap();
        cache.create_collection("other", "src-2", key, mode).unwrap();
        cache.add_track("a", "col", 120.0).unwrap();

        assert!(cache.add_track("a", "col", 120.0).is_err());
        assert!(cache.add_track("a", "other", 120.0).is_err());
    }

    #[test]
    fn test_track_needs_existing_collection() {
        let cache = AnalysisCache::open_in_memory().unwrap();
        assert!(cache.add_track("a", "missing", 120.0).is_err());
    }
}
