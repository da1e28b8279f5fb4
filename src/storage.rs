//! Key-value persistence for finished rides.
//!
//! Routes live as one JSON array under the `"routes"` key, the same layout
//! the ride list and ride detail views read.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{RideError, RideResult};
use crate::session::RouteRecord;

pub const ROUTES_KEY: &str = "routes";

/// String key → JSON blob store
pub trait KeyValueStore {
    fn get(&self, key: &str) -> RideResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> RideResult<()>;
    fn delete(&self, key: &str) -> RideResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> RideResult<Option<String>> {
        let entries = self.entries.lock().map_err(|_| {
            RideError::Storage("Failed to acquire store lock".to_string())
        })?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> RideResult<()> {
        let mut entries = self.entries.lock().map_err(|_| {
            RideError::Storage("Failed to acquire store lock".to_string())
        })?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> RideResult<()> {
        let mut entries = self.entries.lock().map_err(|_| {
            RideError::Storage("Failed to acquire store lock".to_string())
        })?;
        entries.remove(key);
        Ok(())
    }
}

/// One `<key>.json` file per key inside a directory
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn open(dir: impl AsRef<Path>) -> RideResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> RideResult<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(RideError::Storage(format!("Invalid key: {:?}", key)));
        }
        Ok(self.dir.join(format!("{}.json", key)))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> RideResult<Option<String>> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> RideResult<()> {
        let path = self.path_for(key)?;
        // Atomic replace
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn delete(&self, key: &str) -> RideResult<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Ride history on top of a [`KeyValueStore`]
pub struct RouteStore<S> {
    store: S,
}

impl<S: KeyValueStore> RouteStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn list(&self) -> RideResult<Vec<RouteRecord>> {
        match self.store.get(ROUTES_KEY)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Vec::new()),
        }
    }

    /// Store a route and return its id, bumped past any id already taken
    pub fn append(&self, mut record: RouteRecord) -> RideResult<i64> {
        let mut routes = self.list()?;
        while routes.iter().any(|r| r.id == record.id) {
            record.id += 1;
        }
        let id = record.id;
        log::info!("Saving route {} ({} stored)", id, routes.len() + 1);
        routes.push(record);
        self.write(&routes)?;
        Ok(id)
    }

    pub fn find(&self, id: i64) -> RideResult<Option<RouteRecord>> {
        Ok(self.list()?.into_iter().find(|r| r.id == id))
    }

    /// Remove a route, returning whether it existed
    pub fn delete(&self, id: i64) -> RideResult<bool> {
        let mut routes = self.list()?;
        let before = routes.len();
        routes.retain(|r| r.id != id);
        if routes.len() == before {
            return Ok(false);
        }
        self.write(&routes)?;
        log::info!("Deleted route {}", id);
        Ok(true)
    }

    fn write(&self, routes: &[RouteRecord]) -> RideResult<()> {
        let json = serde_json::to_string(routes)?;
        self.store.set(ROUTES_KEY, &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RoutePoint;
    use chrono::Utc;

    fn record(id: i64) -> RouteRecord {
        RouteRecord {
            id,
            start_date: Utc::now(),
            start_location: "Wrocław".to_string(),
            distance_km: 12.0,
            duration_sec: 900,
            avg_speed_kmh: 48.0,
            max_speed_kmh: 95.0,
            max_lean_left_deg: -18.0,
            max_lean_right_deg: 22.0,
            route_points: vec![RoutePoint::new(51.1, 17.03), RoutePoint::new(51.11, 17.04)],
        }
    }

    #[test]
    fn test_empty_store_lists_nothing() {
        let routes = RouteStore::new(MemoryStore::new());
        assert!(routes.list().unwrap().is_empty());
        assert!(routes.find(1).unwrap().is_none());
    }

    #[test]
    fn test_append_find_delete() {
        let routes = RouteStore::new(MemoryStore::new());
        routes.append(record(1)).unwrap();
        routes.append(record(2)).unwrap();

        assert_eq!(routes.list().unwrap().len(), 2);
        assert_eq!(routes.find(2).unwrap().unwrap().route_points.len(), 2);

        assert!(routes.delete(1).unwrap());
        assert!(!routes.delete(1).unwrap());
        let left = routes.list().unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, 2);
    }

    #[test]
    fn test_same_millisecond_ids_stay_distinct() {
        let routes = RouteStore::new(MemoryStore::new());
        assert_eq!(routes.append(record(500)).unwrap(), 500);
        assert_eq!(routes.append(record(500)).unwrap(), 501);
        assert_eq!(routes.append(record(500)).unwrap(), 502);

        assert!(routes.delete(500).unwrap());
        let ids: Vec<i64> = routes.list().unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![501, 502]);
    }

    #[test]
    fn test_corrupt_blob_is_an_error() {
        let store = MemoryStore::new();
        store.set(ROUTES_KEY, "{not json").unwrap();
        let routes = RouteStore::new(store);
        assert!(matches!(routes.list(), Err(RideError::Json(_))));
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = std::env::temp_dir().join(format!("ride_store_{}", std::process::id()));
        let store = FileStore::open(&dir).unwrap();

        assert_eq!(store.get("routes").unwrap(), None);
        store.set("routes", "[]").unwrap();
        assert_eq!(store.get("routes").unwrap().as_deref(), Some("[]"));
        store.delete("routes").unwrap();
        store.delete("routes").unwrap();
        assert_eq!(store.get("routes").unwrap(), None);

        assert!(store.set("../escape", "x").is_err());

        let routes = RouteStore::new(store);
        routes.append(record(7)).unwrap();
        let reopened = RouteStore::new(FileStore::open(&dir).unwrap());
        assert_eq!(reopened.find(7).unwrap().unwrap().start_location, "Wrocław");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
