//! # Storage Contract
//!
//! Everything the engine persists goes through [`KeyValueStore`], a string
//! key/value contract with exactly four operations. The engine does its own
//! encoding (JSON via serde) on top of it.
//!
//! ## Layers
//!
//! - [`MemoryStore`]: in-process store for tests and ephemeral sessions.
//! - [`crate::db::SqliteStore`]: durable store backed by SQLite.
//! - [`AlgorithmStorage`]: per-algorithm namespace with typed get/set, key
//!   listing and namespace-wide clear.
//! - [`ModelArtifacts`]: binary model blobs keyed `models-{algorithm}-{key}`.
//!
//! Read helpers treat a missing or corrupt entry as absent and log a warning;
//! callers fall back to defaults.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

/// The external persistence contract.
pub trait KeyValueStore: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn remove_item(&self, key: &str) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn clear(&self) -> Result<()>;
}

/// Decode the JSON stored under `key`. Missing, unreadable or corrupt entries yield `None`.
pub fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    let raw = match store.get_item(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!("Failed to read `{key}` from storage: {e:#}");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring corrupt entry `{key}`: {e}");
            None
        }
    }
}

/// Encode `value` as JSON under `key`.
///
/// # Errors
///
/// Returns an error if serialization or the write fails.
pub fn save_json<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value).with_context(|| format!("Failed to encode `{key}`"))?;
    store
        .set_item(key, &raw)
        .with_context(|| format!("Failed to write `{key}` to storage"))
}

/// Best-effort variant of [`save_json`]: failures are logged and dropped.
pub fn save_json_logged<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: &str, value: &T) -> bool {
    match save_json(store, key, value) {
        Ok(()) => true,
        Err(e) => {
            warn!("Dropping write of `{key}`: {e:#}");
            false
        }
    }
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.read().map(|items| items.len()).unwrap_or(0)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let items = self
            .items
            .read()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self
            .items
            .write()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let mut items = self
            .items
            .write()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        items.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut items = self
            .items
            .write()
            .map_err(|_| anyhow::anyhow!("memory store lock poisoned"))?;
        items.clear();
        Ok(())
    }
}

const KEY_INDEX: &str = "__keys";

/// Key/value storage scoped to one algorithm.
///
/// The underlying contract cannot enumerate keys, so the namespace keeps its
/// own key index under `{namespace}:__keys`.
#[derive(Clone)]
pub struct AlgorithmStorage {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
}

impl AlgorithmStorage {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, algorithm_id: &str) -> Self {
        Self {
            store,
            namespace: format!("cadence:algo:{algorithm_id}"),
        }
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}:{key}", self.namespace)
    }

    fn index(&self) -> BTreeSet<String> {
        load_json(self.store.as_ref(), &self.full_key(KEY_INDEX)).unwrap_or_default()
    }

    fn write_index(&self, index: &BTreeSet<String>) -> Result<()> {
        save_json(self.store.as_ref(), &self.full_key(KEY_INDEX), index)
    }

    /// Typed read; `None` if missing or undecodable.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        load_json(self.store.as_ref(), &self.full_key(key))
    }

    /// Raw string read.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    pub fn get_raw(&self, key: &str) -> Result<Option<String>> {
        self.store.get_item(&self.full_key(key))
    }

    /// # Errors
    ///
    /// Returns an error if encoding or either write fails.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        save_json(self.store.as_ref(), &self.full_key(key), value)?;
        let mut index = self.index();
        if index.insert(key.to_string()) {
            self.write_index(&index)?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    pub fn set_raw(&self, key: &str, value: &str) -> Result<()> {
        self.store.set_item(&self.full_key(key), value)?;
        let mut index = self.index();
        if index.insert(key.to_string()) {
            self.write_index(&index)?;
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let mut index = self.index();
        let existed = index.remove(key);
        self.store.remove_item(&self.full_key(key))?;
        if existed {
            self.write_index(&index)?;
        }
        Ok(existed)
    }

    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        matches!(self.store.get_item(&self.full_key(key)), Ok(Some(_)))
    }

    /// Keys in this namespace, optionally restricted to a prefix, sorted.
    #[must_use]
    pub fn keys(&self, prefix: Option<&str>) -> Vec<String> {
        self.index()
            .into_iter()
            .filter(|k| prefix.map_or(true, |p| k.starts_with(p)))
            .collect()
    }

    /// Remove every key in this namespace, leaving other namespaces intact.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    pub fn clear(&self) -> Result<usize> {
        let index = self.index();
        for key in &index {
            self.store.remove_item(&self.full_key(key))?;
        }
        self.store.remove_item(&self.full_key(KEY_INDEX))?;
        debug!("Cleared {} keys from `{}`", index.len(), self.namespace);
        Ok(index.len())
    }
}

/// Binary model artifacts for one algorithm, stored base64-encoded.
#[derive(Clone)]
pub struct ModelArtifacts {
    store: Arc<dyn KeyValueStore>,
    algorithm_id: String,
}

impl ModelArtifacts {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, algorithm_id: &str) -> Self {
        Self {
            store,
            algorithm_id: algorithm_id.to_string(),
        }
    }

    /// Storage key for `key`: `models-{algorithm_id}-{key}`.
    #[must_use]
    pub fn artifact_key(&self, key: &str) -> String {
        format!("models-{}-{key}", self.algorithm_id)
    }

    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    pub fn save(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let artifact_key = self.artifact_key(key);
        self.store
            .set_item(&artifact_key, &STANDARD.encode(bytes))
            .with_context(|| format!("Failed to save model artifact `{artifact_key}`"))
    }

    /// # Errors
    ///
    /// Returns an error if the backend cannot be read or the blob is not valid base64.
    pub fn load(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let artifact_key = self.artifact_key(key);
        let Some(encoded) = self.store.get_item(&artifact_key)? else {
            return Ok(None);
        };
        let bytes = STANDARD
            .decode(encoded.as_bytes())
            .with_context(|| format!("Model artifact `{artifact_key}` is corrupt"))?;
        Ok(Some(bytes))
    }

    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    pub fn delete(&self, key: &str) -> Result<()> {
        self.store.remove_item(&self.artifact_key(key))
    }

    #[must_use]
    pub fn exists(&self, key: &str) -> bool {
        matches!(self.store.get_item(&self.artifact_key(key)), Ok(Some(_)))
    }

    /// Locator for an existing artifact, `None` if it was never saved.
    #[must_use]
    pub fn get_url(&self, key: &str) -> Option<String> {
        self.exists(key)
            .then(|| format!("store://{}", self.artifact_key(key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Weights {
        bias: f32,
        layers: Vec<u32>,
    }

    fn shared_store() -> Arc<dyn KeyValueStore> {
        Arc::new(MemoryStore::new())
    }

    #[test]
    fn test_json_helpers_tolerate_corruption() {
        let store = MemoryStore::new();
        store.set_item("broken", "{not json").unwrap();
        assert!(load_json::<Weights>(&store, "broken").is_none());
        assert!(load_json::<Weights>(&store, "missing").is_none());

        let weights = Weights { bias: 0.5, layers: vec![4, 2] };
        assert!(save_json_logged(&store, "ok", &weights));
        assert_eq!(load_json::<Weights>(&store, "ok"), Some(weights));
    }

    #[test]
    fn test_namespaces_are_isolated() {
        let store = shared_store();
        let a = AlgorithmStorage::new(Arc::clone(&store), "alpha");
        let b = AlgorithmStorage::new(Arc::clone(&store), "beta");

        a.set("weights/v1", &1).unwrap();
        a.set("weights/v2", &2).unwrap();
        a.set("meta", &"x").unwrap();
        b.set("weights/v1", &10).unwrap();

        assert_eq!(a.get::<i32>("weights/v1"), Some(1));
        assert_eq!(b.get::<i32>("weights/v1"), Some(10));
        assert_eq!(a.keys(Some("weights/")), vec!["weights/v1", "weights/v2"]);
        assert_eq!(a.keys(None).len(), 3);

        assert!(a.delete("meta").unwrap());
        assert!(!a.has("meta"));
        assert!(!a.delete("meta").unwrap());

        assert_eq!(a.clear().unwrap(), 2);
        assert!(a.keys(None).is_empty());
        assert!(b.has("weights/v1"), "Clearing one namespace leaves others intact");
    }

    #[test]
    fn test_model_artifacts_round_trip() {
        let store = shared_store();
        let models = ModelArtifacts::new(Arc::clone(&store), "alpha");

        assert!(models.get_url("net").is_none());
        models.save("net", &[0, 1, 2, 255]).unwrap();
        assert!(models.exists("net"));
        assert_eq!(models.load("net").unwrap(), Some(vec![0, 1, 2, 255]));
        assert_eq!(models.get_url("net").as_deref(), Some("store://models-alpha-net"));
        assert!(store.get_item("models-alpha-net").unwrap().is_some(), "Key scheme is stable");

        models.delete("net").unwrap();
        assert_eq!(models.load("net").unwrap(), None);
    }

    #[test]
    fn test_corrupt_artifact_is_an_error() {
        let store = shared_store();
        store.set_item("models-alpha-net", "%%%").unwrap();
        let models = ModelArtifacts::new(store, "alpha");
        assert!(models.load("net").is_err());
    }
}
