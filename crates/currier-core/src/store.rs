//! File-per-entity collection/environment persistence (component C8).
//!
//! Grounded on the teacher's `recording/store.rs` `save_to_file` /
//! `load_from_file` pair, generalized from one file to a directory: each
//! collection is one YAML document, written through a temp-file-then-rename
//! so a crash mid-write never leaves a half-written document behind.

use crate::error::StoreError;
use crate::model::{Collection, Environment, Metadata};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub struct FileStore {
    collections_dir: PathBuf,
    environments_dir: PathBuf,
}

impl FileStore {
    pub fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref();
        let collections_dir = root.join("collections");
        let environments_dir = root.join("environments");
        fs::create_dir_all(&collections_dir)?;
        fs::create_dir_all(&environments_dir)?;
        Ok(Self {
            collections_dir,
            environments_dir,
        })
    }

    pub fn save_collection(&self, collection: &Collection) -> Result<(), StoreError> {
        let path = self.collections_dir.join(format!("{}.yaml", collection.id));
        write_atomic(&path, collection)
    }

    pub fn load_collection(&self, id: Uuid) -> Result<Collection, StoreError> {
        let path = self.collections_dir.join(format!("{id}.yaml"));
        let contents = fs::read_to_string(&path)
            .map_err(|e| if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(id.to_string())
            } else {
                StoreError::Io(e)
            })?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    pub fn delete_collection(&self, id: Uuid) -> Result<(), StoreError> {
        let path = self.collections_dir.join(format!("{id}.yaml"));
        fs::remove_file(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => StoreError::NotFound(id.to_string()),
            _ => StoreError::Io(e),
        })
    }

    /// List every collection's metadata only — never touches nested scripts
    /// or bodies, so listing a large directory of big collections stays cheap.
    pub fn list_collections(&self) -> Result<Vec<Metadata>, StoreError> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.collections_dir)? {
            let entry = entry?;
            if entry.path().extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let updated_at: DateTime<Utc> = entry
                .metadata()
                .and_then(|m| m.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            let contents = fs::read_to_string(entry.path())?;
            let doc: serde_yaml::Value = serde_yaml::from_str(&contents)?;
            let id: Uuid = serde_yaml::from_value(doc["id"].clone())?;
            let name: String = serde_yaml::from_value(doc["name"].clone()).unwrap_or_default();
            let description = doc
                .get("description")
                .and_then(|v| serde_yaml::from_value(v.clone()).ok());
            let request_count = doc.get("items").map(count_requests).unwrap_or(0);
            out.push(Metadata {
                id,
                name,
                description,
                request_count,
                updated_at,
            });
        }
        Ok(out)
    }

    pub fn save_environment(&self, environment: &Environment) -> Result<(), StoreError> {
        let path = self
            .environments_dir
            .join(format!("{}.yaml", environment.id));
        write_atomic(&path, environment)
    }

    pub fn load_environment(&self, id: Uuid) -> Result<Environment, StoreError> {
        let path = self.environments_dir.join(format!("{id}.yaml"));
        let contents = fs::read_to_string(&path)
            .map_err(|e| if e.kind() == std::io::ErrorKind::NotFound {
                StoreError::NotFound(id.to_string())
            } else {
                StoreError::Io(e)
            })?;
        Ok(serde_yaml::from_str(&contents)?)
    }

    /// Set exactly one environment active: in a single pass over every
    /// stored environment, clear the flag on everyone else and set it on
    /// `id`. Returns `StoreError::NotFound` if `id` doesn't match a stored
    /// environment.
    pub fn set_active_environment(&self, id: Uuid) -> Result<(), StoreError> {
        let mut found = false;
        for entry in fs::read_dir(&self.environments_dir)? {
            let entry = entry?;
            if entry.path().extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let contents = fs::read_to_string(entry.path())?;
            let mut environment: Environment = serde_yaml::from_str(&contents)?;
            let should_be_active = environment.id == id;
            found |= should_be_active;
            if environment.active != should_be_active {
                environment.active = should_be_active;
                write_atomic(&entry.path(), &environment)?;
            }
        }
        if found {
            Ok(())
        } else {
            Err(StoreError::NotFound(id.to_string()))
        }
    }
}

/// Recursively count `Item::Request` entries under a `serde_yaml::Value`
/// items array, descending into folders so a request nested several levels
/// deep is still counted.
fn count_requests(items: &serde_yaml::Value) -> usize {
    let Some(seq) = items.as_sequence() else { return 0 };
    seq.iter()
        .map(|item| match item.get("kind").and_then(|k| k.as_str()) {
            Some("request") => 1,
            Some("folder") => item.get("items").map(count_requests).unwrap_or(0),
            _ => 0,
        })
        .sum()
}

fn write_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let yaml = serde_yaml::to_string(value)?;
    let tmp_path = path.with_extension("yaml.tmp");
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(yaml.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn saves_and_reloads_a_collection() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let collection = Collection::new("smoke");
        store.save_collection(&collection).unwrap();

        let reloaded = store.load_collection(collection.id).unwrap();
        assert_eq!(reloaded.name, "smoke");
    }

    #[test]
    fn list_does_not_require_well_formed_nested_items() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let collection = Collection::new("listed");
        store.save_collection(&collection).unwrap();

        let listing = store.list_collections().unwrap();
        assert_eq!(listing.len(), 1);
        assert_eq!(listing[0].name, "listed");
    }

    #[test]
    fn missing_collection_is_not_found() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let err = store.load_collection(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn request_count_descends_into_nested_folders() {
        use crate::model::{Folder, Item, RequestDefinition};

        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let mut collection = Collection::new("nested");
        let leaf = RequestDefinition {
            id: Uuid::new_v4(),
            name: "leaf".into(),
            protocol: "http".into(),
            method: "GET".into(),
            url: "https://example.com".into(),
            headers: vec![],
            query: vec![],
            body: None,
            auth: None,
            pre_request_script: None,
            post_response_script: None,
            tests: vec![],
            timeout_ms: None,
            verify_tls: None,
            follow_redirects: true,
            max_redirects: 10,
        };
        let folder = Folder {
            id: Uuid::new_v4(),
            name: "nested".into(),
            description: None,
            auth: None,
            pre_request_script: None,
            post_response_script: None,
            items: vec![Item::Request(leaf)],
        };
        collection.items.push(Item::Folder(folder));
        store.save_collection(&collection).unwrap();

        let listing = store.list_collections().unwrap();
        assert_eq!(listing[0].request_count, 1);
    }

    #[test]
    fn set_active_environment_clears_every_other_flag() {
        use crate::model::Environment;

        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let mut a = Environment::new("a");
        a.active = true;
        let b = Environment::new("b");
        store.save_environment(&a).unwrap();
        store.save_environment(&b).unwrap();

        store.set_active_environment(b.id).unwrap();

        assert!(!store.load_environment(a.id).unwrap().active);
        assert!(store.load_environment(b.id).unwrap().active);
    }

    #[test]
    fn set_active_environment_rejects_unknown_id() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        let err = store.set_active_environment(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
