//! One JSON file per document.
//!
//! Writes go to `<id>.json.tmp` first, are read back and length-checked, and only
//! then renamed over `<id>.json`, so a crash mid-write never truncates the
//! previous version of a note.

use std::io;
use std::time::Instant;

use async_trait::async_trait;
use camino::Utf8Path;
use camino::Utf8PathBuf;
use tokio::fs;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::Document;
use crate::DocumentId;
use crate::DocumentStore;
use crate::StoreError;

const EXTENSION: &str = "json";

#[derive(Clone, Debug)]
pub struct FileStore {
    dir: Utf8PathBuf,
}

impl FileStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub async fn open(dir: impl Into<Utf8PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(|e| {
            StoreError::unavailable(format!("failed to create notes directory {dir}"), Some(e))
        })?;
        info!(%dir, "Notes directory ready");
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Utf8Path {
        &self.dir
    }

    /// The file backing `id`, or `None` when the id is not a single plain file
    /// name and would resolve outside the notes directory.
    fn path_for(&self, id: &DocumentId) -> Option<Utf8PathBuf> {
        is_plain_name(id.as_str()).then(|| self.dir.join(format!("{id}.{EXTENSION}")))
    }

    fn require_path(&self, id: &DocumentId) -> Result<Utf8PathBuf, StoreError> {
        self.path_for(id)
            .ok_or_else(|| StoreError::write(id, "note id is not a valid file name", None))
    }

    async fn read_document(path: &Utf8Path) -> io::Result<Document> {
        let bytes = fs::read(path).await?;
        serde_json::from_slice(&bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

fn is_plain_name(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.contains(['/', '\\', '\0'])
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn load_all(&self) -> Result<Vec<Document>, StoreError> {
        let started = Instant::now();
        let mut entries = fs::read_dir(&self.dir).await.map_err(|e| {
            StoreError::unavailable(format!("failed to read notes directory {}", self.dir), Some(e))
        })?;

        let mut documents = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    return Err(StoreError::unavailable(
                        format!("failed to list notes directory {}", self.dir),
                        Some(e),
                    ))
                }
            };

            let Ok(path) = Utf8PathBuf::try_from(entry.path()) else {
                continue;
            };
            if path.extension() != Some(EXTENSION) {
                continue;
            }
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(true) {
                continue;
            }

            match Self::read_document(&path).await {
                Ok(document) if !is_plain_name(document.id.as_str()) => {
                    warn!(%path, id = %document.id, "Skipping note with an unusable id");
                }
                Ok(document) => {
                    debug!(id = %document.id, title = %document.title, "Loaded note");
                    documents.push(document);
                }
                Err(e) => warn!(%path, error = %e, "Skipping unreadable note file"),
            }
        }

        documents.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        info!(count = documents.len(), elapsed = ?started.elapsed(), "Loaded notes");
        Ok(documents)
    }

    async fn save(&self, document: &Document) -> Result<(), StoreError> {
        let id = &document.id;
        let started = Instant::now();
        let data = serde_json::to_vec(document).map_err(|e| {
            StoreError::write(id, format!("failed to serialize: {e}"), None)
        })?;

        let target = self.require_path(id)?;
        let temp = Utf8PathBuf::from(format!("{target}.tmp"));
        debug!(%id, %target, len = data.len(), "Writing note");

        fs::write(&temp, &data)
            .await
            .map_err(|e| StoreError::write(id, "failed to write temporary file", Some(e)))?;

        let written = fs::read(&temp)
            .await
            .map_err(|e| StoreError::write(id, "failed to read back temporary file", Some(e)))?;
        if written.len() != data.len() {
            return Err(StoreError::write(
                id,
                format!(
                    "temporary file size mismatch: expected {}, got {}",
                    data.len(),
                    written.len()
                ),
                None,
            ));
        }

        fs::rename(&temp, &target)
            .await
            .map_err(|e| StoreError::write(id, "failed to finalize note file", Some(e)))?;

        let metadata = fs::metadata(&target)
            .await
            .map_err(|e| StoreError::write(id, "saved file cannot be accessed", Some(e)))?;
        if metadata.len() != data.len() as u64 {
            return Err(StoreError::write(
                id,
                format!(
                    "final file size mismatch: expected {}, got {}",
                    data.len(),
                    metadata.len()
                ),
                None,
            ));
        }

        debug!(%id, elapsed = ?started.elapsed(), "Note written");
        Ok(())
    }

    async fn delete(&self, id: &DocumentId) -> Result<(), StoreError> {
        match fs::remove_file(self.require_path(id)?).await {
            Ok(()) => {
                info!(%id, "Note deleted");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(%id, "Note already absent");
                Ok(())
            }
            Err(e) => Err(StoreError::write(id, "failed to delete note", Some(e))),
        }
    }

    async fn load(&self, id: &DocumentId) -> Result<Option<Document>, StoreError> {
        let Some(path) = self.path_for(id) else {
            return Ok(None);
        };
        match Self::read_document(&path).await {
            Ok(document) => Ok(Some(document)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                warn!(%path, error = %e, "Note file is not valid JSON");
                Ok(None)
            }
            Err(e) => Err(StoreError::unavailable(format!("failed to read {path}"), Some(e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use chrono::Utc;
    use tempfile::tempdir;

    use super::*;

    fn utf8(path: &std::path::Path) -> Utf8PathBuf {
        Utf8PathBuf::try_from(path.to_path_buf()).unwrap()
    }

    #[tokio::test]
    async fn test_open_creates_directory() {
        let dir = tempdir().unwrap();
        let notes = utf8(dir.path()).join("nested").join("notes");
        let store = FileStore::open(&notes).await.unwrap();
        assert!(store.dir().is_dir());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(utf8(dir.path())).await.unwrap();
        let doc = Document::new("1", "First", "hello", Utc::now()).with_tags(["a"]);

        store.save(&doc).await.unwrap();

        assert!(utf8(dir.path()).join("1.json").is_file());
        assert!(!utf8(dir.path()).join("1.json.tmp").exists());
        assert_eq!(store.load_all().await.unwrap(), vec![doc.clone()]);
        assert_eq!(store.load(&doc.id).await.unwrap(), Some(doc));
    }

    #[tokio::test]
    async fn test_save_replaces_previous_version() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(utf8(dir.path())).await.unwrap();
        let mut doc = Document::new("1", "First", "a much longer first version", Utc::now());
        store.save(&doc).await.unwrap();

        doc.content = "short".to_string();
        store.save(&doc).await.unwrap();

        let loaded = store.load(&doc.id).await.unwrap().unwrap();
        assert_eq!(loaded.content, "short");
    }

    #[tokio::test]
    async fn test_load_all_skips_foreign_and_broken_files() {
        let dir = tempdir().unwrap();
        let root = utf8(dir.path());
        let store = FileStore::open(&root).await.unwrap();
        store
            .save(&Document::new("ok", "Fine", "body", Utc::now()))
            .await
            .unwrap();

        std::fs::write(root.join("broken.json"), "{ not json").unwrap();
        std::fs::write(root.join("readme.txt"), "ignore me").unwrap();
        std::fs::create_dir(root.join("folder.json")).unwrap();

        let docs = store.load_all().await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id.as_str(), "ok");
        assert_eq!(store.load(&DocumentId::new("broken")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_load_all_newest_first() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(utf8(dir.path())).await.unwrap();
        let now = Utc::now();
        let mut old = Document::new("old", "Old", "", now - TimeDelta::hours(1));
        old.updated_at = now - TimeDelta::hours(1);
        let new = Document::new("new", "New", "", now);
        store.save(&old).await.unwrap();
        store.save(&new).await.unwrap();

        let ids: Vec<_> = store
            .load_all()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        assert_eq!(ids, vec![DocumentId::new("new"), DocumentId::new("old")]);
    }

    #[tokio::test]
    async fn test_ids_cannot_leave_the_notes_directory() {
        let dir = tempdir().unwrap();
        let root = utf8(dir.path());
        let notes = root.join("notes");
        let store = FileStore::open(&notes).await.unwrap();
        std::fs::write(root.join("victim.json"), "keep").unwrap();

        let escaping = Document::new("../victim", "Evil", "body", Utc::now());
        std::fs::write(
            notes.join("evil.json"),
            serde_json::to_vec(&escaping).unwrap(),
        )
        .unwrap();
        assert!(store.load_all().await.unwrap().is_empty());

        assert!(matches!(
            store.save(&escaping).await,
            Err(StoreError::Write { .. })
        ));
        assert!(matches!(
            store.delete(&escaping.id).await,
            Err(StoreError::Write { .. })
        ));
        assert_eq!(store.load(&escaping.id).await.unwrap(), None);
        assert_eq!(std::fs::read_to_string(root.join("victim.json")).unwrap(), "keep");
        assert!(!root.join("victim.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FileStore::open(utf8(dir.path())).await.unwrap();
        let doc = Document::new("1", "First", "hello", Utc::now());
        store.save(&doc).await.unwrap();

        store.delete(&doc.id).await.unwrap();
        store.delete(&doc.id).await.unwrap();
        assert!(store.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_directory_is_unavailable() {
        let dir = tempdir().unwrap();
        let root = utf8(dir.path()).join("notes");
        let store = FileStore::open(&root).await.unwrap();
        std::fs::remove_dir(&root).unwrap();

        let result = store.load_all().await;
        assert!(matches!(result, Err(StoreError::Unavailable { .. })));
    }
}
