//! Object storage for evidence photos.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use log::info;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `name` and return the public URL.
    async fn put(&self, bytes: Vec<u8>, name: &str) -> Result<String>;

    /// Remove a previously stored object. Missing objects are not an error.
    async fn remove(&self, name: &str) -> Result<()>;
}

/// Stores objects as files in one directory.
pub struct LocalObjectStore {
    root: PathBuf,
    base_url: String,
}

impl LocalObjectStore {
    pub fn new(root: PathBuf, base_url: Option<String>) -> Result<Self> {
        std::fs::create_dir_all(&root)
            .with_context(|| format!("failed to create evidence directory {}", root.display()))?;
        let base_url = base_url.unwrap_or_else(|| format!("file://{}", root.display()));
        Ok(Self {
            root,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        if !valid {
            bail!("invalid object name {name:?}");
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, bytes: Vec<u8>, name: &str) -> Result<String> {
        let path = self.object_path(name)?;
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            bail!("object {name} already exists");
        }
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("Stored evidence {} ({} bytes)", name, bytes.len());
        Ok(format!("{}/{}", self.base_url, name))
    }

    async fn remove(&self, name: &str) -> Result<()> {
        let path = self.object_path(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_returns_public_url_and_refuses_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            LocalObjectStore::new(dir.path().join("evidence"), Some("https://cdn.test/ev/".into()))
                .unwrap();

        let url = store.put(vec![1, 2, 3], "1700000000000_ab.png").await.unwrap();
        assert_eq!(url, "https://cdn.test/ev/1700000000000_ab.png");
        assert!(store.root().join("1700000000000_ab.png").exists());

        assert!(store.put(vec![4], "1700000000000_ab.png").await.is_err());

        store.remove("1700000000000_ab.png").await.unwrap();
        store.remove("1700000000000_ab.png").await.unwrap();
        assert!(!store.root().join("1700000000000_ab.png").exists());
    }

    #[tokio::test]
    async fn rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path().to_path_buf(), None).unwrap();
        assert!(store.put(vec![1], "../escape.png").await.is_err());
        assert!(store.put(vec![1], "").await.is_err());
    }
}
