//! Key-value stores for the schedule snapshot.

use std::collections::HashMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::models::types::Result;
use crate::network::traits::KeyValueStore;

/// Process-local store, mostly useful for tests and previews
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + 'a>> {
        let value = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned();
        Box::pin(async move { Ok(value) })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
        Box::pin(async { Ok(()) })
    }
}

/// One file per key inside a directory
#[derive(Clone, Debug)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File for `key`, always a direct child of the root.
    ///
    /// Leading dots are replaced too, so `.` and `..` cannot name the root or
    /// its parent.
    fn path_for(&self, key: &str) -> PathBuf {
        let mut leading = true;
        let mut file_name: String = key
            .chars()
            .map(|c| {
                let keep = c.is_ascii_alphanumeric()
                    || c == '-'
                    || c == '_'
                    || (c == '.' && !leading);
                leading &= c == '.';
                if keep {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if file_name.is_empty() {
            file_name.push('_');
        }
        self.root.join(file_name)
    }
}

impl KeyValueStore for DirectoryStore {
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>>> + Send + 'a>> {
        Box::pin(async move {
            match tokio::fs::read_to_string(self.path_for(key)).await {
                Ok(value) => Ok(Some(value)),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: String,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            tokio::fs::create_dir_all(&self.root).await?;

            // Write next to the target and rename so readers never see half a file
            let path = self.path_for(key);
            let mut staging = path.clone().into_os_string();
            staging.push(".partial");
            tokio::fs::write(&staging, value.as_bytes()).await?;
            tokio::fs::rename(&staging, &path).await?;

            debug!(key, bytes = value.len(), path = %path.display(), "stored cache entry");
            Ok(())
        })
    }
}
