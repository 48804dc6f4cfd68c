use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use super::{Error, Storage, StorageTable, StorageTableSpec};

const TEMP_SUFFIX: &str = ".tmp";

/// Storage rooted at a directory on disk.
///
/// Each table is a subdirectory; each key is a file named after the hex encoding of the key,
/// so keys are limited to [FileStorage::MAX_KEY_LEN] bytes. Writes go to a temporary file
/// which is then renamed over the target.
#[derive(Clone, Debug)]
pub struct FileStorage {
    root: PathBuf,
}

pub struct FileTable {
    spec: StorageTableSpec,
    dir: PathBuf,
}

impl FileStorage {
    /// Longest key whose hex encoding fits in a file name (255 bytes on common file systems).
    pub const MAX_KEY_LEN: usize = 127;

    /// Opens the storage, creating `root` if it does not exist.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, Error> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

fn valid_table_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

#[async_trait]
impl Storage for FileStorage {
    async fn get_table(&self, spec: &StorageTableSpec) -> Result<Arc<dyn StorageTable>, Error> {
        spec.check_supported()?;
        if !valid_table_name(&spec.name) {
            return Err(Error::InvalidName(spec.name.clone()));
        }
        let dir = self.root.join(&spec.name);
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Arc::new(FileTable {
            spec: spec.clone(),
            dir,
        }))
    }
}

impl FileTable {
    fn path_for(&self, key: &str) -> Result<PathBuf, Error> {
        if key.is_empty() || key.len() > FileStorage::MAX_KEY_LEN {
            return Err(Error::InvalidName(key.to_string()));
        }
        Ok(self.dir.join(hex::encode(key.as_bytes())))
    }
}

#[async_trait]
impl StorageTable for FileTable {
    fn spec(&self) -> &StorageTableSpec {
        &self.spec
    }

    async fn enumerate(&self) -> Result<Vec<String>, Error> {
        let mut keys = vec![];
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if file_name.ends_with(TEMP_SUFFIX) {
                continue;
            }
            let key = hex::decode(file_name)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .ok_or_else(|| Error::InvalidName(file_name.to_string()))?;
            keys.push(key);
        }
        keys.sort();
        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        match tokio::fs::read(self.path_for(key)?).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn insert(&self, key: &str, data: Vec<u8>) -> Result<(), Error> {
        let target = self.path_for(key)?;
        let temp = self
            .dir
            .join(format!("{}{TEMP_SUFFIX}", Uuid::new_v4().simple()));
        tokio::fs::write(&temp, data).await?;
        if let Err(e) = tokio::fs::rename(&temp, &target).await {
            let _ = tokio::fs::remove_file(&temp).await;
            return Err(e.into());
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, Error> {
        match tokio::fs::remove_file(self.path_for(key)?).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
