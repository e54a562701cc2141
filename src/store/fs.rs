use super::ShardStore;
use crate::io::compression::{DynRead, auto_detect_reader, encode_for_path};
use crate::io::jsonl::encode_jsonl;
use crate::record::Record;
use anyhow::{Context, Result, bail};
use std::io::Write;
use std::path::{Path, PathBuf};

/// One file per key: `<dir>/<key>.<extension>`.
///
/// Values are written to a temporary file in the same directory and renamed
/// into place, so readers never observe a half-written shard.
#[derive(Debug)]
pub struct FsShardStore {
    dir: PathBuf,
    url: String,
    extension: String,
}

impl FsShardStore {
    /// Open `dir`, creating it if needed.
    ///
    /// # Errors
    /// Fails when the directory cannot be created.
    pub fn create(dir: impl Into<PathBuf>, url: &str, extension: &str) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).with_context(|| format!("mkdir -p {}", dir.display()))?;
        Ok(Self::at(dir, url, extension))
    }

    /// Open an existing directory.
    ///
    /// # Errors
    /// Fails when `dir` is not a directory.
    pub fn existing(dir: impl Into<PathBuf>, url: &str, extension: &str) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            bail!("shard directory {} does not exist", dir.display());
        }
        Ok(Self::at(dir, url, extension))
    }

    fn at(dir: PathBuf, url: &str, extension: &str) -> Self {
        Self {
            dir,
            url: url.to_string(),
            extension: extension.to_string(),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{}", self.extension))
    }
}

impl ShardStore for FsShardStore {
    fn url(&self) -> &str {
        &self.url
    }

    fn set(&self, key: &str, records: &[Record]) -> Result<()> {
        let path = self.path_for(key);
        let payload = encode_for_path(encode_jsonl(records)?, &path)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .with_context(|| format!("create temp file in {}", self.dir.display()))?;
        tmp.write_all(&payload)
            .with_context(|| format!("write {}", path.display()))?;
        tmp.persist(&path)
            .with_context(|| format!("move shard into {}", path.display()))?;
        Ok(())
    }

    fn reader(&self, key: &str) -> Result<DynRead> {
        let path = self.path_for(key);
        let f = std::fs::File::open(&path).with_context(|| format!("open {}", path.display()))?;
        auto_detect_reader(f, &path)
    }

    fn keys(&self) -> Result<Vec<String>> {
        let suffix = format!(".{}", self.extension);
        let mut keys = Vec::new();
        let entries =
            std::fs::read_dir(&self.dir).with_context(|| format!("list {}", self.dir.display()))?;
        for entry in entries {
            let name = entry?.file_name();
            if let Some(key) = name.to_string_lossy().strip_suffix(&suffix) {
                keys.push(key.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }
}
