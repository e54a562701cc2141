use super::ShardStore;
use crate::io::cloud::{ObjectIO, ObjectUrl, parse_object_url};
use crate::io::compression::{DynRead, auto_detect_reader, encode_for_path};
use crate::io::jsonl::encode_jsonl;
use crate::record::Record;
use anyhow::{Context, Result};
use std::io::Cursor;
use std::sync::Arc;

/// Shards as objects `<prefix>/<key>.<extension>` in one bucket.
pub struct ObjectShardStore {
    io: Arc<dyn ObjectIO>,
    location: ObjectUrl,
    url: String,
    extension: String,
}

impl ObjectShardStore {
    /// # Errors
    /// Fails when `url` is not `scheme://bucket[/prefix]`.
    pub fn new(io: Arc<dyn ObjectIO>, url: &str, extension: &str) -> Result<Self> {
        Ok(Self {
            io,
            location: parse_object_url(url)?,
            url: url.to_string(),
            extension: extension.to_string(),
        })
    }

    fn object_key(&self, key: &str) -> String {
        self.location.key(&format!("{key}.{}", self.extension))
    }
}

impl ShardStore for ObjectShardStore {
    fn url(&self) -> &str {
        &self.url
    }

    fn set(&self, key: &str, records: &[Record]) -> Result<()> {
        let object_key = self.object_key(key);
        let payload = encode_for_path(encode_jsonl(records)?, &object_key)?;
        self.io
            .put_object(&self.location.bucket, &object_key, &payload)
            .with_context(|| format!("upload {}/{object_key}", self.location.bucket))
    }

    fn reader(&self, key: &str) -> Result<DynRead> {
        let object_key = self.object_key(key);
        let bytes = self
            .io
            .get_object(&self.location.bucket, &object_key)
            .with_context(|| format!("download {}/{object_key}", self.location.bucket))?;
        auto_detect_reader(Cursor::new(bytes), &object_key)
    }

    fn keys(&self) -> Result<Vec<String>> {
        let list_prefix = self.location.key("");
        let suffix = format!(".{}", self.extension);
        let mut keys: Vec<String> = self
            .io
            .list_objects(&self.location.bucket, Some(&list_prefix))?
            .into_iter()
            .filter_map(|meta| {
                let name = meta.key.strip_prefix(&list_prefix)?;
                (!name.contains('/'))
                    .then(|| name.strip_suffix(&suffix).map(str::to_string))
                    .flatten()
            })
            .collect();
        keys.sort();
        Ok(keys)
    }
}
