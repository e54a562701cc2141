//! 2018 Data Science Bowl nuclei segmentation, in the competition layout: one
//! directory per sample under `<url>/<split>`, holding `images/<id>.png` and,
//! for `stage1_train`, one instance mask per file in `masks/`.

use super::{DEFAULT_SEED, list_dirs, list_files};
use crate::driver::{Driver, IterKwargs, Kwargs};
use crate::hooks::Hook;
use crate::record::{Record, record_from, set_bytes, str_field};
use crate::stream::{RecordStream, StreamHook};
use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use std::path::{Path, PathBuf};

pub const NAME: &str = "ds_bowl_18";

pub const SPLITS: [&str; 3] = ["stage1_train", "stage1_test", "stage2_test_final"];

/// Constructor: `url` (required).
///
/// `get_iter`: `split` (one of [`SPLITS`], required), `parse_image` and
/// `parse_mask` (default true), `shuffle_size`/`shuffle_initial` (default 800),
/// `seed`. Records are `{sample_url, split}`; loading adds `image` bytes and,
/// for `stage1_train`, `masks` as a list of byte arrays. Stream hooks run
/// before loading.
pub struct DataScienceBowl2018 {
    url: PathBuf,
}

impl DataScienceBowl2018 {
    /// # Errors
    /// Missing `url`.
    pub fn from_kwargs(kwargs: &IterKwargs) -> Result<Self> {
        Ok(Self {
            url: PathBuf::from(Kwargs::new(kwargs, NAME).required_str("url")?),
        })
    }
}

/// Load the sample's image and, for training samples, its instance masks.
///
/// # Errors
/// Missing fields or unreadable files.
pub fn load_sample(mut record: Record, parse_image: bool, parse_mask: bool) -> Result<Record> {
    let sample = PathBuf::from(str_field(&record, "sample_url")?);
    if parse_image {
        let id = sample
            .file_name()
            .ok_or_else(|| anyhow!("{} has no sample id", sample.display()))?;
        let image = sample.join("images").join(Path::new(id).with_extension("png"));
        let bytes = std::fs::read(&image).with_context(|| format!("read {}", image.display()))?;
        set_bytes(&mut record, "image", bytes);
    }
    if parse_mask && str_field(&record, "split")? == "stage1_train" {
        let mut masks = Vec::new();
        for path in list_files(&sample.join("masks"))? {
            let bytes = std::fs::read(&path).with_context(|| format!("read {}", path.display()))?;
            masks.push(Value::Array(bytes.into_iter().map(Value::from).collect()));
        }
        record.insert("masks".into(), Value::Array(masks));
    }
    Ok(record)
}

/// [`load_sample`] with both parts enabled, as a pre-sharding hook.
#[must_use]
pub fn load_sample_hook() -> Hook {
    Hook::try_map("ds_bowl_18::load_sample", |r| load_sample(r, true, true))
}

impl Driver for DataScienceBowl2018 {
    fn name(&self) -> &'static str {
        NAME
    }

    fn get_iter(&self, kwargs: &IterKwargs) -> Result<RecordStream> {
        self.get_iter_with_hooks(kwargs, &[])
    }

    fn get_iter_with_hooks(
        &self,
        kwargs: &IterKwargs,
        hooks: &[StreamHook],
    ) -> Result<RecordStream> {
        let k = Kwargs::new(kwargs, NAME);
        let split = k.split(&SPLITS, "")?.to_string();
        let parse_image = k.bool_or("parse_image", true)?;
        let parse_mask = k.bool_or("parse_mask", true)?;
        let size = k.usize_or("shuffle_size", 800)?;
        let initial = k.usize_or("shuffle_initial", 800)?;
        let seed = k.u64_or("seed", DEFAULT_SEED)?;

        let samples: Vec<Record> = list_dirs(&self.url.join(&split))?
            .into_iter()
            .map(|dir| {
                record_from([
                    ("sample_url", Value::from(dir.to_string_lossy().into_owned())),
                    ("split", Value::from(split.clone())),
                ])
            })
            .collect();
        let stream = RecordStream::from_records(samples)
            .shuffle(size, initial, seed)
            .through(hooks);
        if !parse_image && !parse_mask {
            return Ok(stream);
        }
        Ok(stream.try_map(move |r| load_sample(r, parse_image, parse_mask)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample(root: &Path, split: &str, id: &str, masks: usize) {
        let dir = root.join(split).join(id);
        std::fs::create_dir_all(dir.join("images")).unwrap();
        std::fs::write(dir.join("images").join(format!("{id}.png")), id.as_bytes()).unwrap();
        if masks > 0 {
            std::fs::create_dir(dir.join("masks")).unwrap();
            for m in 0..masks {
                std::fs::write(dir.join("masks").join(format!("m{m}.png")), [m as u8]).unwrap();
            }
        }
    }

    fn driver(root: &Path) -> DataScienceBowl2018 {
        DataScienceBowl2018::from_kwargs(json!({"url": root}).as_object().unwrap()).unwrap()
    }

    #[test]
    fn train_samples_carry_image_and_masks() {
        let tmp = tempfile::tempdir().unwrap();
        sample(tmp.path(), "stage1_train", "abc", 2);
        sample(tmp.path(), "stage1_train", "def", 1);
        let rows = driver(tmp.path())
            .get_iter(json!({"split": "stage1_train"}).as_object().unwrap())
            .unwrap()
            .collect()
            .unwrap();
        assert_eq!(rows.len(), 2);
        let abc = rows.iter().find(|r| r["sample_url"].as_str().unwrap().ends_with("abc")).unwrap();
        assert_eq!(abc["image"], json!(b"abc".to_vec()));
        assert_eq!(abc["masks"], json!([[0], [1]]));
    }

    #[test]
    fn test_splits_have_no_masks() {
        let tmp = tempfile::tempdir().unwrap();
        sample(tmp.path(), "stage1_test", "xyz", 0);
        let rows = driver(tmp.path())
            .get_iter(json!({"split": "stage1_test"}).as_object().unwrap())
            .unwrap()
            .collect()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].get("masks").is_none());
        assert_eq!(rows[0]["split"], json!("stage1_test"));
        let unknown = json!({"split": "train"});
        assert!(driver(tmp.path()).get_iter(unknown.as_object().unwrap()).is_err());
    }

    #[test]
    fn hooks_run_on_sample_listing() {
        let tmp = tempfile::tempdir().unwrap();
        sample(tmp.path(), "stage1_train", "abc", 1);
        std::fs::create_dir_all(tmp.path().join("stage1_train/broken")).unwrap();
        let skip_broken = crate::stream::stream_hook(|s: RecordStream| {
            s.filter(|r| !r["sample_url"].as_str().unwrap_or("").ends_with("broken"))
        });
        let d = driver(tmp.path());
        let kwargs = json!({"split": "stage1_train"});
        assert!(d.get_iter(kwargs.as_object().unwrap()).unwrap().collect().is_err());
        let rows = d
            .get_iter_with_hooks(kwargs.as_object().unwrap(), &[skip_broken])
            .unwrap()
            .collect()
            .unwrap();
        assert_eq!(rows.len(), 1);
    }
}
