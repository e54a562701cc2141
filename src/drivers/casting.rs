//! Kaggle "casting product image data for quality inspection".
//!
//! Layout: `<url>/<split>/ok_front/*` (label 1) and `<url>/<split>/def_front/*`
//! (label 0).

use super::{DEFAULT_SEED, list_files, load_file_field};
use crate::driver::{Driver, IterKwargs, Kwargs};
use crate::hooks::Hook;
use crate::record::{Record, record_from};
use crate::stream::{RecordStream, StreamHook};
use anyhow::Result;
use serde_json::Value;
use std::path::{Path, PathBuf};

pub const NAME: &str = "raw_kaggle_casting_quality";

/// Constructor: `url` (required).
///
/// `get_iter`: `split` (`train`/`test`, required), `parse` (default true),
/// `shuffle_size`/`shuffle_initial` (default 1 000 000), `seed`. Stream hooks
/// run before loading.
pub struct RawKaggleCastingQuality {
    url: PathBuf,
}

impl RawKaggleCastingQuality {
    /// # Errors
    /// Missing `url`.
    pub fn from_kwargs(kwargs: &IterKwargs) -> Result<Self> {
        Ok(Self {
            url: PathBuf::from(Kwargs::new(kwargs, NAME).required_str("url")?),
        })
    }
}

/// Load the image named by `url` into `image`.
///
/// # Errors
/// Missing `url` field or unreadable file.
pub fn load_sample(record: Record) -> Result<Record> {
    load_file_field(record, "url", "image")
}

#[must_use]
pub fn load_sample_hook() -> Hook {
    Hook::try_map("raw_kaggle_casting_quality::load_sample", load_sample)
}

fn labelled(dir: &Path, label: u8) -> Result<Vec<Record>> {
    Ok(list_files(dir)?
        .into_iter()
        .map(|p| {
            record_from([
                ("url", Value::from(p.to_string_lossy().into_owned())),
                ("label", Value::from(label)),
            ])
        })
        .collect())
}

impl Driver for RawKaggleCastingQuality {
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
        let split = k.split(&["train", "test"], "")?;
        let parse = k.bool_or("parse", true)?;
        let size = k.usize_or("shuffle_size", 1_000_000)?;
        let initial = k.usize_or("shuffle_initial", 1_000_000)?;
        let seed = k.u64_or("seed", DEFAULT_SEED)?;

        let root = self.url.join(split);
        let mut samples = labelled(&root.join("ok_front"), 1)?;
        samples.extend(labelled(&root.join("def_front"), 0)?);
        let stream = RecordStream::from_records(samples)
            .shuffle(size, initial, seed)
            .through(hooks);
        Ok(if parse { stream.try_map(load_sample) } else { stream })
    }
}
