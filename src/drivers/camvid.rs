//! Cambridge-driving Labeled Video Database (CamVid), in the directory layout
//! of the SegNet tutorial: images in `<url>/<split>`, label masks with the same
//! file names in `<url>/<split>annot`.

use super::{DEFAULT_SEED, list_files, load_file_field};
use crate::driver::{Driver, IterKwargs, Kwargs};
use crate::hooks::Hook;
use crate::record::{Record, record_from};
use crate::stream::{RecordStream, StreamHook};
use anyhow::Result;
use serde_json::Value;
use std::path::PathBuf;

pub const NAME: &str = "camvid";

/// Class names by label id (0..=11).
pub const CLASSES: [&str; 12] = [
    "sky",
    "building",
    "pole",
    "road",
    "pavement",
    "tree",
    "sign_symbol",
    "fence",
    "car",
    "pedestrian",
    "bicyclist",
    "unlabelled",
];

#[must_use]
pub fn label_id(class: &str) -> Option<usize> {
    CLASSES.iter().position(|c| *c == class)
}

/// Constructor: `url` (required).
///
/// `get_iter`: `split` (`train`/`val`/`test`, required), `parse_image` and
/// `parse_label` (default true), `shuffle_size`/`shuffle_initial` (default 800),
/// `seed`. Records are `{image_url, label_url, split}` plus `image`/`label`
/// bytes when parsing is enabled. Stream hooks run before loading.
pub struct Camvid {
    url: PathBuf,
}

impl Camvid {
    /// # Errors
    /// Missing `url`.
    pub fn from_kwargs(kwargs: &IterKwargs) -> Result<Self> {
        Ok(Self {
            url: PathBuf::from(Kwargs::new(kwargs, NAME).required_str("url")?),
        })
    }
}

/// Load the image and/or label mask bytes named by the record's URLs.
///
/// # Errors
/// Missing URL fields or unreadable files.
pub fn load_sample(record: Record, parse_image: bool, parse_label: bool) -> Result<Record> {
    let record = if parse_image {
        load_file_field(record, "image_url", "image")?
    } else {
        record
    };
    if parse_label {
        load_file_field(record, "label_url", "label")
    } else {
        Ok(record)
    }
}

/// [`load_sample`] with both parts enabled, as a pre-sharding hook.
#[must_use]
pub fn load_sample_hook() -> Hook {
    Hook::try_map("camvid::load_sample", |r| load_sample(r, true, true))
}

impl Driver for Camvid {
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
        let split = k.split(&["train", "val", "test"], "")?.to_string();
        let parse_image = k.bool_or("parse_image", true)?;
        let parse_label = k.bool_or("parse_label", true)?;
        let size = k.usize_or("shuffle_size", 800)?;
        let initial = k.usize_or("shuffle_initial", 800)?;
        let seed = k.u64_or("seed", DEFAULT_SEED)?;

        let labels_dir = self.url.join(format!("{split}annot"));
        let samples: Vec<Record> = list_files(&self.url.join(&split))?
            .into_iter()
            .map(|image| {
                let label = image
                    .file_name()
                    .map_or_else(|| labels_dir.clone(), |name| labels_dir.join(name));
                record_from([
                    ("image_url", Value::from(image.to_string_lossy().into_owned())),
                    ("label_url", Value::from(label.to_string_lossy().into_owned())),
                    ("split", Value::from(split.clone())),
                ])
            })
            .collect();

        let stream = RecordStream::from_records(samples)
            .shuffle(size, initial, seed)
            .through(hooks);
        if !parse_image && !parse_label {
            return Ok(stream);
        }
        Ok(stream.try_map(move |r| load_sample(r, parse_image, parse_label)))
    }
}
