//! Berkeley DeepDrive BDD100K semantic segmentation: images in
//! `<url>/images/10k/<split>`, masks with the same stem and a `.png` extension
//! in `<url>/labels/sem_seg/masks/<split>`. The `test` split has no masks.

use super::{DEFAULT_SEED, list_files, load_file_field};
use crate::driver::{Driver, IterKwargs, Kwargs};
use crate::record::{Record, record_from};
use crate::stream::{RecordStream, StreamHook};
use anyhow::Result;
use serde_json::Value;
use std::path::PathBuf;

pub const NAME: &str = "bdd100k";

/// Label ids 0..=18; 255 marks unknown pixels that are not evaluated.
pub const CLASSES: [&str; 19] = [
    "road",
    "sidewalk",
    "building",
    "wall",
    "fence",
    "pole",
    "traffic light",
    "traffic sign",
    "vegetation",
    "terrain",
    "sky",
    "person",
    "rider",
    "car",
    "truck",
    "bus",
    "train",
    "motorcycle",
    "bicycle",
];

pub const UNKNOWN_LABEL: u8 = 255;

/// Class name of a mask pixel value; `None` for [`UNKNOWN_LABEL`] and ids past
/// the table.
#[must_use]
pub fn class_name(id: u8) -> Option<&'static str> {
    CLASSES.get(usize::from(id)).copied()
}

/// Constructor: `url` (required).
///
/// `get_iter`: `split` (`train`/`val`/`test`, required), `parse_image` and
/// `parse_label` (default true), `shuffle_size`/`shuffle_initial` (default
/// 800), `seed`. Records are `{image_url, label_url, split}` (`label_url` only
/// outside `test`). Stream hooks run before loading.
pub struct Bdd100k {
    url: PathBuf,
}

impl Bdd100k {
    /// # Errors
    /// Missing `url`.
    pub fn from_kwargs(kwargs: &IterKwargs) -> Result<Self> {
        Ok(Self {
            url: PathBuf::from(Kwargs::new(kwargs, NAME).required_str("url")?),
        })
    }
}

/// Load `image` and, when the record has a `label_url`, `label`.
///
/// # Errors
/// Unreadable files.
pub fn load_sample(record: Record, parse_image: bool, parse_label: bool) -> Result<Record> {
    let record = if parse_image {
        load_file_field(record, "image_url", "image")?
    } else {
        record
    };
    if parse_label && record.contains_key("label_url") {
        load_file_field(record, "label_url", "label")
    } else {
        Ok(record)
    }
}

impl Driver for Bdd100k {
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

        let images = self.url.join("images/10k").join(&split);
        let labels = (split != "test").then(|| self.url.join("labels/sem_seg/masks").join(&split));
        let samples: Vec<Record> = list_files(&images)?
            .into_iter()
            .map(|image| {
                let image_url = Value::from(image.to_string_lossy().into_owned());
                let mut r = record_from([("image_url", image_url)]);
                if let (Some(dir), Some(stem)) = (&labels, image.file_stem()) {
                    let label = dir.join(stem).with_extension("png");
                    r.insert("label_url".into(), Value::from(label.to_string_lossy().into_owned()));
                }
                r.insert("split".into(), Value::from(split.clone()));
                r
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fixture() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        for (dir, names) in [
            ("images/10k/val", ["a.jpg", "b.jpg"]),
            ("labels/sem_seg/masks/val", ["a.png", "b.png"]),
            ("images/10k/test", ["c.jpg", "d.jpg"]),
        ] {
            std::fs::create_dir_all(tmp.path().join(dir)).unwrap();
            for name in names {
                std::fs::write(tmp.path().join(dir).join(name), name.as_bytes()).unwrap();
            }
        }
        tmp
    }

    fn rows(tmp: &tempfile::TempDir, kwargs: Value) -> Vec<Record> {
        Bdd100k::from_kwargs(json!({"url": tmp.path()}).as_object().unwrap())
            .unwrap()
            .get_iter(kwargs.as_object().unwrap())
            .unwrap()
            .collect()
            .unwrap()
    }

    #[test]
    fn val_pairs_images_with_png_masks() {
        let tmp = fixture();
        let rows = rows(&tmp, json!({"split": "val"}));
        assert_eq!(rows.len(), 2);
        for r in &rows {
            let image = r["image_url"].as_str().unwrap();
            let stem = std::path::Path::new(image).file_stem().unwrap().to_string_lossy();
            assert_eq!(r["label"], json!(format!("{stem}.png").into_bytes()));
            assert_eq!(r["image"], json!(format!("{stem}.jpg").into_bytes()));
        }
    }

    #[test]
    fn test_split_has_no_labels() {
        let tmp = fixture();
        let rows = rows(&tmp, json!({"split": "test", "parse_image": false}));
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.get("label_url").is_none() && r.get("label").is_none()));
        assert_eq!(class_name(18), Some("bicycle"));
        assert_eq!(class_name(UNKNOWN_LABEL), None);
    }
}
