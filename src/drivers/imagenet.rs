//! ImageNet (ILSVRC) in its raw directory layout: `<url>/train/<class_id>/*`,
//! `<url>/val/*` and `<url>/test/*`.
//!
//! Labels come from optional metadata files:
//! - class mapping, one `<class_id> <class_index> <class_name>` per line, with
//!   1-based indices;
//! - bounding boxes (`LOC_*_solution.csv`): a header line, then
//!   `<file stem>,<class_id> x0 y0 x1 y1 [<class_id> x0 y0 x1 y1 ...]`;
//! - validation ground truth, one 1-based class index per validation image;
//! - validation blacklist, one 1-based image index per line.
//!
//! Class indices and image indices are 0-based in the emitted records.

use super::{DEFAULT_SEED, list_files_nested, load_file_field};
use crate::driver::{Driver, IterKwargs, Kwargs};
use crate::io::compression::auto_detect_reader;
use crate::record::{Record, record_from, str_field};
use crate::stream::{RecordStream, StreamHook};
use anyhow::{Context, Result, anyhow, bail};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const NAME: &str = "raw_imagenet";

/// `class_id` -> (0-based class index, class name).
type ClassMap = HashMap<String, (i64, String)>;

/// File stem -> bounding boxes `{class_id, loc}`.
type LocMap = HashMap<String, Vec<(String, [i64; 4])>>;

/// Constructor: `url` (required) and the optional metadata files
/// `cls_mapping_url`, `loc_train_mapping_url`, `loc_val_mapping_url`,
/// `cls_val_mapping_url`, `val_blacklist_url`.
///
/// `get_iter`: `split` (`train`/`val`/`test`, required), `parse` (default
/// true), `shuffle` (default true), `buffer_size` (default 100 000), `seed`.
/// Labels are attached only when the class mapping is configured; stream
/// hooks run after labelling and before images are loaded into `image`.
pub struct RawImageNet {
    url: PathBuf,
    cls_mapping: Option<PathBuf>,
    loc_train_mapping: Option<PathBuf>,
    loc_val_mapping: Option<PathBuf>,
    cls_val_mapping: Option<PathBuf>,
    val_blacklist: Option<PathBuf>,
}

impl RawImageNet {
    /// # Errors
    /// Missing `url` or non-string paths.
    pub fn from_kwargs(kwargs: &IterKwargs) -> Result<Self> {
        let k = Kwargs::new(kwargs, NAME);
        let path = |key: &str| Ok::<_, anyhow::Error>(k.opt_str(key)?.map(PathBuf::from));
        Ok(Self {
            url: PathBuf::from(k.required_str("url")?),
            cls_mapping: path("cls_mapping_url")?,
            loc_train_mapping: path("loc_train_mapping_url")?,
            loc_val_mapping: path("loc_val_mapping_url")?,
            cls_val_mapping: path("cls_val_mapping_url")?,
            val_blacklist: path("val_blacklist_url")?,
        })
    }
}

fn read_text(path: &Path) -> Result<String> {
    let f = std::fs::File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut text = String::new();
    auto_detect_reader(f, path)?
        .read_to_string(&mut text)
        .with_context(|| format!("read {}", path.display()))?;
    Ok(text)
}

/// Non-blank lines with their 1-based line numbers.
fn numbered_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty())
}

fn parse_index(token: &str, path: &Path, line: usize) -> Result<i64> {
    token
        .parse::<i64>()
        .map(|n| n - 1)
        .with_context(|| format!("{}:{line}: `{token}` is not an index", path.display()))
}

fn class_map(path: &Path) -> Result<ClassMap> {
    let text = read_text(path)?;
    let mut map = ClassMap::new();
    for (line, row) in numbered_lines(&text) {
        let fields: Vec<&str> = row.split_whitespace().collect();
        let [class_id, index, name] = fields[..] else {
            bail!("{}:{line}: expected `<class_id> <index> <name>`", path.display());
        };
        map.insert(class_id.to_string(), (parse_index(index, path, line)?, name.to_string()));
    }
    Ok(map)
}

fn loc_map(path: &Path) -> Result<LocMap> {
    let text = read_text(path)?;
    let mut map = LocMap::new();
    for (line, row) in numbered_lines(&text).skip(1) {
        let (stem, raw) = row
            .split_once(',')
            .ok_or_else(|| anyhow!("{}:{line}: expected `<file>,<boxes>`", path.display()))?;
        let tokens: Vec<&str> = raw.split_whitespace().collect();
        if tokens.len() % 5 != 0 {
            bail!("{}:{line}: boxes must be `<class_id> x0 y0 x1 y1`", path.display());
        }
        let mut boxes = Vec::with_capacity(tokens.len() / 5);
        for chunk in tokens.chunks(5) {
            let mut loc = [0i64; 4];
            for (slot, token) in loc.iter_mut().zip(&chunk[1..]) {
                *slot = token.parse().with_context(|| {
                    format!("{}:{line}: bad coordinate `{token}`", path.display())
                })?;
            }
            boxes.push((chunk[0].to_string(), loc));
        }
        map.insert(stem.to_string(), boxes);
    }
    Ok(map)
}

fn val_labels(path: &Path) -> Result<Vec<i64>> {
    let text = read_text(path)?;
    numbered_lines(&text)
        .map(|(line, row)| parse_index(row, path, line))
        .collect()
}

fn val_blacklist(path: &Path) -> Result<HashSet<i64>> {
    let text = read_text(path)?;
    numbered_lines(&text)
        .map(|(line, row)| parse_index(row, path, line))
        .collect()
}

fn file_stem(record: &Record) -> Result<String> {
    let url = str_field(record, "url")?;
    Path::new(url)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("{url} has no file name"))
}

/// 0-based index of a validation image, from the number after the last `_`
/// of its file name (`ILSVRC2012_val_00000001.JPEG` -> 0).
fn val_index(record: &Record) -> Result<i64> {
    let stem = file_stem(record)?;
    let digits = stem.rsplit('_').next().unwrap_or(&stem);
    digits
        .parse::<i64>()
        .map(|n| n - 1)
        .with_context(|| format!("validation image `{stem}` has no numeric index"))
}

fn lookup<'m>(classes: &'m ClassMap, class_id: &str) -> Result<&'m (i64, String)> {
    classes
        .get(class_id)
        .ok_or_else(|| anyhow!("class `{class_id}` is not in the class mapping"))
}

fn label_train(mut record: Record, classes: &ClassMap) -> Result<Record> {
    let url = str_field(&record, "url")?;
    let class_id = Path::new(url)
        .parent()
        .and_then(Path::file_name)
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("{url} is not inside a class folder"))?;
    let (label, name) = lookup(classes, &class_id)?;
    record.insert("classification_label".into(), json!(label));
    record.insert("classification_label_name".into(), json!(name));
    record.insert("class_id".into(), Value::from(class_id));
    Ok(record)
}

fn label_val(
    mut record: Record,
    by_index: &HashMap<i64, (String, String)>,
    labels: &[i64],
) -> Result<Record> {
    let index = val_index(&record)?;
    let label = usize::try_from(index)
        .ok()
        .and_then(|i| labels.get(i))
        .copied()
        .ok_or_else(|| anyhow!("no ground truth for validation image #{index}"))?;
    let (class_id, name) = by_index
        .get(&label)
        .ok_or_else(|| anyhow!("class index {label} is not in the class mapping"))?;
    record.insert("class_id".into(), json!(class_id));
    record.insert("classification_label_name".into(), json!(name));
    record.insert("classification_label".into(), json!(label));
    Ok(record)
}

fn attach_boxes(mut record: Record, classes: &ClassMap, boxes: &LocMap) -> Result<Record> {
    let stem = file_stem(&record)?;
    let mut out = Vec::new();
    for (class_id, loc) in boxes.get(&stem).map(Vec::as_slice).unwrap_or_default() {
        let (label, name) = lookup(classes, class_id)?;
        out.push(json!({
            "class_id": class_id,
            "loc": loc,
            "classification_label": label,
            "classification_label_name": name,
        }));
    }
    record.insert("bboxes".into(), Value::Array(out));
    Ok(record)
}

impl RawImageNet {
    fn label(&self, stream: RecordStream, split: &str) -> Result<RecordStream> {
        let Some(cls_path) = self.cls_mapping.as_deref() else {
            return Ok(stream);
        };
        if split == "test" {
            return Ok(stream);
        }
        let classes = Arc::new(class_map(cls_path)?);
        let mut stream = stream;

        if split == "train" {
            let c = Arc::clone(&classes);
            stream = stream.try_map(move |r| label_train(r, &c));
            if let Some(path) = &self.loc_train_mapping {
                let (c, boxes) = (Arc::clone(&classes), loc_map(path)?);
                stream = stream.try_map(move |r| attach_boxes(r, &c, &boxes));
            }
            return Ok(stream);
        }

        if let Some(path) = &self.val_blacklist {
            let blacklist = val_blacklist(path)?;
            stream = stream.flat_map(move |r| match val_index(&r) {
                Ok(i) if blacklist.contains(&i) => RecordStream::empty(),
                Ok(_) => RecordStream::from_records([r]),
                Err(e) => RecordStream::new(std::iter::once(Err(e))),
            });
        }
        if let Some(path) = &self.cls_val_mapping {
            let labels = val_labels(path)?;
            let by_index: HashMap<i64, (String, String)> = classes
                .iter()
                .map(|(id, (index, name))| (*index, (id.clone(), name.clone())))
                .collect();
            stream = stream.try_map(move |r| label_val(r, &by_index, &labels));
        }
        if let Some(path) = &self.loc_val_mapping {
            let (c, boxes) = (Arc::clone(&classes), loc_map(path)?);
            stream = stream.try_map(move |r| attach_boxes(r, &c, &boxes));
        }
        Ok(stream)
    }
}

impl Driver for RawImageNet {
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
        let split = k.split(&["train", "val", "test"], "")?;
        let parse = k.bool_or("parse", true)?;
        let shuffle = k.bool_or("shuffle", true)?;
        let buffer_size = k.usize_or("buffer_size", 100_000)?;
        let seed = k.u64_or("seed", DEFAULT_SEED)?;

        let samples: Vec<Record> = list_files_nested(&self.url.join(split))?
            .into_iter()
            .map(|p| record_from([("url", Value::from(p.to_string_lossy().into_owned()))]))
            .collect();
        let mut stream = RecordStream::from_records(samples);
        if shuffle {
            stream = stream.shuffle(buffer_size, buffer_size, seed);
        }
        let stream = self.label(stream, split)?.through(hooks);
        Ok(if parse {
            stream.try_map(|r| load_file_field(r, "url", "image"))
        } else {
            stream
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        tmp: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let root = tmp.path().join("source");
            for (dir, files) in [
                ("train/n001", vec!["a.JPEG", "b.JPEG"]),
                ("train/n002", vec!["c.JPEG"]),
                (
                    "val",
                    vec![
                        "ILSVRC2012_val_00000001.JPEG",
                        "ILSVRC2012_val_00000002.JPEG",
                        "ILSVRC2012_val_00000003.JPEG",
                    ],
                ),
                ("test", vec!["ILSVRC2012_test_00000001.JPEG"]),
            ] {
                std::fs::create_dir_all(root.join(dir)).unwrap();
                for f in files {
                    std::fs::write(root.join(dir).join(f), f.as_bytes()).unwrap();
                }
            }
            let meta = tmp.path().join("meta");
            std::fs::create_dir(&meta).unwrap();
            std::fs::write(meta.join("map_clsloc.txt"), "n001 1 tench\nn002 2 goldfish\n").unwrap();
            std::fs::write(
                meta.join("LOC_train_solution.csv"),
                "ImageId,PredictionString\na,n001 1 2 3 4 n002 5 6 7 8\n",
            )
            .unwrap();
            std::fs::write(
                meta.join("LOC_val_solution.csv"),
                "ImageId,PredictionString\nILSVRC2012_val_00000003,n002 10 20 30 40\n",
            )
            .unwrap();
            std::fs::write(meta.join("val_ground_truth.txt"), "2\n1\n2\n").unwrap();
            std::fs::write(meta.join("val_blacklist.txt"), "2\n").unwrap();
            Self { tmp }
        }

        fn driver(&self, with_meta: bool) -> RawImageNet {
            let meta = self.tmp.path().join("meta");
            let mut kwargs = json!({"url": self.tmp.path().join("source")});
            if with_meta {
                kwargs["cls_mapping_url"] = json!(meta.join("map_clsloc.txt"));
                kwargs["loc_train_mapping_url"] = json!(meta.join("LOC_train_solution.csv"));
                kwargs["loc_val_mapping_url"] = json!(meta.join("LOC_val_solution.csv"));
                kwargs["cls_val_mapping_url"] = json!(meta.join("val_ground_truth.txt"));
                kwargs["val_blacklist_url"] = json!(meta.join("val_blacklist.txt"));
            }
            RawImageNet::from_kwargs(kwargs.as_object().unwrap()).unwrap()
        }
    }

    fn iter(driver: &RawImageNet, split: &str) -> Vec<Record> {
        let kwargs = json!({"split": split, "parse": false, "shuffle": false});
        let mut rows = driver.get_iter(kwargs.as_object().unwrap()).unwrap().collect().unwrap();
        rows.sort_by(|a, b| a["url"].as_str().cmp(&b["url"].as_str()));
        rows
    }

    #[test]
    fn train_labels_come_from_class_folder() {
        let fx = Fixture::new();
        let rows = iter(&fx.driver(true), "train");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["class_id"], json!("n001"));
        assert_eq!(rows[0]["classification_label"], json!(0));
        assert_eq!(rows[2]["classification_label_name"], json!("goldfish"));
        let boxes = rows[0]["bboxes"].as_array().unwrap();
        assert_eq!(boxes.len(), 2);
        assert_eq!(boxes[1]["loc"], json!([5, 6, 7, 8]));
        assert_eq!(boxes[1]["classification_label"], json!(1));
        assert_eq!(rows[1]["bboxes"], json!([]));
    }

    #[test]
    fn val_uses_ground_truth_and_blacklist() {
        let fx = Fixture::new();
        let rows = iter(&fx.driver(true), "val");
        let stems: Vec<_> = rows.iter().map(|r| file_stem(r).unwrap()).collect();
        assert_eq!(stems, vec!["ILSVRC2012_val_00000001", "ILSVRC2012_val_00000003"]);
        assert_eq!(rows[0]["classification_label"], json!(1));
        assert_eq!(rows[0]["class_id"], json!("n002"));
        assert_eq!(rows[1]["bboxes"][0]["loc"], json!([10, 20, 30, 40]));
    }

    #[test]
    fn without_metadata_only_urls_are_emitted() {
        let fx = Fixture::new();
        let rows = iter(&fx.driver(false), "val");
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.keys().map(String::as_str).eq(["url"])));
        assert_eq!(iter(&fx.driver(true), "test").len(), 1);
    }

    #[test]
    fn hooks_run_before_images_load() {
        let fx = Fixture::new();
        let only_goldfish = crate::stream::stream_hook(|s: RecordStream| {
            s.filter(|r| r["class_id"] == "n002")
        });
        let rows = fx
            .driver(true)
            .get_iter_with_hooks(json!({"split": "train"}).as_object().unwrap(), &[only_goldfish])
            .unwrap()
            .collect()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["image"], json!(b"c.JPEG".to_vec()));
    }

    #[test]
    fn malformed_class_mapping_is_reported() {
        let fx = Fixture::new();
        std::fs::write(fx.tmp.path().join("meta/map_clsloc.txt"), "n001 one tench\n").unwrap();
        let kwargs = json!({"split": "train", "parse": false});
        let err = fx.driver(true).get_iter(kwargs.as_object().unwrap()).err().unwrap();
        assert!(format!("{err:#}").contains("map_clsloc.txt:1"), "{err:#}");
    }
}
