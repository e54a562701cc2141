//! Monthly German tweet dumps: a folder of gzip files, each holding a JSON
//! array of tweet objects. Dumps are often truncated or contain broken
//! objects, so objects are cut out one by one and parsed independently.

use super::list_files;
use crate::driver::{Driver, IterKwargs, Kwargs};
use crate::io::compression::auto_detect_reader;
use crate::record::{Record, record_from, str_field};
use crate::stream::{RecordStream, StreamHook};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

pub const NAME: &str = "raw_monthly_german_tweets";

/// Constructor: `folder` (required). `get_iter` takes no arguments.
///
/// Stream hooks act on the archive listing, records `{url}` with one per dump
/// file, so they can select or reorder dumps before any is decoded.
pub struct MonthlyGermanTweets {
    folder: PathBuf,
    parse_errors: Arc<AtomicUsize>,
}

impl MonthlyGermanTweets {
    /// # Errors
    /// Missing `folder`.
    pub fn from_kwargs(kwargs: &IterKwargs) -> Result<Self> {
        Ok(Self {
            folder: PathBuf::from(Kwargs::new(kwargs, NAME).required_str("folder")?),
            parse_errors: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Objects skipped so far because they were not valid JSON objects.
    #[must_use]
    pub fn parse_error_count(&self) -> usize {
        self.parse_errors.load(Ordering::Relaxed)
    }
}

/// Top-level `{...}` spans of `text`, ignoring braces inside strings.
/// An unterminated trailing object is dropped.
fn object_spans(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut in_string = false;
    let mut escaped = false;
    for (i, b) in text.bytes().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    spans.push(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    spans
}

fn read_dump(path: &Path, errors: &AtomicUsize) -> Result<Vec<Record>> {
    let f = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut text = String::new();
    auto_detect_reader(f, path)?
        .read_to_string(&mut text)
        .with_context(|| format!("decode {}", path.display()))?;
    let mut out = Vec::new();
    for span in object_spans(&text) {
        match serde_json::from_str::<Record>(span) {
            Ok(record) => out.push(record),
            Err(e) => {
                errors.fetch_add(1, Ordering::Relaxed);
                warn!(file = %path.display(), error = %e, "skipping undecodable tweet");
            }
        }
    }
    Ok(out)
}

impl Driver for MonthlyGermanTweets {
    fn name(&self) -> &'static str {
        NAME
    }

    fn get_iter(&self, kwargs: &IterKwargs) -> Result<RecordStream> {
        self.get_iter_with_hooks(kwargs, &[])
    }

    fn get_iter_with_hooks(
        &self,
        _kwargs: &IterKwargs,
        hooks: &[StreamHook],
    ) -> Result<RecordStream> {
        let archives: Vec<Record> = list_files(&self.folder)?
            .into_iter()
            .map(|p| record_from([("url", p.to_string_lossy().into_owned().into())]))
            .collect();
        let errors = Arc::clone(&self.parse_errors);
        Ok(RecordStream::from_records(archives)
            .through(hooks)
            .flat_map(move |archive| {
                let items: Vec<Result<Record>> = match str_field(&archive, "url")
                    .and_then(|url| read_dump(Path::new(url), &errors))
                {
                    Ok(records) => records.into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(e)],
                };
                RecordStream::new(items.into_iter())
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn spans_ignore_braces_in_strings() {
        let text = r#"[{"text": "a } b", "user": {"id": 1}}, {"text": "say \"{\""}, {"trunc"#;
        let spans = object_spans(text);
        assert_eq!(spans.len(), 2);
        assert!(spans[0].ends_with("}}"));
        assert_eq!(serde_json::from_str::<Record>(spans[1]).unwrap()["text"], json!("say \"{\""));
    }

    #[test]
    fn counts_broken_objects() {
        let tmp = tempfile::tempdir().unwrap();
        let dump = r#"[{"id": 1}, {"id": }, {"id": 3}]"#;
        std::fs::write(tmp.path().join("2020-01.json"), dump).unwrap();
        let kwargs = json!({"folder": tmp.path()}).as_object().cloned().unwrap();
        let driver = MonthlyGermanTweets::from_kwargs(&kwargs).unwrap();
        let rows = driver.get_iter(&IterKwargs::new()).unwrap().collect().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(driver.parse_error_count(), 1);
    }

    #[test]
    fn key_hooks_pick_archives() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("2020-01.json"), r#"[{"id": 1}]"#).unwrap();
        std::fs::write(tmp.path().join("2020-02.json"), r#"[{"id": 2}, {"id": 3}]"#).unwrap();
        let kwargs = json!({"folder": tmp.path()}).as_object().cloned().unwrap();
        let driver = MonthlyGermanTweets::from_kwargs(&kwargs).unwrap();
        let february = crate::stream::stream_hook(|s: RecordStream| {
            s.filter(|r| r["url"].as_str().is_some_and(|u| u.ends_with("2020-02.json")))
        });
        let rows = driver
            .get_iter_with_hooks(&IterKwargs::new(), &[february])
            .unwrap()
            .collect()
            .unwrap();
        assert_eq!(rows, vec![record_from([("id", 2.into())]), record_from([("id", 3.into())])]);
    }
}
