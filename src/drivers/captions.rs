//! Conceptual Captions 12M index: a TSV of `url<TAB>caption` lines.
//! Images are not downloaded; records carry the URL only.

use super::DEFAULT_SEED;
use crate::driver::{Driver, IterKwargs, Kwargs};
use crate::io::compression::{DynRead, auto_detect_reader};
use crate::record::{Record, record_from};
use crate::stream::RecordStream;
use anyhow::{Context, Result};
use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use tracing::warn;

pub const NAME: &str = "conceptual-captions-12m";

/// Constructor: `index_url` (required).
///
/// `get_iter`: `shuffle_key_buffer` (default 1000), `seed`.
pub struct ConceptualCaptions12m {
    index_url: String,
}

impl ConceptualCaptions12m {
    /// # Errors
    /// Missing `index_url`.
    pub fn from_kwargs(kwargs: &IterKwargs) -> Result<Self> {
        Ok(Self {
            index_url: Kwargs::new(kwargs, NAME).required_str("index_url")?.to_string(),
        })
    }
}

/// Split one index line; `None` for lines without a tab or with an empty URL.
fn parse_line(line: &str) -> Option<Record> {
    let (url, caption) = line.split_once('\t')?;
    let url = url.trim();
    if url.is_empty() {
        return None;
    }
    Some(record_from([
        ("caption", Value::from(caption.trim_end_matches('\r'))),
        ("url", Value::from(url)),
    ]))
}

impl Driver for ConceptualCaptions12m {
    fn name(&self) -> &'static str {
        NAME
    }

    fn get_iter(&self, kwargs: &IterKwargs) -> Result<RecordStream> {
        let k = Kwargs::new(kwargs, NAME);
        let buffer = k.usize_or("shuffle_key_buffer", 1000)?;
        let seed = k.u64_or("seed", DEFAULT_SEED)?;
        let f = File::open(&self.index_url).with_context(|| format!("open {}", self.index_url))?;
        let reader = auto_detect_reader(f, &self.index_url)?;
        let index = IndexLines {
            lines: BufReader::new(reader).lines(),
            label: self.index_url.clone(),
            line_no: 0,
        };
        Ok(RecordStream::new(index).shuffle(buffer, buffer, seed))
    }
}

struct IndexLines {
    lines: Lines<BufReader<DynRead>>,
    label: String,
    line_no: usize,
}

impl Iterator for IndexLines {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.line_no += 1;
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    let at = format!("read {} line {}", self.label, self.line_no);
                    return Some(Err(e).context(at));
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(&line) {
                Some(record) => return Some(Ok(record)),
                None => warn!(index = %self.label, line = self.line_no, "skipping malformed line"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_url_and_caption() {
        let r = parse_line("https://x/1.jpg\ta <PERSON> on a bike\r").unwrap();
        assert_eq!(r["url"], json!("https://x/1.jpg"));
        assert_eq!(r["caption"], json!("a <PERSON> on a bike"));
        assert!(parse_line("no tab here").is_none());
        assert!(parse_line("\tcaption only").is_none());
    }

    #[test]
    fn skips_malformed_lines() {
        let tmp = tempfile::tempdir().unwrap();
        let index = tmp.path().join("cc12m.tsv");
        std::fs::write(&index, "u1\tc1\nbroken\n\nu2\tc2\n").unwrap();
        let kwargs = json!({"index_url": index}).as_object().cloned().unwrap();
        let driver = ConceptualCaptions12m::from_kwargs(&kwargs).unwrap();
        let mut urls: Vec<String> = Iterator::map(
            driver.get_iter(&IterKwargs::new()).unwrap(),
            |r| r.unwrap()["url"].as_str().unwrap().to_string(),
        )
        .collect();
        urls.sort();
        assert_eq!(urls, vec!["u1", "u2"]);
    }
}
