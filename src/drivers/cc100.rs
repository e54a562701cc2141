//! CC-100 monolingual web text, one compressed plain-text file per language.
//! Documents are separated by blank lines; every non-empty paragraph becomes
//! one `{text}` record.

use crate::driver::{Driver, IterKwargs, Kwargs};
use crate::io::compression::{DynRead, auto_detect_reader, codec_for_path};
use crate::record::{Record, record_from};
use crate::stream::RecordStream;
use anyhow::{Context, Result, bail};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};

pub const NAME: &str = "cc100";

/// Language codes published by CC-100.
pub const LANGUAGES: &[&str] = &[
    "af", "am", "ar", "as", "az", "be", "bg", "bn", "bn_rom", "br", "bs", "ca", "cs", "cy", "da",
    "de", "el", "en", "eo", "es", "et", "eu", "fa", "ff", "fi", "fr", "fy", "ga", "gd", "gl", "gn",
    "gu", "ha", "he", "hi", "hi_rom", "hr", "ht", "hu", "hy", "id", "ig", "is", "it", "ja", "jv",
    "ka", "kk", "km", "kn", "ko", "ku", "ky", "la", "lg", "li", "ln", "lo", "lt", "lv", "mg", "mk",
    "ml", "mn", "mr", "ms", "my", "my_zaw", "ne", "nl", "no", "ns", "om", "or", "pa", "pl", "ps",
    "pt", "qu", "rm", "ro", "ru", "sa", "si", "sc", "sd", "sk", "sl", "so", "sq", "sr", "ss", "su",
    "sv", "sw", "ta", "ta_rom", "te", "te_rom", "th", "tl", "tn", "tr", "ug", "uk", "ur", "ur_rom",
    "uz", "vi", "wo", "xh", "yi", "yo", "zu",
];

/// Constructor: `subsets` (language -> file, required), `compression`
/// (`xz` by default; `infer` picks by extension or magic bytes, `none` reads
/// the file as-is).
///
/// `get_iter`: `lang`, a language code or a list of them (default: every subset).
pub struct Cc100 {
    subsets: BTreeMap<String, String>,
    compression: String,
}

impl Cc100 {
    /// # Errors
    /// Missing `subsets`, unknown languages or an unsupported `compression`.
    pub fn from_kwargs(kwargs: &IterKwargs) -> Result<Self> {
        let k = Kwargs::new(kwargs, NAME);
        let Some(pairs) = k.str_map("subsets")? else {
            bail!("{NAME}: missing argument `subsets`");
        };
        let subsets: BTreeMap<String, String> = pairs.into_iter().collect();
        if let Some(lang) = subsets.keys().find(|l| !LANGUAGES.contains(&l.as_str())) {
            bail!("{NAME}: unknown language `{lang}`");
        }
        let compression = k.str_or("compression", "xz")?.to_string();
        if !matches!(compression.as_str(), "infer" | "none")
            && codec_for_path(format!("x.{compression}")).is_none()
        {
            bail!("{NAME}: unsupported compression `{compression}`");
        }
        Ok(Self { subsets, compression })
    }

    fn open(&self, path: &str) -> Result<DynRead> {
        let f = File::open(path).with_context(|| format!("open {path}"))?;
        match self.compression.as_str() {
            "none" => Ok(Box::new(f)),
            "infer" => auto_detect_reader(f, path),
            ext => auto_detect_reader(f, format!("{path}.{ext}")),
        }
    }
}

impl Driver for Cc100 {
    fn name(&self) -> &'static str {
        NAME
    }

    fn get_iter(&self, kwargs: &IterKwargs) -> Result<RecordStream> {
        let langs = Kwargs::new(kwargs, NAME)
            .str_list("lang")?
            .unwrap_or_else(|| self.subsets.keys().cloned().collect());
        let mut paths = Vec::with_capacity(langs.len());
        for lang in &langs {
            let Some(path) = self.subsets.get(lang) else {
                bail!("{NAME}: no subset for language `{lang}`");
            };
            paths.push(path.clone());
        }

        let mut stream = RecordStream::empty();
        for path in paths {
            let reader = self.open(&path)?;
            stream = stream.chain(RecordStream::new(Paragraphs::new(reader, path)));
        }
        Ok(stream)
    }
}

/// Blank-line separated paragraphs of a text reader.
struct Paragraphs {
    lines: Lines<BufReader<DynRead>>,
    label: String,
    done: bool,
}

impl Paragraphs {
    fn new(reader: DynRead, label: String) -> Self {
        Self {
            lines: BufReader::new(reader).lines(),
            label,
            done: false,
        }
    }
}

impl Iterator for Paragraphs {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut text = String::new();
        loop {
            match self.lines.next() {
                Some(Ok(line)) if line.is_empty() => {
                    if !text.is_empty() {
                        break;
                    }
                }
                Some(Ok(line)) => {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(&line);
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e).with_context(|| format!("read {}", self.label)));
                }
                None => {
                    self.done = true;
                    if text.is_empty() {
                        return None;
                    }
                    break;
                }
            }
        }
        Some(Ok(record_from([("text", Value::from(text))])))
    }
}
