//! Pluggable compression codecs for shard payloads and driver inputs.
//!
//! Codecs are picked by file extension (`.gz`, `.zst`, `.xz`) and, for readers,
//! by magic bytes when the extension is unknown. Shard payloads are built in
//! memory and encoded in one pass with [`encode_for_path`], which works the same
//! for local files and object stores.
//!
//! Built-in codecs, each behind a feature flag:
//! - **gzip** (`compression-gzip`, `flate2`)
//! - **zstd** (`compression-zstd`, `zstd`)
//! - **xz** (`compression-xz`, `xz2`)

use anyhow::{Context, Result};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::sync::Arc;

/// Readers handed to lazy record streams must be sendable across workers.
pub type DynRead = Box<dyn Read + Send>;

fn codecs() -> Vec<Arc<dyn CompressionCodec>> {
    vec![
        #[cfg(feature = "compression-gzip")]
        Arc::new(GzipCodec),
        #[cfg(feature = "compression-zstd")]
        Arc::new(ZstdCodec),
        #[cfg(feature = "compression-xz")]
        Arc::new(XzCodec),
    ]
}

/// A compression format.
pub trait CompressionCodec: Send + Sync {
    fn name(&self) -> &str;

    /// Lowercase extensions including the leading dot, e.g. `&[".gz"]`.
    fn extensions(&self) -> &[&str];

    fn magic_bytes(&self) -> Option<&[u8]>;

    /// Wrap `reader` with a streaming decoder.
    ///
    /// # Errors
    /// Fails when the decoder cannot be initialized.
    fn wrap_reader(&self, reader: DynRead) -> std::io::Result<DynRead>;

    /// Encode a complete payload.
    ///
    /// # Errors
    /// Fails when the encoder reports an error.
    fn encode(&self, data: &[u8]) -> std::io::Result<Vec<u8>>;
}

/// Codec registered for the extension of `path`, if any.
#[must_use]
pub fn codec_for_path(path: impl AsRef<Path>) -> Option<Arc<dyn CompressionCodec>> {
    let lowered = path.as_ref().to_string_lossy().to_lowercase();
    codecs()
        .into_iter()
        .find(|codec| codec.extensions().iter().any(|ext| lowered.ends_with(ext)))
}

fn codec_for_magic<R: BufRead>(reader: &mut R) -> Option<Arc<dyn CompressionCodec>> {
    let head = reader.fill_buf().ok()?;
    if head.is_empty() {
        return None;
    }
    codecs()
        .into_iter()
        .find(|codec| codec.magic_bytes().is_some_and(|magic| head.starts_with(magic)))
}

/// Wrap `reader` with the decoder matching `path_hint`, sniffing magic bytes
/// when the extension is not recognized.
///
/// # Errors
/// Fails when the selected decoder cannot be initialized.
pub fn auto_detect_reader<R: Read + Send + 'static>(
    reader: R,
    path_hint: impl AsRef<Path>,
) -> Result<DynRead> {
    if let Some(codec) = codec_for_path(&path_hint) {
        return codec
            .wrap_reader(Box::new(reader))
            .with_context(|| format!("wrap reader with {} codec", codec.name()));
    }
    let mut buffered = BufReader::new(reader);
    if let Some(codec) = codec_for_magic(&mut buffered) {
        return codec
            .wrap_reader(Box::new(buffered))
            .with_context(|| format!("wrap reader with {} codec", codec.name()));
    }
    Ok(Box::new(buffered))
}

/// Encode `data` with the codec matching `path_hint`; unknown extensions are
/// stored as-is.
///
/// # Errors
/// Fails when the encoder reports an error.
pub fn encode_for_path(data: Vec<u8>, path_hint: impl AsRef<Path>) -> Result<Vec<u8>> {
    match codec_for_path(&path_hint) {
        Some(codec) => codec
            .encode(&data)
            .with_context(|| format!("encode payload with {} codec", codec.name())),
        None => Ok(data),
    }
}

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn wrap_reader(&self, reader: DynRead) -> std::io::Result<DynRead> {
        Ok(Box::new(flate2::read::MultiGzDecoder::new(reader)))
    }

    fn encode(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        use std::io::Write;
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(data)?;
        enc.finish()
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn wrap_reader(&self, reader: DynRead) -> std::io::Result<DynRead> {
        Ok(Box::new(zstd::stream::read::Decoder::new(reader)?))
    }

    fn encode(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        zstd::stream::encode_all(data, 3)
    }
}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
impl CompressionCodec for XzCodec {
    fn name(&self) -> &str {
        "xz"
    }

    fn extensions(&self) -> &[&str] {
        &[".xz"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00])
    }

    fn wrap_reader(&self, reader: DynRead) -> std::io::Result<DynRead> {
        Ok(Box::new(xz2::read::XzDecoder::new(reader)))
    }

    fn encode(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        use std::io::Write;
        let mut enc = xz2::write::XzEncoder::new(Vec::new(), 6);
        enc.write_all(data)?;
        enc.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn decode(bytes: Vec<u8>, hint: &str) -> String {
        let mut out = String::new();
        auto_detect_reader(Cursor::new(bytes), hint)
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        out
    }

    #[test]
    fn unknown_extension_is_passthrough() {
        let bytes = encode_for_path(b"plain".to_vec(), "shard_0.jsonl").unwrap();
        assert_eq!(bytes, b"plain");
        assert_eq!(decode(bytes, "shard_0.jsonl"), "plain");
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn gzip_is_sniffed_without_extension() {
        let bytes = encode_for_path(b"{\"a\":1}\n".to_vec(), "x.jsonl.gz").unwrap();
        assert_eq!(&bytes[..2], &[0x1f, 0x8b]);
        assert_eq!(decode(bytes, "no-extension"), "{\"a\":1}\n");
    }

    #[cfg(feature = "compression-xz")]
    #[test]
    fn xz_payload_decodes_by_extension() {
        let bytes = encode_for_path(b"hallo\n\nwelt".to_vec(), "de.txt.xz").unwrap();
        assert_eq!(decode(bytes, "de.txt.xz"), "hallo\n\nwelt");
    }
}
