//! URL parsing for object-backed stores.

use super::traits::{CloudIOError, CloudResult, ErrorKind};

/// Parts of a `scheme://bucket/prefix` URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectUrl {
    pub scheme: String,
    pub bucket: String,
    /// Key prefix without leading or trailing `/`; may be empty.
    pub prefix: String,
}

impl ObjectUrl {
    /// Object key for `name` under the prefix.
    #[must_use]
    pub fn key(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{name}", self.prefix)
        }
    }
}

/// Scheme of `url` if it has one, e.g. `"mem"` for `mem://bucket/x`.
#[must_use]
pub fn url_scheme(url: &str) -> Option<&str> {
    url.split_once("://").map(|(scheme, _)| scheme)
}

/// # Errors
/// `InvalidInput` when the URL has no scheme or no bucket.
pub fn parse_object_url(url: &str) -> CloudResult<ObjectUrl> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| {
            CloudIOError::new(ErrorKind::InvalidInput, format!("not an object URL: {url}"))
        })?;
    let rest = rest.trim_matches('/');
    let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));
    if bucket.is_empty() {
        return Err(CloudIOError::new(
            ErrorKind::InvalidInput,
            format!("missing bucket in {url}"),
        ));
    }
    Ok(ObjectUrl {
        scheme: scheme.to_string(),
        bucket: bucket.to_string(),
        prefix: prefix.trim_matches('/').to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bucket_and_prefix() {
        let u = parse_object_url("mem://data/camvid/shards/").unwrap();
        assert_eq!(u.scheme, "mem");
        assert_eq!(u.bucket, "data");
        assert_eq!(u.key("shard_0"), "camvid/shards/shard_0");
        assert_eq!(parse_object_url("mem://data").unwrap().key("a"), "a");
        assert!(parse_object_url("/local/path").is_err());
        assert!(parse_object_url("mem:///x").is_err());
    }
}
