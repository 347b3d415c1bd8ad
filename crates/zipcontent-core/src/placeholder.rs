//! Placeholder substitution for JSON members.
//!
//! Exercise JSON embeds `${☣ CONTENTSTORAGE}` wherever it refers to an asset
//! stored alongside it in the archive. At serve time the token becomes the
//! URL prefix of that archive, `/<route>/<archive>`.
//!
//! Substitution works on raw bytes. The JSON is never parsed, so the token is
//! replaced wherever it appears (string values, keys, even malformed input)
//! and every other byte is left exactly as stored.

use bytes::Bytes;
use memchr::memmem;

/// Asset placeholder as authored, without the leading `$`.
pub const IMG_PLACEHOLDER: &str = "{☣ CONTENTSTORAGE}";

/// The literal token replaced in JSON members.
pub const PLACEHOLDER_TOKEN: &str = concat!("$", "{☣ CONTENTSTORAGE}");

/// Rewrites the placeholder token to an archive URL prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderRewriter {
    replacement: String,
}

impl PlaceholderRewriter {
    /// Creates a rewriter producing `/<route_name>/<archive_filename>`.
    pub fn new(route_name: &str, archive_filename: &str) -> Self {
        Self {
            replacement: format!("/{route_name}/{archive_filename}"),
        }
    }

    /// The string each token is replaced with.
    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    /// Replaces every occurrence of [`PLACEHOLDER_TOKEN`] in `content`.
    ///
    /// Returns the input unchanged (no copy) when the token is absent.
    pub fn rewrite(&self, content: Bytes) -> Bytes {
        let token = PLACEHOLDER_TOKEN.as_bytes();
        if memmem::find(&content, token).is_none() {
            return content;
        }

        let mut out = Vec::with_capacity(content.len());
        let mut last = 0;
        for start in memmem::find_iter(&content, token) {
            out.extend_from_slice(&content[last..start]);
            out.extend_from_slice(self.replacement.as_bytes());
            last = start + token.len();
        }
        out.extend_from_slice(&content[last..]);
        Bytes::from(out)
    }
}
