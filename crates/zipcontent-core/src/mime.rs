//! Content type classification from file extensions.
//!
//! The table is compiled into the crate from `mime.types` and never consults
//! a host-level registry. A [`ContentTypeClassifier`] is built once at startup
//! and shared by reference.

use std::collections::HashMap;
use std::path::Path;

/// Fallback type for members with an unknown or missing extension.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// The JSON content type; members of this type get placeholder rewriting.
pub const APPLICATION_JSON: &str = "application/json";

const BUNDLED_MIME_TYPES: &str = include_str!("mime.types");

/// Extension to MIME type lookup table.
#[derive(Debug, Clone)]
pub struct ContentTypeClassifier {
    types: HashMap<String, String>,
}

impl ContentTypeClassifier {
    /// Creates a classifier with no mappings.
    pub fn empty() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    /// Creates a classifier from the bundled table.
    pub fn bundled() -> Self {
        Self::from_mime_types(BUNDLED_MIME_TYPES)
    }

    /// Parses a table in `mime.types` format.
    ///
    /// Each non-comment line is a type followed by whitespace-separated
    /// extensions. Later lines override earlier ones.
    pub fn from_mime_types(table: &str) -> Self {
        let mut classifier = Self::empty();
        for line in table.lines() {
            let line = line.split('#').next().unwrap_or("");
            let mut fields = line.split_whitespace();
            let Some(mime) = fields.next() else {
                continue;
            };
            for ext in fields {
                classifier.insert(ext, mime);
            }
        }
        classifier
    }

    /// Adds or replaces a mapping.
    #[must_use]
    pub fn with_type(mut self, extension: impl AsRef<str>, mime: impl Into<String>) -> Self {
        self.insert(extension.as_ref(), mime);
        self
    }

    /// Adds or replaces every mapping in `types`.
    #[must_use]
    pub fn with_types<I, K, V>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (ext, mime) in types {
            self.insert(ext.as_ref(), mime);
        }
        self
    }

    fn insert(&mut self, extension: &str, mime: impl Into<String>) {
        let ext = extension.trim_start_matches('.');
        if !ext.is_empty() {
            self.types.insert(ext.to_string(), mime.into());
        }
    }

    /// Number of known extensions.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns `true` if the table has no mappings.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Looks up the type for `path`'s extension.
    ///
    /// The extension is matched as written first, then lowercased. Returns
    /// `None` when there is no extension or it is unknown.
    pub fn guess(&self, path: impl AsRef<Path>) -> Option<&str> {
        let ext = path.as_ref().extension()?.to_str()?;
        self.types
            .get(ext)
            .or_else(|| self.types.get(&ext.to_ascii_lowercase()))
            .map(String::as_str)
    }

    /// Classifies `path`, falling back to [`OCTET_STREAM`].
    pub fn classify(&self, path: impl AsRef<Path>) -> &str {
        self.guess(path).unwrap_or(OCTET_STREAM)
    }
}

impl Default for ContentTypeClassifier {
    fn default() -> Self {
        Self::bundled()
    }
}
