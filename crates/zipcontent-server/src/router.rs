//! Matching request paths to the two content routes.
//!
//! ```text
//! /<archive_route>/<archive>[/<member path...>]
//! /<download_route>/<filename>[/<new filename...>]
//! ```
//!
//! Segments are percent-decoded. Paths that do not decode to UTF-8 match
//! nothing.

use percent_encoding::percent_decode_str;

/// A matched route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// A member inside an archive.
    Archive {
        /// Archive filename.
        archive: String,
        /// Path inside the archive, possibly empty.
        member: String,
    },
    /// A standalone file download.
    Download {
        /// Content filename.
        filename: String,
        /// Suggested save-as name. Accepted but not used.
        new_filename: String,
    },
}

/// The configured route names.
#[derive(Debug, Clone)]
pub struct RouteTable {
    archive_route: String,
    download_route: String,
}

impl RouteTable {
    /// Creates a table for the given route names.
    pub fn new(archive_route: impl Into<String>, download_route: impl Into<String>) -> Self {
        Self {
            archive_route: archive_route.into(),
            download_route: download_route.into(),
        }
    }

    /// The archive route name.
    pub fn archive_route(&self) -> &str {
        &self.archive_route
    }

    /// The download route name.
    pub fn download_route(&self) -> &str {
        &self.download_route
    }

    /// Matches a request path.
    pub fn match_path(&self, path: &str) -> Option<Route> {
        let rest = path.strip_prefix('/')?;
        let (prefix, rest) = rest.split_once('/')?;
        let (first, remainder) = match rest.split_once('/') {
            Some((first, remainder)) => (first, remainder),
            None => (rest, ""),
        };
        if first.is_empty() {
            return None;
        }

        let first = decode(first)?;
        let remainder = decode(remainder)?;

        if prefix == self.archive_route {
            Some(Route::Archive {
                archive: first,
                member: remainder,
            })
        } else if prefix == self.download_route {
            Some(Route::Download {
                filename: first,
                new_filename: remainder,
            })
        } else {
            None
        }
    }
}

fn decode(segment: &str) -> Option<String> {
    percent_decode_str(segment)
        .decode_utf8()
        .ok()
        .map(|s| s.into_owned())
}
