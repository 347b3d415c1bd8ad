//! # zipcontent core
//!
//! Serving individual members of read-only zip archives over HTTP, and
//! standalone content files as forced downloads.
//!
//! Archives are content-addressed: the filename carries a hash of the
//! contents, so every response is cacheable forever. A request names an
//! archive and a path inside it:
//!
//! ```text
//! /zipcontent/<archive>.zip/<member path>
//!             │              │
//!             │              └ ArchiveMemberLocator (index.html for "" and "dir/")
//!             └ ContentPathResolver
//! ```
//!
//! Members are streamed straight out of the archive. JSON members are the
//! exception: they are buffered so the `${☣ CONTENTSTORAGE}` placeholder can
//! be replaced with the archive's URL prefix.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use zipcontent_core::{ArchiveMemberResponder, ContentStorage, ContentTypeClassifier};
//!
//! let responder = ArchiveMemberResponder::new(
//!     Arc::new(ContentStorage::new("/srv/content")),
//!     Arc::new(ContentTypeClassifier::bundled()),
//! );
//! let response = responder
//!     .respond("ab12cd.zip", "js/app.js", request.headers(), "http://localhost:8080")
//!     .await?;
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod archive;
pub mod body;
pub mod cors;
pub mod download;
pub mod error;
pub mod mime;
pub mod placeholder;
pub mod responder;
pub mod storage;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use archive::{normalize_member_path, ArchiveMemberLocator, MemberDescriptor, INDEX_FILE};
pub use body::{ByteStream, ResponseBody, StreamSettings};
pub use cors::CorsHeaderPolicy;
pub use download::{DirectFileResponder, DEFAULT_DOWNLOAD_ROUTE};
pub use error::{ContentError, ContentResult};
pub use mime::{ContentTypeClassifier, APPLICATION_JSON, OCTET_STREAM};
pub use placeholder::{PlaceholderRewriter, PLACEHOLDER_TOKEN};
pub use responder::{serving_origin, ArchiveMemberResponder, DEFAULT_ARCHIVE_ROUTE, EXPIRES};
pub use storage::{ContentPathResolver, ContentStorage};
