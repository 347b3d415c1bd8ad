//! HTTP responses for archive members.
//!
//! ```text
//! START → RESOLVE ─┬─ missing ──────────────► 404
//!                  └─ CHECK_CACHE ─┬─ If-Modified-Since ► 304
//!                                  └─ LOCATE ─┬─ miss ──► 404
//!                                             └─ CLASSIFY → BUILD_BODY → EMIT_HEADERS → 200
//! ```
//!
//! Archives are content-addressed and never change once stored. The
//! conditional check only requires the archive to exist and never opens it.

use std::sync::Arc;

use http::{header, HeaderMap, Response, StatusCode, Uri};

use crate::archive::ArchiveMemberLocator;
use crate::body::{empty, full, ResponseBody, StreamSettings};
use crate::cors::CorsHeaderPolicy;
use crate::error::{ContentError, ContentResult};
use crate::mime::{ContentTypeClassifier, APPLICATION_JSON};
use crate::placeholder::PlaceholderRewriter;
use crate::storage::ContentPathResolver;

/// Route name archive members are served under by default.
pub const DEFAULT_ARCHIVE_ROUTE: &str = "zipcontent";

/// Far-future expiry sent with every member.
pub const EXPIRES: &str = "Sun, 17-Jan-2038 19:14:07 GMT";

const CSP_PREFIX: &str = "default-src 'self' 'unsafe-inline' 'unsafe-eval' data: ";

/// Builds `scheme://authority` for the host serving a request.
///
/// The authority is taken from the request URI, then the `Host` header, then
/// `fallback_authority`. The scheme defaults to `http`.
pub fn serving_origin(uri: &Uri, headers: &HeaderMap, fallback_authority: &str) -> String {
    let scheme = uri.scheme_str().unwrap_or("http");
    let authority = uri
        .authority()
        .map(|a| a.as_str())
        .or_else(|| headers.get(header::HOST).and_then(|h| h.to_str().ok()))
        .filter(|a| !a.is_empty())
        .unwrap_or(fallback_authority);
    format!("{scheme}://{authority}")
}

/// Serves single members out of zip archives.
pub struct ArchiveMemberResponder {
    resolver: Arc<dyn ContentPathResolver>,
    classifier: Arc<ContentTypeClassifier>,
    locator: ArchiveMemberLocator,
    cors: CorsHeaderPolicy,
    route_name: String,
    stream: StreamSettings,
}

impl ArchiveMemberResponder {
    /// Creates a responder on the default route with default streaming.
    pub fn new(
        resolver: Arc<dyn ContentPathResolver>,
        classifier: Arc<ContentTypeClassifier>,
    ) -> Self {
        Self {
            resolver,
            classifier,
            locator: ArchiveMemberLocator::new(),
            cors: CorsHeaderPolicy::new(),
            route_name: DEFAULT_ARCHIVE_ROUTE.to_string(),
            stream: StreamSettings::default(),
        }
    }

    /// Sets the route name used when rewriting placeholders.
    #[must_use]
    pub fn with_route_name(mut self, route_name: impl Into<String>) -> Self {
        self.route_name = route_name.into();
        self
    }

    /// Sets chunking for streamed members.
    #[must_use]
    pub fn with_stream_settings(mut self, stream: StreamSettings) -> Self {
        self.stream = stream;
        self
    }

    /// The route name.
    pub fn route_name(&self) -> &str {
        &self.route_name
    }

    /// The CORS policy, for answering preflights on this route.
    pub fn cors(&self) -> &CorsHeaderPolicy {
        &self.cors
    }

    /// Builds the response for `member_path` inside `archive_filename`.
    ///
    /// `origin` is the `scheme://host` the request was addressed to; see
    /// [`serving_origin`].
    ///
    /// # Errors
    ///
    /// [`ContentError::ArchiveNotFound`] and [`ContentError::MemberNotFound`]
    /// for 404s; any other variant means the archive could not be read.
    pub async fn respond(
        &self,
        archive_filename: &str,
        member_path: &str,
        request_headers: &HeaderMap,
        origin: &str,
    ) -> ContentResult<Response<ResponseBody>> {
        let archive_path = self
            .resolver
            .resolve(archive_filename)
            .await
            .ok_or_else(|| ContentError::archive_not_found(archive_filename))?;

        if request_headers
            .get(header::IF_MODIFIED_SINCE)
            .is_some_and(|v| !v.is_empty())
        {
            tracing::debug!(archive = archive_filename, "conditional request, not modified");
            let mut response = Response::new(empty());
            *response.status_mut() = StatusCode::NOT_MODIFIED;
            self.cors.apply(request_headers, response.headers_mut());
            return Ok(response);
        }

        let member = self
            .locator
            .locate(archive_path, archive_filename, member_path)
            .await?;
        let content_type = self.classifier.classify(member.path()).to_string();
        let recorded_size = member.size();

        let (body, length) = if content_type == APPLICATION_JSON {
            let rewriter = PlaceholderRewriter::new(&self.route_name, archive_filename);
            let content = rewriter.rewrite(member.read_all().await?);
            let length = content.len() as u64;
            (full(content), length)
        } else {
            (member.into_stream(self.stream).into_body(), recorded_size)
        };

        let mut builder = Response::builder()
            .status(StatusCode::OK)
            .header(header::EXPIRES, EXPIRES)
            .header(header::ACCEPT_RANGES, "none")
            .header(header::CONTENT_TYPE, content_type.as_str())
            .header(header::CONTENT_SECURITY_POLICY, format!("{CSP_PREFIX}{origin}"));
        if recorded_size != 0 {
            builder = builder.header(header::CONTENT_LENGTH, length);
        }

        let mut response = builder.body(body)?;
        self.cors.apply(request_headers, response.headers_mut());

        tracing::debug!(
            archive = archive_filename,
            content_type = %content_type,
            length,
            "serving archive member"
        );
        Ok(response)
    }
}

impl std::fmt::Debug for ArchiveMemberResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveMemberResponder")
            .field("route_name", &self.route_name)
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}
