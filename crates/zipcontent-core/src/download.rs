//! Standalone files served as forced downloads.

use std::sync::Arc;

use http::{header, Response, StatusCode};

use crate::body::{ByteStream, ResponseBody, StreamSettings};
use crate::error::{ContentError, ContentResult};
use crate::mime::ContentTypeClassifier;
use crate::storage::ContentPathResolver;

/// Route name downloads are served under by default.
pub const DEFAULT_DOWNLOAD_ROUTE: &str = "downloadcontent";

/// Serves a content file as an attachment.
///
/// Responses carry no CORS or CSP headers.
pub struct DirectFileResponder {
    resolver: Arc<dyn ContentPathResolver>,
    classifier: Arc<ContentTypeClassifier>,
    stream: StreamSettings,
}

impl DirectFileResponder {
    /// Creates a responder with default streaming.
    pub fn new(
        resolver: Arc<dyn ContentPathResolver>,
        classifier: Arc<ContentTypeClassifier>,
    ) -> Self {
        Self {
            resolver,
            classifier,
            stream: StreamSettings::default(),
        }
    }

    /// Sets chunking for the file stream.
    #[must_use]
    pub fn with_stream_settings(mut self, stream: StreamSettings) -> Self {
        self.stream = stream;
        self
    }

    /// Builds the download response for `filename`.
    ///
    /// `Content-Type` is only set when the extension is known.
    pub async fn respond(&self, filename: &str) -> ContentResult<Response<ResponseBody>> {
        let path = self
            .resolver
            .resolve(filename)
            .await
            .ok_or_else(|| ContentError::file_not_found(filename))?;

        let file = tokio::fs::File::open(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ContentError::file_not_found(filename)
            } else {
                ContentError::Io(e)
            }
        })?;
        let len = file.metadata().await?.len();
        let file = file.into_std().await;

        let mut builder = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_DISPOSITION, "attachment;")
            .header(header::CONTENT_LENGTH, len);
        if let Some(content_type) = self.classifier.guess(filename) {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }

        tracing::debug!(file = filename, len, "serving download");
        Ok(builder.body(ByteStream::from_reader(self.stream, file).into_body())?)
    }
}

impl std::fmt::Debug for DirectFileResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectFileResponder")
            .field("stream", &self.stream)
            .finish_non_exhaustive()
    }
}
