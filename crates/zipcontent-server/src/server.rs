//! HTTP server.
//!
//! One tokio task per connection, HTTP/1.1 via hyper. Every request runs in
//! a `request` span carrying a UUID v7 request id and is dispatched to the
//! archive or download responder by [`RouteTable`].

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use http::{header, HeaderValue, Method, Request, Response, StatusCode};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use zipcontent_core::body::{empty, full};
use zipcontent_core::{
    serving_origin, ArchiveMemberResponder, ContentError, ContentPathResolver, ContentStorage,
    DirectFileResponder, ResponseBody, APPLICATION_JSON,
};

use crate::config::ServerConfig;
use crate::error::{ErrorResponse, ServerError, ServerResult};
use crate::router::{Route, RouteTable};
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

const ARCHIVE_METHODS: &str = "GET, HEAD, OPTIONS";
const DOWNLOAD_METHODS: &str = "GET, HEAD";

/// The content server.
pub struct ContentServer {
    config: Arc<ServerConfig>,
    routes: RouteTable,
    archive: ArchiveMemberResponder,
    download: DirectFileResponder,
    fallback_authority: String,
}

impl ContentServer {
    /// Creates a server reading from the configured content directory.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let storage = ContentStorage::new(config.storage.content_dir.clone());
        Self::with_resolver(config, Arc::new(storage))
    }

    /// Creates a server over a custom resolver.
    pub fn with_resolver(
        config: ServerConfig,
        resolver: Arc<dyn ContentPathResolver>,
    ) -> ServerResult<Self> {
        config.validate()?;

        let classifier = Arc::new(config.classifier());
        let stream = config.stream_settings();

        let archive = ArchiveMemberResponder::new(Arc::clone(&resolver), Arc::clone(&classifier))
            .with_route_name(config.routes.archive_route.clone())
            .with_stream_settings(stream);
        let download =
            DirectFileResponder::new(resolver, classifier).with_stream_settings(stream);
        let routes = RouteTable::new(
            config.routes.archive_route.clone(),
            config.routes.download_route.clone(),
        );
        let fallback_authority = config.socket_addr()?.to_string();

        Ok(Self {
            config: Arc::new(config),
            routes,
            archive,
            download,
            fallback_authority,
        })
    }

    /// The configuration this server was built from.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Runs until SIGTERM or SIGINT.
    pub async fn run(self) -> ServerResult<()> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals()).await
    }

    /// Runs until `shutdown` is triggered, then waits for open connections
    /// up to the configured shutdown timeout.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> ServerResult<()> {
        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::bind(format!("failed to bind {addr}: {e}")))?;

        self.serve(listener, shutdown).await
    }

    /// Serves connections from an already bound listener.
    pub async fn serve(self, listener: TcpListener, shutdown: ShutdownSignal) -> ServerResult<()> {
        let local_addr = listener.local_addr()?;
        info!(
            addr = %local_addr,
            archive_route = self.routes.archive_route(),
            download_route = self.routes.download_route(),
            content_dir = %self.config.storage.content_dir.display(),
            "zipcontent listening"
        );

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let server = Arc::clone(&server);
                            let token = tracker.acquire();
                            let shutdown = shutdown.clone();

                            tokio::spawn(async move {
                                if let Err(e) = server.serve_connection(stream, peer, shutdown).await {
                                    debug!(peer = %peer, error = %e, "connection error");
                                }
                                drop(token);
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }

                () = shutdown.recv() => {
                    info!("shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }

        let timeout = server.config.shutdown_timeout();
        info!(
            active = tracker.active_connections(),
            timeout_secs = timeout.as_secs(),
            "waiting for open connections"
        );

        tokio::select! {
            () = tracker.wait_for_drain() => info!("all connections closed"),
            () = tokio::time::sleep(timeout) => warn!(
                active = tracker.active_connections(),
                "shutdown timeout reached"
            ),
        }

        info!("zipcontent stopped");
        Ok(())
    }

    async fn serve_connection(
        self: Arc<Self>,
        stream: TcpStream,
        peer: SocketAddr,
        shutdown: ShutdownSignal,
    ) -> Result<(), hyper::Error> {
        let io = TokioIo::new(stream);
        let server = Arc::clone(&self);

        let service = service_fn(move |req: Request<Incoming>| {
            let server = Arc::clone(&server);
            async move { Ok::<_, Infallible>(server.handle(req, Some(peer)).await) }
        });

        let conn = http1::Builder::new().serve_connection(io, service);
        tokio::pin!(conn);

        tokio::select! {
            result = conn.as_mut() => result,
            () = shutdown.recv() => {
                debug!(peer = %peer, "finishing connection for shutdown");
                conn.as_mut().graceful_shutdown();
                conn.await
            }
        }
    }

    /// Handles one request.
    ///
    /// The request body is never read. `HEAD` is answered like `GET` with the
    /// body dropped.
    pub async fn handle<B>(&self, req: Request<B>, peer: Option<SocketAddr>) -> Response<ResponseBody> {
        let start = Instant::now();
        let request_id = Uuid::now_v7().to_string();
        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let span = tracing::info_span!(
            "request",
            request_id = %request_id,
            method = %method,
            path = %path,
            peer = ?peer,
        );

        async move {
            let mut response = self.dispatch(&req, &request_id).await;
            if method == Method::HEAD {
                response = response.map(|_| empty());
            }

            info!(
                status = response.status().as_u16(),
                duration_ms = start.elapsed().as_millis() as u64,
                "request completed"
            );
            response
        }
        .instrument(span)
        .await
    }

    async fn dispatch<B>(&self, req: &Request<B>, request_id: &str) -> Response<ResponseBody> {
        let Some(route) = self.routes.match_path(req.uri().path()) else {
            debug!("no matching route");
            return error_response(
                StatusCode::NOT_FOUND,
                "not_found",
                &format!("no route for {}", req.uri().path()),
                request_id,
            );
        };

        match route {
            Route::Archive { archive, member } => match *req.method() {
                Method::GET | Method::HEAD => {
                    let origin =
                        serving_origin(req.uri(), req.headers(), &self.fallback_authority);
                    let result = self
                        .archive
                        .respond(&archive, &member, req.headers(), &origin)
                        .await;
                    self.content_response(result, request_id)
                }
                Method::OPTIONS => self.archive.cors().preflight(req.headers()),
                _ => method_not_allowed(ARCHIVE_METHODS, request_id),
            },
            Route::Download { filename, .. } => match *req.method() {
                Method::GET | Method::HEAD => {
                    let result = self.download.respond(&filename).await;
                    self.content_response(result, request_id)
                }
                _ => method_not_allowed(DOWNLOAD_METHODS, request_id),
            },
        }
    }

    fn content_response(
        &self,
        result: Result<Response<ResponseBody>, ContentError>,
        request_id: &str,
    ) -> Response<ResponseBody> {
        match result {
            Ok(response) => response,
            Err(e) if e.is_not_found() => {
                warn!(error = %e, category = e.category(), "content not found");
                error_response(e.status_code(), e.category(), &e.to_string(), request_id)
            }
            Err(e) => {
                error!(error = %e, category = e.category(), "failed to serve content");
                error_response(
                    e.status_code(),
                    "internal_error",
                    "internal server error",
                    request_id,
                )
            }
        }
    }
}

impl std::fmt::Debug for ContentServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentServer")
            .field("routes", &self.routes)
            .field("fallback_authority", &self.fallback_authority)
            .finish_non_exhaustive()
    }
}

/// Create a JSON response.
fn json_response<T: serde::Serialize>(status: StatusCode, body: &T) -> Response<ResponseBody> {
    let json = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());

    let mut response = Response::new(full(json));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(APPLICATION_JSON),
    );
    response
}

/// Create an error response.
fn error_response(
    status: StatusCode,
    error: &str,
    message: &str,
    request_id: &str,
) -> Response<ResponseBody> {
    let body = ErrorResponse::new(error, message).with_request_id(request_id);
    json_response(status, &body)
}

fn method_not_allowed(allow: &'static str, request_id: &str) -> Response<ResponseBody> {
    let mut response = error_response(
        StatusCode::METHOD_NOT_ALLOWED,
        "method_not_allowed",
        &format!("allowed methods: {allow}"),
        request_id,
    );
    response
        .headers_mut()
        .insert(header::ALLOW, HeaderValue::from_static(allow));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use http_body_util::BodyExt;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use zipcontent_core::fixtures::ArchiveFixture;
    use zipcontent_core::PLACEHOLDER_TOKEN;

    /// Resolver that counts lookups.
    struct CountingResolver {
        inner: ContentStorage,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ContentPathResolver for CountingResolver {
        async fn resolve(&self, filename: &str) -> Option<PathBuf> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.resolve(filename).await
        }
    }

    fn config(fixture: &ArchiveFixture) -> ServerConfig {
        ServerConfig::builder()
            .listen_addr("127.0.0.1")
            .content_dir(fixture.dir())
            .chunk_size(4096)
            .build()
            .unwrap()
    }

    fn server(fixture: &ArchiveFixture) -> ContentServer {
        tokio_test::assert_ok!(ContentServer::new(config(fixture)))
    }

    fn request(method: Method, uri: &str) -> Request<()> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::HOST, "learn.local:8000")
            .body(())
            .unwrap()
    }

    async fn send(server: &ContentServer, req: Request<()>) -> (Response<()>, Bytes) {
        let response = server.handle(req, None).await;
        let (parts, body) = response.into_parts();
        let bytes = body.collect().await.unwrap().to_bytes();
        (Response::from_parts(parts, ()), bytes)
    }

    fn member_uri(fixture: &ArchiveFixture, member: &str) -> String {
        format!("/zipcontent/{}/{member}", fixture.filename())
    }

    fn header_str<'a>(response: &'a Response<()>, name: &str) -> Option<&'a str> {
        response.headers().get(name).map(|v| v.to_str().unwrap())
    }

    #[tokio::test]
    async fn test_missing_archive_is_404_on_both_routes() {
        let fixture = ArchiveFixture::standard();
        let server = server(&fixture);

        for uri in ["/zipcontent/zz99.zip/index.html", "/downloadcontent/zz99.zip/x.zip"] {
            let (response, body) = send(&server, request(Method::GET, uri)).await;
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            assert_eq!(header_str(&response, "content-type"), Some(APPLICATION_JSON));
            assert!(header_str(&response, "access-control-allow-origin").is_none());

            let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
            assert!(error.message.contains("zz99.zip"));
            assert!(error.request_id.is_some());
        }
    }

    #[tokio::test]
    async fn test_directory_requests_match_index() {
        let fixture = ArchiveFixture::standard();
        let server = server(&fixture);

        let (_, explicit) = send(&server, request(Method::GET, &member_uri(&fixture, "index.html"))).await;
        let (_, trailing) = send(&server, request(Method::GET, &member_uri(&fixture, ""))).await;
        let (_, bare) = send(
            &server,
            request(Method::GET, &format!("/zipcontent/{}", fixture.filename())),
        )
        .await;

        assert_eq!(explicit, ArchiveFixture::INDEX_HTML);
        assert_eq!(trailing, explicit);
        assert_eq!(bare, explicit);

        let (_, sub) = send(&server, request(Method::GET, &member_uri(&fixture, "sub/"))).await;
        assert_eq!(sub, ArchiveFixture::SUB_INDEX_HTML);
    }

    #[tokio::test]
    async fn test_if_modified_since_is_304_for_any_member() {
        let fixture = ArchiveFixture::standard();
        let server = server(&fixture);

        for member in ["index.html", "not/there.png"] {
            let mut req = request(Method::GET, &member_uri(&fixture, member));
            req.headers_mut().insert(
                header::IF_MODIFIED_SINCE,
                HeaderValue::from_static("Sat, 01 Jan 2000 00:00:00 GMT"),
            );
            let (response, body) = send(&server, req).await;

            assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
            assert_eq!(header_str(&response, "access-control-allow-origin"), Some("*"));
            assert!(body.is_empty());
        }
    }

    #[tokio::test]
    async fn test_json_tokens_are_replaced_with_route_prefix() {
        let fixture = ArchiveFixture::standard();
        let server = server(&fixture);

        let (response, body) =
            send(&server, request(Method::GET, &member_uri(&fixture, "data/exercise.json"))).await;
        let text = std::str::from_utf8(&body).unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, "content-type"), Some(APPLICATION_JSON));
        assert!(!text.contains(PLACEHOLDER_TOKEN));
        assert_eq!(
            text.matches(&format!("/zipcontent/{}", fixture.filename())).count(),
            2
        );
        assert_eq!(
            header_str(&response, "content-length"),
            Some(body.len().to_string().as_str())
        );
    }

    #[tokio::test]
    async fn test_content_length_is_uncompressed_size() {
        let fixture = ArchiveFixture::standard();
        let server = server(&fixture);

        let (response, body) =
            send(&server, request(Method::GET, &member_uri(&fixture, "media/large.bin"))).await;

        let expected = ArchiveFixture::large_bin();
        assert_eq!(
            header_str(&response, "content-length"),
            Some(expected.len().to_string().as_str())
        );
        assert_eq!(&body[..], &expected[..]);
        assert_eq!(
            header_str(&response, "content-security-policy"),
            Some("default-src 'self' 'unsafe-inline' 'unsafe-eval' data: http://learn.local:8000")
        );
        assert_eq!(header_str(&response, "accept-ranges"), Some("none"));
        assert_eq!(
            header_str(&response, "expires"),
            Some("Sun, 17-Jan-2038 19:14:07 GMT")
        );
    }

    #[tokio::test]
    async fn test_options_never_touches_storage() {
        let fixture = ArchiveFixture::standard();
        let resolver = Arc::new(CountingResolver {
            inner: fixture.storage(),
            calls: AtomicUsize::new(0),
        });
        let server = ContentServer::with_resolver(
            config(&fixture),
            Arc::clone(&resolver) as Arc<dyn ContentPathResolver>,
        )
        .unwrap();

        let mut req = request(Method::OPTIONS, "/zipcontent/zz99.zip/whatever.js");
        req.headers_mut().insert(
            "access-control-request-headers",
            HeaderValue::from_static("x-csrftoken"),
        );
        let (response, body) = send(&server, req).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(body.is_empty());
        assert_eq!(header_str(&response, "access-control-allow-origin"), Some("*"));
        assert_eq!(
            header_str(&response, "access-control-allow-methods"),
            Some("GET, OPTIONS")
        );
        assert_eq!(
            header_str(&response, "access-control-allow-headers"),
            Some("x-csrftoken")
        );
        assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_byte_member_omits_content_length() {
        let fixture = ArchiveFixture::standard();
        let server = server(&fixture);

        let (response, body) =
            send(&server, request(Method::GET, &member_uri(&fixture, "empty.txt"))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(header_str(&response, "content-length").is_none());
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_downloads_are_attachments_without_cors_or_csp() {
        let fixture = ArchiveFixture::standard();
        fixture.add_file("f00d.mp4", b"0123456789");
        let server = server(&fixture);

        let (response, body) =
            send(&server, request(Method::GET, "/downloadcontent/f00d.mp4/My%20Video.mp4")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(header_str(&response, "content-disposition"), Some("attachment;"));
        assert_eq!(header_str(&response, "content-type"), Some("video/mp4"));
        assert_eq!(header_str(&response, "content-length"), Some("10"));
        assert!(header_str(&response, "access-control-allow-origin").is_none());
        assert!(header_str(&response, "content-security-policy").is_none());
        assert_eq!(&body[..], b"0123456789");
    }

    #[tokio::test]
    async fn test_head_matches_get_without_body() {
        let fixture = ArchiveFixture::standard();
        let server = server(&fixture);
        let uri = member_uri(&fixture, "css/style.css");

        let (get, _) = send(&server, request(Method::GET, &uri)).await;
        let (head, body) = send(&server, request(Method::HEAD, &uri)).await;

        assert_eq!(head.status(), StatusCode::OK);
        assert!(body.is_empty());
        assert_eq!(head.headers(), get.headers());
    }

    #[tokio::test]
    async fn test_unsupported_methods_are_405() {
        let fixture = ArchiveFixture::standard();
        let server = server(&fixture);

        let (response, _) = send(&server, request(Method::POST, &member_uri(&fixture, "index.html"))).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(header_str(&response, "allow"), Some("GET, HEAD, OPTIONS"));

        let (response, _) =
            send(&server, request(Method::OPTIONS, "/downloadcontent/f00d.mp4/x.mp4")).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(header_str(&response, "allow"), Some("GET, HEAD"));
    }

    #[tokio::test]
    async fn test_unknown_route_is_404() {
        let fixture = ArchiveFixture::standard();
        let server = server(&fixture);

        let (response, body) = send(&server, request(Method::GET, "/elsewhere/a/b")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(error.error, "not_found");
    }

    #[tokio::test]
    async fn test_corrupt_archive_is_generic_500() {
        let fixture = ArchiveFixture::standard();
        fixture.add_file("bad0.zip", b"this is not a zip archive");
        let server = server(&fixture);

        let (response, body) =
            send(&server, request(Method::GET, "/zipcontent/bad0.zip/index.html")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(error.message, "internal server error");
    }

    #[tokio::test]
    async fn test_custom_archive_route() {
        let fixture = ArchiveFixture::standard();
        let mut config = config(&fixture);
        config.routes.archive_route = "zc".to_string();
        let server = tokio_test::assert_ok!(ContentServer::new(config));

        let (response, body) = send(
            &server,
            request(Method::GET, &format!("/zc/{}/data/exercise.json", fixture.filename())),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let text = std::str::from_utf8(&body).unwrap();
        assert!(text.contains(&format!("/zc/{}/images/a.png", fixture.filename())));
    }

    #[tokio::test]
    async fn test_csp_falls_back_to_bracketed_ipv6_listen_addr() {
        let fixture = ArchiveFixture::standard();
        let config = ServerConfig::builder()
            .listen_addr("::")
            .listen_port(8080)
            .content_dir(fixture.dir())
            .build()
            .unwrap();
        let server = tokio_test::assert_ok!(ContentServer::new(config));

        let req = Request::builder()
            .uri(member_uri(&fixture, "index.html"))
            .body(())
            .unwrap();
        let (response, _) = send(&server, req).await;
        assert_eq!(
            header_str(&response, "content-security-policy"),
            Some("default-src 'self' 'unsafe-inline' 'unsafe-eval' data: http://[::]:8080")
        );
    }

    #[tokio::test]
    async fn test_empty_if_modified_since_is_ignored() {
        let fixture = ArchiveFixture::standard();
        let server = server(&fixture);

        let mut req = request(Method::GET, &member_uri(&fixture, "js/app.js"));
        req.headers_mut()
            .insert(header::IF_MODIFIED_SINCE, HeaderValue::from_static(""));
        let (response, body) = send(&server, req).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body, ArchiveFixture::APP_JS);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        assert!(ContentServer::new(ServerConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_serve_and_shutdown() {
        let fixture = ArchiveFixture::standard();
        let server = server(&fixture);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let shutdown = ShutdownSignal::new();

        let handle = tokio::spawn(server.serve(listener, shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        shutdown.trigger();

        let joined = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server should stop");
        tokio_test::assert_ok!(joined.expect("task should not panic"));
    }
}
