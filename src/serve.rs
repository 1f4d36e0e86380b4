use std::io;
use std::net::TcpListener;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::Response,
    Router,
};
use tokio::signal;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::error::LoadError;
use crate::render;
use crate::slides;
use crate::web_assets;

/// Maximum number of consecutive ports to try before giving up.
const MAX_PORT_ATTEMPTS: u16 = 100;

/// Maximum static file size that will be read and served (16 MiB).
pub const MAX_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Locations of the deck's files, all re-read on every request.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Markdown document holding the slides.
    pub content_file: PathBuf,
    /// HTML template with `$placeholder` tokens.
    pub template_file: PathBuf,
    /// Directory of static files served at the root path.
    pub public_dir: PathBuf,
}

/// Shared application state passed to all request handlers via `Arc<AppState>`.
pub struct AppState {
    pub config: AppConfig,
    /// Canonicalized `public_dir` used for symlink-safe containment checks,
    /// or `None` when the directory does not exist.
    pub canonical_public_root: Option<PathBuf>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        let canonical_public_root = std::fs::canonicalize(&config.public_dir).ok();
        if canonical_public_root.is_none() {
            warn!(
                public_dir = %config.public_dir.display(),
                "public directory not found, static files disabled"
            );
        }
        Self {
            config,
            canonical_public_root,
        }
    }
}

/// Attempt to bind a TCP listener on `bind_addr` starting at `start_port`.
///
/// On `EADDRINUSE` the port is incremented by one and the attempt is retried up
/// to `MAX_PORT_ATTEMPTS` times.  Any other OS error causes an immediate failure
/// without further retries.
pub fn bind_with_retry(bind_addr: &str, start_port: u16) -> Result<(TcpListener, u16), String> {
    let mut port = start_port;
    for _ in 0..MAX_PORT_ATTEMPTS {
        let addr = format!("{}:{}", bind_addr, port);
        match TcpListener::bind(&addr) {
            Ok(listener) => {
                debug!(port, "bound listener");
                return Ok((listener, port));
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                let next = port.wrapping_add(1);
                warn!(port, next, "port in use, trying next");
                port = next;
            }
            Err(e) => {
                return Err(format!("bind {}:{} failed: {}", bind_addr, port, e));
            }
        }
    }
    Err(format!(
        "exhausted {} port candidates starting at {}; all ports in use",
        MAX_PORT_ATTEMPTS, start_port,
    ))
}

// ---------------------------------------------------------------------------
// Path resolution helpers
// ---------------------------------------------------------------------------

/// Percent-decode a URL path byte-by-byte (RFC 3986 §2.1).
///
/// Returns `Err(())` if the encoding is malformed (truncated `%XX` sequence or
/// non-hex digit) or if the decoded byte sequence is not valid UTF-8.
pub fn percent_decode(encoded: &str) -> Result<String, ()> {
    let bytes = encoded.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 2 >= bytes.len() {
                return Err(());
            }
            let hi = hex_digit(bytes[i + 1])?;
            let lo = hex_digit(bytes[i + 2])?;
            out.push((hi << 4) | lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| ())
}

fn hex_digit(b: u8) -> Result<u8, ()> {
    match b {
        b'0'..=b'9' => Ok(b - b'0'),
        b'a'..=b'f' => Ok(b - b'a' + 10),
        b'A'..=b'F' => Ok(b - b'A' + 10),
        _ => Err(()),
    }
}

/// Normalize a decoded URL path, stripping `.` and `..` components.
///
/// Returns `None` if a `..` would escape the root (stack underflow).
pub fn normalize_path(decoded: &str) -> Option<PathBuf> {
    let mut parts: Vec<&str> = Vec::new();
    for component in decoded.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            name => parts.push(name),
        }
    }
    Some(parts.iter().collect())
}

/// Derive the `Content-Type` value from a file extension (case-insensitive).
///
/// Returns `application/octet-stream` for any unrecognised extension so that
/// browsers never perform MIME sniffing on unknown types.
pub fn mime_for_ext(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css",
        "js" | "mjs" => "text/javascript",
        "json" => "application/json",
        "md" => "text/markdown; charset=utf-8",
        "txt" => "text/plain; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// The single path segment of `path`, e.g. `3` for `/3`.
fn single_segment(path: &Path) -> Option<&str> {
    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(segment)), None) => segment.to_str(),
        _ => None,
    }
}

/// `true` when the client's `If-Modified-Since` is not older than `modified`.
fn is_not_modified(modified: SystemTime, headers: &HeaderMap) -> bool {
    let Some(since) = headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| httpdate::parse_http_date(v).ok())
    else {
        return false;
    };
    let secs = |t: SystemTime| t.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    secs(modified) <= secs(since)
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

fn plain_response(status: StatusCode, body: String) -> Response {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .header("X-Content-Type-Options", "nosniff")
        .body(Body::from(body))
        .expect("plain response builder is infallible")
}

/// 404 Not Found with mandatory security headers.
fn not_found_response() -> Response {
    plain_response(StatusCode::NOT_FOUND, "Not Found".to_owned())
}

/// 413 Content Too Large with mandatory security headers.
fn too_large_response(norm_path: &str, size: u64) -> Response {
    plain_response(
        StatusCode::PAYLOAD_TOO_LARGE,
        format!(
            "Content Too Large: {} ({} bytes exceeds {} byte limit)",
            norm_path, size, MAX_FILE_SIZE
        ),
    )
}

fn html_response(body: String) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .header("X-Content-Type-Options", "nosniff")
        .body(Body::from(body))
        .expect("html response builder is infallible")
}

// ---------------------------------------------------------------------------
// Static files
// ---------------------------------------------------------------------------

/// Serve `normalized` from the public directory.
///
/// Returns `None` when no such file exists so the caller can fall through to
/// slide routing.
async fn serve_static(state: &AppState, normalized: &Path, headers: &HeaderMap) -> Option<Response> {
    let root = state.canonical_public_root.as_ref()?;
    let candidate = root.join(normalized);
    let meta = tokio::fs::metadata(&candidate)
        .await
        .ok()
        .filter(|m| m.is_file())?;
    let norm_display = normalized.display().to_string();

    // Canonicalise and re-verify containment (symlink-safe).
    let canonical = match tokio::fs::canonicalize(&candidate).await {
        Ok(c) => c,
        Err(_) => {
            warn!(path = %norm_display, reason = "canonicalize-failed", "static file denied");
            return Some(not_found_response());
        }
    };
    if !canonical.starts_with(root) {
        warn!(
            path = %norm_display,
            canonical = %canonical.display(),
            reason = "outside-root",
            "static file denied"
        );
        return Some(not_found_response());
    }

    let size = meta.len();
    if size > MAX_FILE_SIZE {
        warn!(path = %norm_display, size, reason = "too-large", "static file denied");
        return Some(too_large_response(&norm_display, size));
    }

    let modified = meta.modified().ok();
    if modified.is_some_and(|m| is_not_modified(m, headers)) {
        debug!(path = %norm_display, "static file not modified");
        return Some(
            Response::builder()
                .status(StatusCode::NOT_MODIFIED)
                .header("X-Content-Type-Options", "nosniff")
                .body(Body::empty())
                .expect("not modified response builder is infallible"),
        );
    }

    let bytes = match tokio::fs::read(&canonical).await {
        Ok(b) => b,
        Err(_) => return Some(not_found_response()),
    };
    let ext = canonical
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");
    debug!(path = %norm_display, size, "serving static file");

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime_for_ext(ext))
        .header("X-Content-Type-Options", "nosniff");
    if let Some(modified) = modified {
        builder = builder.header(header::LAST_MODIFIED, httpdate::fmt_http_date(modified));
    }
    Some(
        builder
            .body(Body::from(bytes))
            .expect("static response builder is infallible"),
    )
}

// ---------------------------------------------------------------------------
// Slides
// ---------------------------------------------------------------------------

async fn read_source(path: &Path) -> Result<String, LoadError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// Re-read the deck, parse it and render the slide named by `requested`.
///
/// A request for a slide that does not exist still answers 200, with the
/// diagnostic text as the body.
async fn slide_response(state: &AppState, requested: &str) -> Response {
    let loaded = tokio::try_join!(
        read_source(&state.config.content_file),
        read_source(&state.config.template_file),
    );
    let (content, template) = match loaded {
        Ok(files) => files,
        Err(e) => {
            error!(error = %e, "failed to load deck");
            return plain_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal Server Error: {e}"),
            );
        }
    };

    let deck = slides::parse_slides(&content);
    let body = match render::render_page(&deck, &template, requested) {
        Ok(page) => {
            info!(slide = requested, slides = deck.len(), "rendered slide");
            page
        }
        Err(e) => {
            warn!(slide = requested, slides = deck.len(), "no such slide");
            e.to_string()
        }
    };
    html_response(body)
}

// ---------------------------------------------------------------------------
// Axum request handler
// ---------------------------------------------------------------------------

/// Main request handler.
///
/// Steps:
/// 0. Embedded `/assets/slides.css` and `/assets/slides.js` are served without
///    touching the file system.
/// 1. Percent-decode the raw request path and reject NUL bytes.
/// 2. Normalise: strip `.`/`..`; reject traversal above root.
/// 3. `/` renders slide 0.
/// 4. A file under the public directory is served as a static asset.
/// 5. Any other single segment (`/3`) is a slide index; deeper paths are 404.
///
/// All responses include `X-Content-Type-Options: nosniff`.
async fn serve_handler(State(state): State<Arc<AppState>>, req: Request) -> Response {
    if req.method() != Method::GET && req.method() != Method::HEAD {
        let mut resp = plain_response(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed".to_owned());
        resp.headers_mut()
            .insert(header::ALLOW, header::HeaderValue::from_static("GET, HEAD"));
        return resp;
    }

    let raw_path = req.uri().path().to_owned();

    if let Some((content_type, body)) = web_assets::lookup(&raw_path) {
        debug!(path = %raw_path, "serving embedded asset");
        return Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type)
            .header("X-Content-Type-Options", "nosniff")
            .body(Body::from(body))
            .expect("asset response builder is infallible");
    }

    let decoded = match percent_decode(&raw_path) {
        Ok(d) => d,
        Err(_) => {
            warn!(path = %raw_path, reason = "invalid-percent-encoding", "request denied");
            return not_found_response();
        }
    };

    if decoded.contains('\0') {
        warn!(path = %raw_path, reason = "null-byte", "request denied");
        return not_found_response();
    }

    let normalized = match normalize_path(&decoded) {
        Some(n) => n,
        None => {
            warn!(path = %raw_path, reason = "path-traversal", "request denied");
            return not_found_response();
        }
    };

    if normalized.as_os_str().is_empty() {
        return slide_response(&state, "0").await;
    }

    if let Some(resp) = serve_static(&state, &normalized, req.headers()).await {
        return resp;
    }

    match single_segment(&normalized) {
        Some(segment) => slide_response(&state, segment).await,
        None => {
            debug!(path = %normalized.display(), reason = "not-found", "request denied");
            not_found_response()
        }
    }
}

/// Build the application router with compression and request tracing.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .fallback(serve_handler)
        .with_state(state)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

// ---------------------------------------------------------------------------
// Server entry point
// ---------------------------------------------------------------------------

/// Start the HTTP server for the deck described by `config`.
///
/// Binds to `bind_addr` starting at `start_port`, retrying on `EADDRINUSE` up
/// to 100 times.  The server shuts down cleanly when SIGINT (Ctrl+C) is
/// received.
pub async fn run_serve(config: AppConfig, bind_addr: String, start_port: u16) -> io::Result<()> {
    info!(
        content = %config.content_file.display(),
        template = %config.template_file.display(),
        public = %config.public_dir.display(),
        "starting slide server"
    );
    let state = Arc::new(AppState::new(config));

    let (std_listener, bound_port) = bind_with_retry(&bind_addr, start_port).map_err(|msg| {
        error!(%msg, "bind failed");
        io::Error::new(io::ErrorKind::AddrInUse, msg)
    })?;

    std_listener.set_nonblocking(true)?;
    let listener = tokio::net::TcpListener::from_std(std_listener)?;

    let app = build_router(state);

    info!(bind = %bind_addr, port = bound_port, "listening");
    println!("Go to http://localhost:{bound_port} in a web browser");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = signal::ctrl_c().await {
                error!(error = %e, "failed to install SIGINT handler");
                std::future::pending::<()>().await;
            }
            info!("shutdown complete");
        })
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
