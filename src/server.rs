use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use axum::body::Body;
use axum::extract::{Path as UrlPath, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tracing::{debug, error, info};

use crate::core::snapshot::resolve_site;
use crate::error::{Result, SnapError, ErrorContext};

#[derive(Clone)]
struct SiteState {
    out: Arc<PathBuf>,
}

/// Read-only router over `<out>/current`.
///
/// The pointer is resolved on every request, so a rebuild shows up without a
/// restart. Only files are served; there are no index pages or listings.
pub fn router<P: AsRef<Path>>(out: P) -> Router {
    let state = SiteState {
        out: Arc::new(out.as_ref().to_path_buf()),
    };
    Router::new()
        .route("/", get(|| async { StatusCode::NOT_FOUND }))
        .route("/{*path}", get(serve_file))
        .with_state(state)
}

// the wildcard capture arrives percent-decoded
async fn serve_file(State(state): State<SiteState>, UrlPath(path): UrlPath<String>) -> Response {
    let Some(rel) = request_path(&path) else {
        return (StatusCode::BAD_REQUEST, "invalid path").into_response();
    };
    if rel.as_os_str().is_empty() {
        return StatusCode::NOT_FOUND.into_response();
    }

    let site = match resolve_site(&state.out) {
        Ok(site) => site,
        Err(err) => {
            debug!(error = %err, "no published snapshot");
            return (StatusCode::SERVICE_UNAVAILABLE, "no published snapshot").into_response();
        }
    };

    let path = site.join(&rel);
    match tokio::fs::read(&path).await {
        Ok(bytes) => (
            [(header::CONTENT_TYPE, content_type(&path))],
            Body::from(bytes),
        )
            .into_response(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => StatusCode::NOT_FOUND.into_response(),
        Err(err) => {
            // directories land here too
            debug!(path = %path.display(), error = %err, "read failed");
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// Relative file path for a decoded request path, or `None` if it tries to leave the site
fn request_path(decoded: &str) -> Option<PathBuf> {
    let trimmed = decoded.trim_start_matches('/');
    if trimmed.contains('\\') {
        return None;
    }
    let rel = Path::new(trimmed);
    rel.components()
        .all(|c| matches!(c, Component::Normal(_)))
        .then(|| rel.to_path_buf())
}

fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "txt" | "sig" | "md" => "text/plain; charset=utf-8",
        "svg" => "image/svg+xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "wasm" => "application/wasm",
        _ => "application/octet-stream",
    }
}

/// A server running on its own thread
pub struct ServerHandle {
    pub addr: SocketAddr,
    thread: JoinHandle<()>,
}

impl ServerHandle {
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

fn bind(bind: &str, port: u16) -> Result<StdTcpListener> {
    let listener = StdTcpListener::bind((bind, port))
        .with_io_context(|| format!("binding {}:{}", bind, port))?;
    listener
        .set_nonblocking(true)
        .with_io_context(|| "configuring listener".to_string())?;
    Ok(listener)
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .with_io_context(|| "starting server runtime".to_string())
}

async fn run(listener: StdTcpListener, out: PathBuf) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::from_std(listener)?;
    info!(addr = %listener.local_addr()?, out = %out.display(), "serving published snapshot");
    axum::serve(listener, router(out)).await
}

/// Serve `<out>/current` until the process is killed
pub fn serve(out: &Path, bind_addr: &str, port: u16) -> Result<()> {
    let listener = bind(bind_addr, port)?;
    runtime()?
        .block_on(run(listener, out.to_path_buf()))
        .map_err(|e| SnapError::Generic {
            message: "HTTP server stopped".to_string(),
            source: Some(Box::new(e)),
        })
}

/// Start the server on a background thread, for `watch --serve-port`.
///
/// Binding happens before the thread starts so address errors reach the caller.
pub fn spawn_server(out: PathBuf, bind_addr: &str, port: u16) -> Result<ServerHandle> {
    let listener = bind(bind_addr, port)?;
    let addr = listener
        .local_addr()
        .with_io_context(|| "reading bound address".to_string())?;
    let rt = runtime()?;

    let thread = std::thread::Builder::new()
        .name("snapseal-http".to_string())
        .spawn(move || {
            if let Err(err) = rt.block_on(run(listener, out)) {
                error!(error = %err, "HTTP server stopped");
            }
        })
        .with_io_context(|| "spawning server thread".to_string())?;

    Ok(ServerHandle { addr, thread })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::core::snapshot::{write_artifact, SnapshotStore, SIGNATURE_FILE, STATUS_FILE};
    use axum::http::Request;
    use std::fs;
    use chrono::{TimeZone, Utc};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn publish(out: &Path, secs: i64, status: &str) {
        let store = SnapshotStore::new(out);
        let (id, dir) = store.create_snapshot(Utc.timestamp_opt(secs, 0).unwrap()).unwrap();
        write_artifact(&dir, STATUS_FILE, status.as_bytes()).unwrap();
        write_artifact(&dir, SIGNATURE_FILE, b"sig").unwrap();
        store.publish(&id).unwrap();
    }

    async fn get_path(app: Router, path: &str) -> (StatusCode, String, Option<String>) {
        let response = app
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&body).into_owned(), content_type)
    }

    #[tokio::test]
    async fn test_serves_current_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        publish(tmp.path(), 1, r#"{"files":1}"#);

        let (status, body, content_type) = get_path(router(tmp.path()), "/status.json").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"files":1}"#);
        assert_eq!(content_type.as_deref(), Some("application/json"));
    }

    #[tokio::test]
    async fn test_rebuild_is_visible_without_restart() {
        let tmp = tempfile::tempdir().unwrap();
        publish(tmp.path(), 1, "first");
        let app = router(tmp.path());
        assert_eq!(get_path(app.clone(), "/status.json").await.1, "first");

        publish(tmp.path(), 2, "second");
        assert_eq!(get_path(app, "/status.json").await.1, "second");
    }

    #[tokio::test]
    async fn test_missing_and_unpublished() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        let (status, _, _) = get_path(router(&out), "/status.json").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        publish(&out, 1, "{}");
        let (status, _, _) = get_path(router(&out), "/nope.txt").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) = get_path(router(&out), "/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_encoded_names_are_decoded() {
        let tmp = tempfile::tempdir().unwrap();
        publish(tmp.path(), 1, "{}");
        let site = resolve_site(tmp.path()).unwrap();
        fs::create_dir_all(site.join("chunks")).unwrap();
        fs::write(site.join("chunks/my file.txt.1.txt"), "spaced").unwrap();
        fs::write(site.join("chunks/caf\u{e9}.md.1.txt"), "accent").unwrap();

        let (status, body, _) = get_path(router(tmp.path()), "/chunks/my%20file.txt.1.txt").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "spaced");

        let (status, body, _) = get_path(router(tmp.path()), "/chunks/caf%C3%A9.md.1.txt").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "accent");
    }

    #[tokio::test]
    async fn test_encoded_traversal_is_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        publish(&out, 1, "{}");
        fs::write(tmp.path().join("x"), "outside").unwrap();

        for path in ["/%2e%2e/x", "/chunks/%2E%2E/%2e%2e/x", "/..%2fx"] {
            let (status, body, _) = get_path(router(&out), path).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", path);
            assert_ne!(body, "outside");
        }
    }

    #[test]
    fn test_request_path_rejects_traversal() {
        assert_eq!(request_path("/chunks/a.txt.1.txt"), Some(PathBuf::from("chunks/a.txt.1.txt")));
        assert_eq!(request_path("chunks/my file.txt.1.txt"), Some(PathBuf::from("chunks/my file.txt.1.txt")));
        assert_eq!(request_path("/../etc/passwd"), None);
        assert_eq!(request_path("/chunks/../../x"), None);
        assert_eq!(request_path("../x"), None);
        assert_eq!(request_path("a\\..\\b"), None);
        assert_eq!(request_path("/"), Some(PathBuf::new()));
    }

    #[test]
    fn test_content_types() {
        assert_eq!(content_type(Path::new("manifest.sig")), "text/plain; charset=utf-8");
        assert_eq!(content_type(Path::new("chunks/a.bin.1.txt")), "text/plain; charset=utf-8");
        assert_eq!(content_type(Path::new("blob")), "application/octet-stream");
    }
}
