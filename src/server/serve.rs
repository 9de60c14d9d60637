//! The `serve` subcommand: static file server for one folder
//!
//! File responses come from tower-http's `ServeDir`. Folders without an
//! `index.html` fall through to a plain HTML listing. Every request is
//! written to stdout as one access-log line, which is what the GUI shows.

use std::net::{IpAddr, SocketAddr};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum::extract::{ConnectInfo, Request, State};
use axum::handler::Handler;
use axum::http::{StatusCode, Uri};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Redirect, Response};
use tower_http::services::ServeDir;
use tracing::{error, info};

use crate::error::ServeError;
use crate::net;

#[derive(Debug, Clone)]
pub struct ServeOptions {
    pub root: PathBuf,
    pub port: u16,
    pub bind: IpAddr,
}

/// Run the server until SIGTERM or Ctrl-C
pub fn run(opts: ServeOptions) -> Result<(), ServeError> {
    if !opts.root.is_dir() {
        return Err(ServeError::NotADirectory(opts.root));
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(ServeError::Runtime)?;

    runtime.block_on(serve(opts))
}

async fn serve(opts: ServeOptions) -> Result<(), ServeError> {
    let addr = SocketAddr::new(opts.bind, opts.port);
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::AddrInUse {
            ServeError::AddrInUse(addr)
        } else {
            ServeError::Bind { addr, source: e }
        }
    })?;

    info!(
        "Serving HTTP on {} port {} ({}) ...",
        opts.bind,
        opts.port,
        net::access_url(opts.bind, opts.port)
    );
    info!("Document root: {}", opts.root.display());

    let app = router(opts.root);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server stopped");
    Ok(())
}

pub fn router(root: PathBuf) -> Router {
    let root = Arc::new(root);
    let listing = list_directory.with_state(Arc::clone(&root));
    let files = ServeDir::new(root.as_path()).fallback(listing);

    Router::new()
        .fallback_service(files)
        .layer(middleware::from_fn(access_log))
}

async fn access_log(req: Request, next: Next) -> Response {
    let client = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "-".to_string());
    let method = req.method().clone();
    let uri = req.uri().clone();
    let version = req.version();

    let response = next.run(req).await;

    info!(
        "{client} \"{method} {uri} {version:?}\" {}",
        response.status().as_u16()
    );
    response
}

/// Fallback for anything `ServeDir` could not open: list folders, 404 the rest
async fn list_directory(State(root): State<Arc<PathBuf>>, uri: Uri) -> Response {
    let request_path = uri.path();
    let Some(path) = resolve_path(&root, request_path) else {
        return not_found();
    };

    if !tokio::fs::metadata(&path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
    {
        return not_found();
    }

    if !request_path.ends_with('/') {
        return Redirect::permanent(&format!("{request_path}/")).into_response();
    }

    match read_entries(&path).await {
        Ok(entries) => {
            let display = urlencoding::decode(request_path)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| request_path.to_string());
            Html(render_listing(&display, &entries)).into_response()
        }
        Err(e) => {
            error!("failed to list {}: {e}", path.display());
            (StatusCode::NOT_FOUND, "No permission to list directory").into_response()
        }
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "File not found").into_response()
}

/// Map a request path onto the filesystem below `root`.
/// Returns `None` for anything that would escape it.
pub fn resolve_path(root: &Path, uri_path: &str) -> Option<PathBuf> {
    let decoded = urlencoding::decode(uri_path).ok()?;
    let mut path = root.to_path_buf();

    for component in Path::new(decoded.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(path)
}

/// A listing entry: name and whether it is a directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

async fn read_entries(path: &Path) -> std::io::Result<Vec<DirEntry>> {
    let mut dir = tokio::fs::read_dir(path).await?;
    let mut entries = Vec::new();
    while let Some(entry) = dir.next_entry().await? {
        // follow symlinks so linked folders list as folders
        let is_dir = tokio::fs::metadata(entry.path())
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        entries.push(DirEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir,
        });
    }
    Ok(entries)
}

pub fn render_listing(display_path: &str, entries: &[DirEntry]) -> String {
    let mut sorted: Vec<&DirEntry> = entries.iter().collect();
    sorted.sort_by_key(|e| e.name.to_lowercase());

    let title = format!("Directory listing for {}", escape_html(display_path));
    let mut html = String::new();
    html.push_str("<!DOCTYPE HTML>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>{title}</title>\n</head>\n<body>\n"));
    html.push_str(&format!("<h1>{title}</h1>\n<hr>\n<ul>\n"));

    for entry in sorted {
        let suffix = if entry.is_dir { "/" } else { "" };
        html.push_str(&format!(
            "<li><a href=\"{}{suffix}\">{}{suffix}</a></li>\n",
            urlencoding::encode(&entry.name),
            escape_html(&entry.name),
        ));
    }

    html.push_str("</ul>\n<hr>\n</body>\n</html>\n");
    html
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;
    use std::fs;
    use tower::ServiceExt;

    async fn get(root: &Path, uri: &str) -> (StatusCode, String) {
        let response = router(root.to_path_buf())
            .oneshot(HttpRequest::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&body).into_owned())
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let root = Path::new("/srv/share");
        assert_eq!(resolve_path(root, "/../etc/passwd"), None);
        assert_eq!(resolve_path(root, "/docs/%2E%2E/%2E%2E/etc"), None);
        assert_eq!(
            resolve_path(root, "/docs/./a%20b.txt"),
            Some(PathBuf::from("/srv/share/docs/a b.txt"))
        );
        assert_eq!(resolve_path(root, "/"), Some(PathBuf::from("/srv/share")));
    }

    #[test]
    fn test_listing_sorted_and_escaped() {
        let entries = vec![
            DirEntry { name: "b.txt".into(), is_dir: false },
            DirEntry { name: "Alpha".into(), is_dir: true },
            DirEntry { name: "<x> & y".into(), is_dir: false },
        ];
        let html = render_listing("/files/", &entries);

        assert!(html.contains("<title>Directory listing for /files/</title>"));
        assert!(html.contains("<a href=\"Alpha/\">Alpha/</a>"));
        assert!(html.contains("&lt;x&gt; &amp; y"));
        assert!(html.contains("href=\"%3Cx%3E%20%26%20y\""));

        let alpha = html.find("Alpha/").unwrap();
        let b = html.find("b.txt").unwrap();
        assert!(alpha < b);
    }

    #[tokio::test]
    async fn test_directory_without_index_is_listed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        fs::create_dir(dir.path().join("photos")).unwrap();

        let (status, body) = get(dir.path(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Directory listing for /"));
        assert!(body.contains("notes.txt"));
        assert!(body.contains("photos/"));
    }

    #[tokio::test]
    async fn test_index_html_is_served() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), "<p>home</p>").unwrap();

        let (status, body) = get(dir.path(), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "<p>home</p>");
    }

    #[tokio::test]
    async fn test_file_served_and_missing_is_404() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a b.txt"), "contents").unwrap();

        let (status, body) = get(dir.path(), "/a%20b.txt").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "contents");

        let (status, _) = get(dir.path(), "/missing.txt").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_subdirectory_redirects_to_slash() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("photos")).unwrap();

        let response = router(dir.path().to_path_buf())
            .oneshot(HttpRequest::builder().uri("/photos").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.status().is_redirection());
    }

    #[test]
    fn test_taken_port_exits_with_addr_in_use() {
        let dir = tempfile::tempdir().unwrap();
        let holder = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = holder.local_addr().unwrap().port();

        let err = run(ServeOptions {
            root: dir.path().to_path_buf(),
            port,
            bind: IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
        })
        .unwrap_err();

        assert!(matches!(err, ServeError::AddrInUse(addr) if addr.port() == port), "{err}");
        assert_eq!(err.exit_code(), crate::error::EXIT_ADDR_IN_USE);
    }

    #[test]
    fn test_missing_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(ServeOptions {
            root: dir.path().join("gone"),
            port: 8000,
            bind: IpAddr::V4(std::net::Ipv4Addr::LOCALHOST),
        })
        .unwrap_err();
        assert!(matches!(err, ServeError::NotADirectory(_)));
    }

    #[tokio::test]
    async fn test_traversal_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let (status, _) = get(dir.path(), "/../etc/passwd").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
