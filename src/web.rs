use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::{Path as RoutePath, Query, State},
    http::{Request, StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use parking_lot::RwLock;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::signal;
use tower::ServiceExt;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn};

use crate::config::Settings;
use crate::dict::DictionaryReader;
use crate::lookup::FRAME_CONTENT_RESIZE_JS;
use crate::resolve::{self, ResolvedDictionarySet};
use crate::rewrite;

/// First path segment of every static asset mount.
pub const ASSET_ROUTE_PREFIX: &str = "assets";

type SharedState = Arc<AppState>;

/// Server-side view of the settings: one resolved dictionary set per group,
/// behind a lock so reloads swap the whole table at once. Requests observe
/// either the old table or the new one, never a partially rebuilt group.
pub struct AppState {
    port: u16,
    reader: Arc<dyn DictionaryReader>,
    registry: RwLock<HashMap<String, Arc<ResolvedDictionarySet>>>,
}

impl AppState {
    pub fn new(settings: &Settings, reader: Arc<dyn DictionaryReader>) -> Self {
        let state = Self {
            port: settings.port,
            reader,
            registry: RwLock::new(HashMap::new()),
        };
        state.reload(settings);
        state
    }

    /// Rebuilds every group's resolved set into a fresh table and swaps it
    /// in wholesale, so mounts for removed groups disappear with the old
    /// table. A group whose paths fail to resolve keeps its previous set.
    pub fn reload(&self, settings: &Settings) {
        let previous = self.registry.read().clone();
        let mut next = HashMap::with_capacity(settings.groups.len());
        for group in &settings.groups {
            match resolve::resolve(&group.dict_paths) {
                Ok(set) => {
                    next.insert(group.name.clone(), Arc::new(set));
                }
                Err(err) => {
                    warn!(group = %group.name, error = %err, "dictionary path resolution failed");
                    if let Some(old) = previous.get(&group.name) {
                        next.insert(group.name.clone(), Arc::clone(old));
                    }
                }
            }
        }
        *self.registry.write() = next;
    }

    fn group_set(&self, name: &str) -> Option<Arc<ResolvedDictionarySet>> {
        self.registry.read().get(name).cloned()
    }

    fn mount_base(&self) -> String {
        format!("http://127.0.0.1:{}/{}", self.port, ASSET_ROUTE_PREFIX)
    }
}

#[derive(Debug, Error)]
pub enum WebError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Binds the lookup server on loopback and serves until ctrl-c/SIGTERM.
pub async fn serve(settings: Settings, reader: Arc<dyn DictionaryReader>) -> Result<(), WebError> {
    let addr = SocketAddr::from(([127, 0, 0, 1], settings.port));
    let state = Arc::new(AppState::new(&settings, reader));
    let router = build_router(state);
    info!(%addr, groups = settings.groups.len(), "Binding dictionary lookup listener");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Dictionary lookup server exited");
    Ok(())
}

fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/word", get(word))
        .route(
            &format!("/{ASSET_ROUTE_PREFIX}/:name/:idx/*file"),
            get(asset),
        )
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new())
                .on_response(DefaultOnResponse::new()),
        )
        .layer(CorsLayer::permissive())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[derive(Debug, Deserialize)]
struct WordParams {
    word: Option<String>,
    name: Option<String>,
    #[serde(rename = "dictPath")]
    dict_path: Option<String>,
}

async fn word(State(state): State<SharedState>, Query(params): Query<WordParams>) -> Response {
    let (word, name, dict_path) = match require_params(&params) {
        Ok(parts) => parts,
        Err(message) => return (StatusCode::BAD_REQUEST, message).into_response(),
    };
    let Some(set) = state.group_set(name) else {
        return (
            StatusCode::NOT_FOUND,
            format!("No dictionary group named {name:?}"),
        )
            .into_response();
    };
    let dict_path = PathBuf::from(dict_path);
    let Some(folder_idx) = set.folder_index_of(&dict_path) else {
        return (
            StatusCode::NOT_FOUND,
            format!(
                "Dictionary {} is not part of group {name:?}",
                dict_path.display()
            ),
        )
            .into_response();
    };
    match state.reader.lookup(word, &dict_path) {
        Ok(Some(definition)) => {
            let rewritten = rewrite::rewrite(&definition, &state.mount_base(), name, folder_idx);
            Html(definition_document(&rewritten)).into_response()
        }
        Ok(None) => "No such word in this dictionary!".into_response(),
        Err(err) => {
            warn!(dictionary = %dict_path.display(), error = %err, "dictionary lookup failed");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}

fn require_params(params: &WordParams) -> Result<(&str, &str, &str), String> {
    let word =
        non_blank(&params.word).ok_or_else(|| "Missing `word` query parameter".to_string())?;
    let name =
        non_blank(&params.name).ok_or_else(|| "Missing `name` query parameter".to_string())?;
    let dict_path = non_blank(&params.dict_path)
        .ok_or_else(|| "Missing `dictPath` query parameter".to_string())?;
    Ok((word, name, dict_path))
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Wraps a rewritten definition in the envelope the frames load, with the
/// height-reporting script inside the body.
fn definition_document(inner: &str) -> String {
    let script = format!(r#"<script type="text/javascript">{FRAME_CONTENT_RESIZE_JS}</script>"#);
    let body = match inner.rfind("</body>") {
        Some(pos) => {
            let mut out = String::with_capacity(inner.len() + script.len());
            out.push_str(&inner[..pos]);
            out.push_str(&script);
            out.push_str(&inner[pos..]);
            out
        }
        None => format!("{inner}{script}"),
    };
    format!("<!DOCTYPE html><html>{body}</html>")
}

async fn asset(
    State(state): State<SharedState>,
    RoutePath((name, idx, file)): RoutePath<(String, usize, String)>,
) -> Response {
    let Some(set) = state.group_set(&name) else {
        return (StatusCode::NOT_FOUND, "Unknown dictionary group").into_response();
    };
    let Some(folder) = set.folder_paths.get(idx).cloned() else {
        return (StatusCode::NOT_FOUND, "Unknown folder index").into_response();
    };
    serve_file(folder, &file).await
}

/// Hands one request to a `ServeDir` rooted at the folder the registry
/// currently maps. The folder is looked up per request, so a registry swap
/// retires old mounts without touching the route table.
async fn serve_file(folder: PathBuf, file: &str) -> Response {
    let encoded = file
        .split('/')
        .map(|segment| utf8_percent_encode(segment, NON_ALPHANUMERIC).to_string())
        .collect::<Vec<_>>()
        .join("/");
    let uri = match format!("/{encoded}").parse::<Uri>() {
        Ok(uri) => uri,
        Err(_) => return (StatusCode::BAD_REQUEST, "Invalid asset path").into_response(),
    };
    let request = match Request::builder().uri(uri).body(Body::empty()) {
        Ok(request) => request,
        Err(_) => return (StatusCode::BAD_REQUEST, "Invalid asset request").into_response(),
    };
    match ServeDir::new(folder).oneshot(request).await {
        Ok(response) => response.map(Body::new),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}
