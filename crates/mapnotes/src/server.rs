//! HTTP front for the request handler.
//!
//! `GET /` serves the listing (optionally as JSONP), `POST /` takes a write
//! request in any content type. Envelopes always go out with status 200.

use std::sync::{Arc, Mutex, MutexGuard};

use axum::{
    body::{to_bytes, Body},
    extract::{Query, State},
    http::{header, HeaderValue, Method},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::handler::{handle_list, handle_write, reject, Reply};
use crate::store::RecordStore;

/// Largest write body read before the request is refused.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// A record store that can move between request tasks.
pub type DynStore = Box<dyn RecordStore + Send>;

/// Shared state for the HTTP handlers.
///
/// The store sits behind a mutex because a SQLite connection cannot be
/// shared across threads. Each request holds the lock for its whole
/// read-scan-write sequence.
pub struct AppState {
    store: Mutex<DynStore>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    /// Wrap a store for sharing across requests.
    pub fn new(store: impl RecordStore + Send + 'static) -> Self {
        Self {
            store: Mutex::new(Box::new(store)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DynStore> {
        self.store.lock().unwrap_or_else(|poisoned| {
            warn!("Store lock poisoned by an earlier panic, continuing");
            poisoned.into_inner()
        })
    }
}

/// Build the application router.
pub fn router(state: Arc<AppState>, config: &ServerConfig) -> Router {
    Router::new()
        .route("/", get(list).post(write))
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Permissive CORS unless origins are configured.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if origins.is_empty() {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(AllowOrigin::list(allowed))
}

/// Bind to the configured address and serve until interrupted.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn serve(state: Arc<AppState>, config: &ServerConfig) -> Result<()> {
    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(state, config))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
}

async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    // Repeated parameters resolve to the first value.
    let callback = params
        .iter()
        .find(|(key, _)| key == "callback")
        .map(|(_, value)| value.as_str());
    let store = state.lock();
    respond(handle_list(&**store, callback))
}

async fn write(State(state): State<Arc<AppState>>, body: Body) -> Response {
    let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(err) => {
            return respond(reject(&Error::invalid_request(format!(
                "failed to read request body (limit {MAX_BODY_BYTES} bytes): {err}"
            ))))
        }
    };
    let mut store = state.lock();
    respond(handle_write(&mut **store, &bytes))
}

fn respond(reply: Reply) -> Response {
    ([(header::CONTENT_TYPE, reply.content_type.mime())], reply.body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::MemoryGrid;
    use crate::store::SheetStore;
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    fn test_router() -> Router {
        let state = Arc::new(AppState::new(SheetStore::new(MemoryGrid::new())));
        router(state, &ServerConfig::default())
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, String, String) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, content_type, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_request(body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/")
            .header(header::CONTENT_TYPE, "text/plain;charset=utf-8")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_listing() {
        let app = test_router();

        let (status, content_type, body) = send(&app, get_request("/")).await;

        assert_eq!(status, StatusCode::OK);
        assert!(content_type.starts_with("application/json"));
        assert_eq!(body, r#"{"success":true,"data":[]}"#);
    }

    #[tokio::test]
    async fn test_jsonp_listing() {
        let app = test_router();

        let (status, content_type, body) = send(&app, get_request("/?callback=cb")).await;

        assert_eq!(status, StatusCode::OK);
        assert!(content_type.starts_with("application/javascript"));
        assert_eq!(body, r#"cb({"success":true,"data":[]})"#);
    }

    #[tokio::test]
    async fn test_invalid_callback_is_plain_json() {
        let app = test_router();

        let (status, content_type, body) =
            send(&app, get_request("/?callback=alert(1)%3Bx")).await;

        assert_eq!(status, StatusCode::OK);
        assert!(content_type.starts_with("application/json"));
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["success"], false);
    }

    #[tokio::test]
    async fn test_create_then_list() {
        let app = test_router();

        let (status, _, body) = send(
            &app,
            post_request(r#"{"shopName":"A咖啡","lat":"25.03","lng":"121.56","rating":"5"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let created: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(created["success"], true);
        assert_eq!(created["message"], "資料已成功寫入");
        let id = created["id"].as_str().unwrap().to_string();

        let (_, _, body) = send(&app, get_request("/")).await;
        let listed: Value = serde_json::from_str(&body).unwrap();
        let data = listed["data"].as_array().unwrap();
        assert_eq!(data.len(), 1);
        assert_eq!(data[0]["id"], id.as_str());
        assert_eq!(data[0]["shopName"], "A咖啡");
        assert_eq!(data[0]["rating"], "5");
        assert!(!data[0]["timestamp"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_and_delete_over_http() {
        let app = test_router();

        let (_, _, body) = send(&app, post_request(r#"{"shopName":"A"}"#)).await;
        let created: Value = serde_json::from_str(&body).unwrap();
        let id = created["id"].as_str().unwrap().to_string();

        let update = format!(r#"{{"_action":"update","id":"{id}","shopName":"B"}}"#);
        let (_, _, body) = send(&app, post_request(&update)).await;
        assert_eq!(body, r#"{"success":true,"message":"資料已更新"}"#);

        let delete = format!(r#"{{"_action":"delete","id":"{id}"}}"#);
        let (_, _, body) = send(&app, post_request(&delete)).await;
        assert_eq!(body, r#"{"success":true,"message":"資料已刪除"}"#);

        let (_, _, body) = send(&app, get_request("/")).await;
        assert_eq!(body, r#"{"success":true,"data":[]}"#);
    }

    #[tokio::test]
    async fn test_failures_keep_status_ok() {
        let app = test_router();

        let (status, _, body) = send(&app, post_request(r#"{"_action":"delete"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"success":false,"message":"缺少 ID"}"#);

        let (status, _, body) = send(&app, post_request("not json")).await;
        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["success"], false);
    }

    #[tokio::test]
    async fn test_non_utf8_body_is_an_envelope() {
        let app = test_router();
        let request = Request::builder()
            .method(Method::POST)
            .uri("/")
            .body(Body::from(vec![b'{', 0xff, b'}']))
            .unwrap();

        let (status, content_type, body) = send(&app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert!(content_type.starts_with("application/json"));
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["success"], false);
        assert!(value["message"].as_str().unwrap().contains("UTF-8"));
    }

    #[tokio::test]
    async fn test_oversized_body_is_an_envelope() {
        let app = test_router();
        let padding = "x".repeat(MAX_BODY_BYTES);
        let (status, _, body) =
            send(&app, post_request(&format!(r#"{{"experience":"{padding}"}}"#))).await;

        assert_eq!(status, StatusCode::OK);
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["success"], false);

        let (_, _, body) = send(&app, get_request("/")).await;
        assert_eq!(body, r#"{"success":true,"data":[]}"#);
    }

    #[tokio::test]
    async fn test_repeated_callback_uses_first() {
        let app = test_router();

        let (status, content_type, body) =
            send(&app, get_request("/?callback=first&callback=second")).await;

        assert_eq!(status, StatusCode::OK);
        assert!(content_type.starts_with("application/javascript"));
        assert_eq!(body, r#"first({"success":true,"data":[]})"#);
    }

    #[tokio::test]
    async fn test_malformed_query_is_an_envelope() {
        let app = test_router();

        let (status, content_type, body) = send(&app, get_request("/?callback=%ff&x")).await;

        assert_eq!(status, StatusCode::OK);
        assert!(content_type.starts_with("application/json"));
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["success"], false);
    }

    #[tokio::test]
    async fn test_permissive_cors_by_default() {
        let app = test_router();
        let request = Request::builder()
            .uri("/")
            .header(header::ORIGIN, "https://maps.example.org")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();

        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN),
            Some(&HeaderValue::from_static("*"))
        );
    }

    #[tokio::test]
    async fn test_configured_cors_origins() {
        let config = ServerConfig {
            cors_origins: vec!["https://maps.example.org".to_string()],
            ..ServerConfig::default()
        };
        let state = Arc::new(AppState::new(SheetStore::new(MemoryGrid::new())));
        let app = router(state, &config);

        let allowed = Request::builder()
            .uri("/")
            .header(header::ORIGIN, "https://maps.example.org")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(allowed).await.unwrap();
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN),
            Some(&HeaderValue::from_static("https://maps.example.org"))
        );

        let other = Request::builder()
            .uri("/")
            .header(header::ORIGIN, "https://elsewhere.example.org")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(other).await.unwrap();
        assert!(response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .is_none());
    }
}
