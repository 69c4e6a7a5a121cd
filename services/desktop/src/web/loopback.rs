//! services/desktop/src/web/loopback.rs
//!
//! The loopback HTTP server at the provider's redirect URI, and the master
//! definition of its OpenAPI document.

use crate::error::DesktopError;
use crate::web::pages::{relay_page, RelayMode};
use crate::web::state::LoopbackState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::CONTENT_TYPE, HeaderValue, Method, StatusCode},
    response::{Html, IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, error, info, warn};
use utoipa::{OpenApi, ToSchema};

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(root_page_handler, callback_page_handler, handle_auth_code_handler),
    components(schemas(AuthCodeRequest, AuthCodeResponse)),
    tags(
        (name = "MemoWave Login Loopback", description = "Redirect target for the OAuth provider while the desktop app is signing in.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Payload Structs
//=========================================================================================

/// The body posted by the `/callback` page.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AuthCodeRequest {
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AuthCodeResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub error: Option<String>,
}

impl AuthCodeResponse {
    fn failed(error: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: false,
            error: Some(error.into()),
        })
    }
}

//=========================================================================================
// Router and Server
//=========================================================================================

/// Builds the loopback router. Paths other than the three below answer 404;
/// `/handle-auth-code` answers 405 to anything but POST.
pub fn router(state: Arc<LoopbackState>) -> Router {
    let origin = format!("http://localhost:{}", state.port);
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |candidate: &HeaderValue, _| candidate.as_bytes() == origin.as_bytes(),
        ))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE]);

    Router::new()
        .route("/", get(root_page_handler))
        .route("/callback", get(callback_page_handler))
        .route("/handle-auth-code", post(handle_auth_code_handler))
        .fallback(not_found)
        .layer(cors)
        .with_state(state)
}

/// Binds the fixed callback port on both loopback families, since browsers
/// may resolve `localhost` to either. IPv4 is required; `::1` is skipped only
/// when the host has no IPv6 loopback.
pub async fn bind(port: u16) -> Result<Vec<TcpListener>, DesktopError> {
    let v4 = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let mut listeners = vec![TcpListener::bind(v4)
        .await
        .map_err(|source| DesktopError::ListenerBind { addr: v4, source })?];

    let v6 = SocketAddr::from((Ipv6Addr::LOCALHOST, port));
    match TcpListener::bind(v6).await {
        Ok(listener) => listeners.push(listener),
        Err(source) if source.kind() == ErrorKind::AddrInUse => {
            return Err(DesktopError::ListenerBind { addr: v6, source });
        }
        Err(e) => debug!("No IPv6 loopback listener on {}: {}", v6, e),
    }
    Ok(listeners)
}

/// Serves on every listener until `shutdown` fires.
pub async fn serve(
    listeners: Vec<TcpListener>,
    app: Router,
    shutdown: CancellationToken,
) -> Result<(), DesktopError> {
    let mut tasks = Vec::with_capacity(listeners.len());
    for listener in listeners {
        info!("Login callback server listening on {}", listener.local_addr()?);
        let app = app.clone();
        let shutdown = shutdown.clone();
        tasks.push(tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
        }));
    }
    for task in tasks {
        task.await
            .map_err(|e| DesktopError::Internal(format!("callback server task failed: {}", e)))??;
    }
    info!("Login callback server stopped.");
    Ok(())
}

//=========================================================================================
// Handlers
//=========================================================================================

/// Relay page for fragment (implicit flow) redirects.
#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "HTML page relaying the URL fragment into the app", content_type = "text/html"))
)]
pub async fn root_page_handler(State(state): State<Arc<LoopbackState>>) -> Html<String> {
    Html(relay_page(state.scheme(), RelayMode::Fragment))
}

/// Relay page that also posts `?code=` back for exchange.
#[utoipa::path(
    get,
    path = "/callback",
    responses((status = 200, description = "HTML page relaying a code or fragment into the app", content_type = "text/html"))
)]
pub async fn callback_page_handler(State(state): State<Arc<LoopbackState>>) -> Html<String> {
    Html(relay_page(state.scheme(), RelayMode::CodeOrFragment))
}

/// Exchange an authorization code for a session.
///
/// The exchange runs in-process; the app's windows are updated before the
/// response is sent.
#[utoipa::path(
    post,
    path = "/handle-auth-code",
    request_body = AuthCodeRequest,
    responses(
        (status = 200, description = "Logged in", body = AuthCodeResponse),
        (status = 400, description = "Unreadable body or no authorization code", body = AuthCodeResponse),
        (status = 500, description = "The exchange failed", body = AuthCodeResponse)
    )
)]
pub async fn handle_auth_code_handler(
    State(state): State<Arc<LoopbackState>>,
    body: Result<Json<AuthCodeRequest>, JsonRejection>,
) -> Result<Json<AuthCodeResponse>, (StatusCode, Json<AuthCodeResponse>)> {
    let Json(body) = body.map_err(|rejection| {
        warn!("Unreadable authorization code body: {}", rejection.body_text());
        (
            StatusCode::BAD_REQUEST,
            AuthCodeResponse::failed(rejection.body_text()),
        )
    })?;
    let code = body.code.unwrap_or_default();
    if code.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            AuthCodeResponse::failed("no valid authorization code"),
        ));
    }
    info!("Authorization code received ({} chars)", code.len());

    match state.sender.auth_code(code).await {
        Ok(()) => Ok(Json(AuthCodeResponse {
            success: true,
            error: None,
        })),
        Err(failure) => {
            error!("Authorization code exchange failed: {}", failure);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                AuthCodeResponse::failed(failure.to_string()),
            ))
        }
    }
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}
