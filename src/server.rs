use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::PageConfig;
use crate::dashboard::{self, CategorySelection};
use crate::error::ShelfError;
use crate::loader::Loader;
use crate::visualization::{self, CHARTS_URL};

#[derive(Clone)]
struct AppState {
    loader: Arc<Loader>,
    page: Arc<PageConfig>,
}

pub fn router(loader: Arc<Loader>, page: PageConfig) -> Router {
    let state = AppState {
        loader,
        page: Arc::new(page),
    };

    Router::new()
        .route("/", get(handle_page))
        .route(CHARTS_URL, post(handle_charts))
        .route("/api/refresh", post(handle_refresh))
        .route("/healthz", get(handle_health))
        .with_state(state)
}

/// Serve until ctrl-c.
pub async fn serve(listener: TcpListener, app: Router) -> Result<(), ShelfError> {
    if let Ok(addr) = listener.local_addr() {
        info!("Dashboard listening on http://{addr}");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutting down");
    }
}

// ── JSON errors ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

struct ApiError(ShelfError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        (
            status,
            Json(ErrorBody {
                error: self.0.kind(),
                message: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

fn status_for(err: &ShelfError) -> StatusCode {
    if err.is_load_failure() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

// --- GET / ---

async fn handle_page(State(state): State<AppState>) -> Response {
    match render_initial_page(&state).await {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!("Page render failed [{}]: {e}", e.kind());
            (status_for(&e), Html(visualization::render_error_page(&state.page, &e))).into_response()
        }
    }
}

async fn render_initial_page(state: &AppState) -> Result<String, ShelfError> {
    let snapshot = state.loader.load().await?;
    let options = dashboard::category_options(&snapshot.dataset)?;
    let charts = dashboard::render(&snapshot, &CategorySelection::all())?;
    let loaded_at = snapshot.loaded_at.format("%Y-%m-%d %H:%M:%S UTC").to_string();
    visualization::render_page(&state.page, &options, &charts, &loaded_at)
}

// --- POST /api/charts ---

async fn handle_charts(
    State(state): State<AppState>,
    Json(selection): Json<CategorySelection>,
) -> Result<Json<dashboard::ChartSet>, ApiError> {
    let snapshot = state.loader.load().await.map_err(|e| {
        error!("Load failed [{}]: {e}", e.kind());
        ApiError(e)
    })?;
    let charts = dashboard::render(&snapshot, &selection).map_err(ApiError)?;
    Ok(Json(charts))
}

// --- POST /api/refresh ---

async fn handle_refresh(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.loader.refresh().await.map_err(|e| {
        error!("Refresh failed [{}]: {e}", e.kind());
        ApiError(e)
    })?;
    Ok(StatusCode::NO_CONTENT)
}

// --- GET /healthz ---

async fn handle_health() -> &'static str {
    "ok"
}
