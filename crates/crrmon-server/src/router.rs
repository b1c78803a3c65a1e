use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use crrmon_common::{ProvisioningRequest, ProvisioningResponse, error::Result};
use crrmon_engine::{ControllerSys, MonitorResource};
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::responder::Responder;

#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<ControllerSys>,
    /// `None` keeps responses local to the caller.
    pub responder: Option<Responder>,
    pub resource: Option<MonitorResource>,
}

pub fn invoke_router(state: AppState) -> Router {
    Router::new()
        .route("/invoke", post(invoke))
        .route("/health/live", get(health_live))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn health_live() -> impl IntoResponse {
    StatusCode::OK
}

async fn invoke(
    State(state): State<AppState>,
    Json(request): Json<ProvisioningRequest>,
) -> Json<ProvisioningResponse> {
    let (response, _) = dispatch(&state, &request).await;
    Json(response)
}

/// Runs the request and, when the event names one, delivers the outcome to
/// its response URL. A failed delivery is logged and returned next to the
/// unchanged outcome document.
pub async fn dispatch(
    state: &AppState,
    request: &ProvisioningRequest,
) -> (ProvisioningResponse, Result<()>) {
    let response = state.controller.handle(request, state.resource).await;
    let delivery = match (&state.responder, request.response_url.as_deref()) {
        (Some(responder), Some(url)) => responder.send(url, &response).await,
        _ => Ok(()),
    };
    if let Err(err) = &delivery {
        error!(request_id = %request.request_id, error = %err, "failed to deliver response");
    }
    (response, delivery)
}
