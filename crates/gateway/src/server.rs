//! Operational HTTP surface: `/health` and `/qr`.
//!
//! `/qr` renders the current pairing code as an SVG so the session can be
//! bound to a real account by scanning it out of band. It is a 404 whenever
//! the supervisor is not in the pairing state.

use {
    axum::{
        Router,
        extract::State,
        http::{StatusCode, header},
        response::{IntoResponse, Json, Response},
        routing::get,
    },
    papo_transport::SharedConnectionState,
    qrcode::{QrCode, render::svg},
    tower_http::cors::{Any, CorsLayer},
};

#[derive(Clone)]
pub struct AppState {
    pub connection: SharedConnectionState,
}

/// Build the gateway router (shared between production startup and tests).
pub fn build_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/qr", get(qr_handler))
        .layer(cors)
        .with_state(state)
}

async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "connection": state.connection.current().label(),
    }))
}

async fn qr_handler(State(state): State<AppState>) -> Response {
    let Some(qr) = state.connection.qr_code() else {
        return (StatusCode::NOT_FOUND, "no pairing code to scan").into_response();
    };

    match QrCode::new(qr.as_bytes()) {
        Ok(code) => {
            let svg_str = code
                .render::<svg::Color>()
                .min_dimensions(240, 240)
                .quiet_zone(true)
                .build();
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "image/svg+xml")],
                svg_str,
            )
                .into_response()
        },
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
