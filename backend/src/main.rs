use std::sync::Arc;

use axum::http::header::{self, HeaderName};
use axum::http::{HeaderValue, Method};
use axum::routing::{get, post};
use axum::Router;
use reqwest::Client;
use shared::constants::{ENV_CHECK_ENDPOINT, HEALTH_CHECK_ENDPOINT, PRIZES_ENDPOINT, SAVE_EMAIL_ENDPOINT, SPIN_ENDPOINT};
use shared::prize_table::PrizeTable;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::games::backend_wheel_game::{create_router as create_wheel_game_router, WheelGameState, CLEANUP_INTERVAL};
use crate::services::conversions_service::MetaConversionsSink;
use crate::services::sheets_service::GoogleSheetsSink;
use crate::services::sinks::{NoopConversionSink, Sinks, UnconfiguredLeadSink};

mod config;
mod error;
mod games;
mod handlers;
mod logging;
mod request_context;
mod services;

const CONTENT_SECURITY_POLICY: &str = "script-src 'self' 'unsafe-eval' https://connect.facebook.net https://www.googletagmanager.com; \
connect-src 'self' https://www.google-analytics.com https://www.googletagmanager.com https://www.facebook.com https://graph.facebook.com https://region1.google-analytics.com";

#[derive(Clone)]
pub struct AppState {
    pub prize_table: Arc<PrizeTable>,
    pub sinks: Sinks,
}

fn build_sinks(config: &AppConfig) -> Sinks {
    let client = Client::new();

    let lead: Arc<dyn services::sinks::LeadSink> = match &config.sheets {
        Some(sheets) => Arc::new(GoogleSheetsSink::new(client.clone(), sheets.clone())),
        None => Arc::new(UnconfiguredLeadSink),
    };
    let conversion: Arc<dyn services::sinks::ConversionSink> = match &config.meta {
        Some(meta) => Arc::new(MetaConversionsSink::new(client, meta.clone())),
        None => Arc::new(NoopConversionSink),
    };

    Sinks { lead, conversion }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid origin in ALLOWED_ORIGINS: {}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(vec![Method::GET, Method::POST, Method::OPTIONS, Method::DELETE])
        .allow_headers(vec![
            HeaderName::from_static("content-type"),
            HeaderName::from_static("x-requested-with"),
        ])
        .allow_credentials(true)
}

pub fn build_router(state: AppState, wheel_state: Arc<WheelGameState>, allowed_origins: &[String]) -> Router {
    Router::new()
        .route(SAVE_EMAIL_ENDPOINT, post(handlers::save_email))
        .route(PRIZES_ENDPOINT, get(handlers::list_prizes))
        .route(ENV_CHECK_ENDPOINT, get(handlers::env_check))
        .route(HEALTH_CHECK_ENDPOINT, get(handlers::health_check))
        .with_state(state)
        .nest(SPIN_ENDPOINT, create_wheel_game_router().with_state(wheel_state))
        .layer(cors_layer(allowed_origins))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CONTENT_SECURITY_POLICY),
        ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::setup();
    dotenvy::from_path(".env").ok();

    let config = AppConfig::from_env()?;
    let sinks = build_sinks(&config);
    let prize_table = Arc::new(config.prize_table.clone());

    let wheel_state = Arc::new(WheelGameState::new(prize_table.clone(), config.spin, sinks.clone()));
    let state = AppState { prize_table, sinks };

    // Sweep sessions nobody finished
    let sweeper_state = wheel_state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = sweeper_state.cleanup_expired_sessions().await;
            if removed > 0 {
                info!("Removed {} expired spin sessions", removed);
            } else {
                debug!("No expired spin sessions");
            }
        }
    });

    let app = build_router(state, wheel_state, &config.allowed_origins);

    info!("listening on {}", config.bind_addr);
    let listener = TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
