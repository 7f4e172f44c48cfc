// Main entry point - Dependency injection and server setup
mod domain;
mod application;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc};
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::application::analysis_service::AnalysisService;
use crate::application::circuit_service::CircuitService;
use crate::application::coach::CoachClient;
use crate::application::golden_lap_service::GoldenLapService;
use crate::application::lap_catalog::LapCatalog;
use crate::application::replay_service::ReplayService;
use crate::application::vehicle_service::VehicleService;
use crate::infrastructure::config::{load_app_config, load_circuit_catalog};
use crate::infrastructure::csv_repository::CsvRepository;
use crate::infrastructure::gemini_coach::GeminiCoach;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    clear_cache, compare_lap, get_circuit, golden_lap, health_check, list_circuits, list_laps,
    list_vehicles, prepare_replay, replay_commentary, replay_setup, replay_vehicle_laps, root,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("apex_replay=info,tower_http=info")),
        )
        .init();

    // Load configuration
    let config = load_app_config()?;
    let circuit_catalog = load_circuit_catalog()?;
    let engine = config.analysis.engine_settings();
    info!("Data path: {}", config.data.path.display());

    // Create repository (infrastructure layer)
    let repository = Arc::new(CsvRepository::new(config.data.path.clone()));

    // Create services (application layer)
    let catalog = LapCatalog::new(repository.clone(), config.data.lap_time_window());
    let golden_lap_service = GoldenLapService::new(catalog.clone());
    let vehicle_service = VehicleService::new(catalog.clone());
    let circuit_service = CircuitService::new(repository, circuit_catalog);

    let mut analysis_service = AnalysisService::new(
        catalog.clone(),
        golden_lap_service.clone(),
        engine,
        config.analysis.analysis_cache_limit,
    );
    match config.coach.api_key() {
        Some(api_key) => {
            let coach: Arc<dyn CoachClient> = Arc::new(GeminiCoach::new(
                &config.coach.base_url,
                &config.coach.model,
                api_key,
                config.coach.timeout(),
            )?);
            analysis_service = analysis_service.with_coach(coach, config.coach.timeout());
            info!("AI coach enabled ({})", config.coach.model);
        }
        None => warn!("GEMINI_API_KEY not set, AI coach disabled"),
    }

    let replay_service = ReplayService::new(
        catalog,
        golden_lap_service.clone(),
        vehicle_service.clone(),
        engine.replay_max_points,
    );

    // Create application state
    let state = Arc::new(AppState {
        circuit_service,
        vehicle_service,
        golden_lap_service,
        analysis_service,
        replay_service,
        default_race: config.data.default_race.clone(),
    });

    // Build router (presentation layer)
    // JSON bodies are compressed by the handlers and the replay stream must
    // not be buffered, so there is no CompressionLayer
    let router = Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api/clear-cache", get(clear_cache))
        .route("/api/circuits", get(list_circuits))
        .route("/api/circuits/:circuit", get(get_circuit))
        .route("/api/vehicles/:circuit", get(list_vehicles))
        .route("/api/vehicles/:circuit/:chassis/:car_number/laps", get(list_laps))
        .route("/api/analysis/golden/:circuit", get(golden_lap))
        .route("/api/analysis/compare", post(compare_lap))
        .route("/api/replay/setup/:circuit", get(replay_setup))
        .route("/api/replay/vehicle/:circuit/:chassis/:car", get(replay_vehicle_laps))
        .route("/api/replay/prepare", post(prepare_replay))
        .route("/api/replay/commentary", post(replay_commentary))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Starting apex-replay service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
