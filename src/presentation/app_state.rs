// Application state for HTTP handlers
use crate::application::analysis_service::AnalysisService;
use crate::application::circuit_service::CircuitService;
use crate::application::golden_lap_service::GoldenLapService;
use crate::application::replay_service::ReplayService;
use crate::application::vehicle_service::VehicleService;

#[derive(Clone)]
pub struct AppState {
    pub circuit_service: CircuitService,
    pub vehicle_service: VehicleService,
    pub golden_lap_service: GoldenLapService,
    pub analysis_service: AnalysisService,
    pub replay_service: ReplayService,
    /// Race used when a request does not name one
    pub default_race: String,
}

impl AppState {
    pub fn race(&self, requested: Option<String>) -> String {
        requested
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| self.default_race.clone())
    }
}
