// Lap catalog - Lap times and normalized laps on top of the repository
use crate::application::lap_repository::LapRepository;
use crate::domain::analysis::normalizer::{normalize, pivot, time_ordered};
use crate::domain::error::AnalysisError;
use crate::domain::lap::{Lap, LapKey, LapTime, Vehicle, lap_times_from_events};
use crate::domain::telemetry::TelemetryPoint;
use std::sync::Arc;
use tracing::debug;

/// Valid lap-time window in seconds. Anything outside is an out-lap, a pit
/// stop or a timing glitch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LapTimeWindow {
    pub min_s: f64,
    pub max_s: f64,
}

impl Default for LapTimeWindow {
    fn default() -> Self {
        Self {
            min_s: 60.0,
            max_s: 200.0,
        }
    }
}

#[derive(Clone)]
pub struct LapCatalog {
    repository: Arc<dyn LapRepository>,
    window: LapTimeWindow,
}

impl LapCatalog {
    pub fn new(repository: Arc<dyn LapRepository>, window: LapTimeWindow) -> Self {
        Self { repository, window }
    }

    pub fn repository(&self) -> &Arc<dyn LapRepository> {
        &self.repository
    }

    /// Valid lap times of every vehicle in a race, ordered by vehicle then lap.
    pub async fn lap_times(&self, circuit: &str, race: &str) -> anyhow::Result<Vec<LapTime>> {
        let events = self.repository.lap_events(circuit, race).await?;
        if events.is_empty() {
            return Err(AnalysisError::NoLapData {
                circuit: circuit.to_string(),
                race: race.to_string(),
            }
            .into());
        }
        Ok(lap_times_from_events(
            &events,
            self.window.min_s,
            self.window.max_s,
        ))
    }

    /// Valid lap times of one vehicle, ordered by lap.
    pub async fn vehicle_lap_times(
        &self,
        circuit: &str,
        race: &str,
        vehicle: &Vehicle,
    ) -> anyhow::Result<Vec<LapTime>> {
        Ok(self
            .lap_times(circuit, race)
            .await?
            .into_iter()
            .filter(|l| &l.vehicle == vehicle)
            .collect())
    }

    /// Normalized telemetry of one lap; empty when nothing usable was logged.
    pub async fn telemetry(
        &self,
        circuit: &str,
        race: &str,
        vehicle: &Vehicle,
        lap: u32,
    ) -> anyhow::Result<Vec<TelemetryPoint>> {
        let samples = self
            .repository
            .lap_samples(circuit, race, vehicle, lap)
            .await?;
        let points = normalize(&pivot(&samples));
        debug!(
            "Lap {} of {}/{}: {} samples -> {} points",
            lap,
            vehicle.chassis,
            vehicle.car_number,
            samples.len(),
            points.len()
        );
        Ok(points)
    }

    /// Telemetry of one lap in logging order, for replay.
    pub async fn replay_telemetry(
        &self,
        circuit: &str,
        race: &str,
        vehicle: &Vehicle,
        lap: u32,
    ) -> anyhow::Result<Vec<TelemetryPoint>> {
        let samples = self
            .repository
            .lap_samples(circuit, race, vehicle, lap)
            .await?;
        Ok(time_ordered(&pivot(&samples)))
    }

    pub async fn load_lap(&self, circuit: &str, race: &str, lap: &LapTime) -> anyhow::Result<Lap> {
        let telemetry = self
            .telemetry(circuit, race, &lap.vehicle, lap.lap_number)
            .await?;
        let key = LapKey::new(circuit, race, lap.vehicle.clone(), lap.lap_number);
        Ok(Lap::new(key, lap.lap_time, telemetry))
    }
}
