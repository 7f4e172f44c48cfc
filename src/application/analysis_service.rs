// Analysis service - Use case for comparing a lap against the golden lap
use crate::application::coach::CoachClient;
use crate::application::golden_lap_service::{GoldenLapService, GoldenReference};
use crate::application::lap_catalog::LapCatalog;
use crate::domain::analysis::EngineSettings;
use crate::domain::analysis::consistency::build_report;
use crate::domain::analysis::progression::{
    ghost_candidates, ghost_telemetry, progression, race_timeline,
};
use crate::domain::analysis::recommendations::generate;
use crate::domain::analysis::resampler::{Resampled, resample_pair};
use crate::domain::analysis::sectors::{compare_sectors, hot_zones, sector_variances};
use crate::domain::coach::{CoachPayload, CoachReply};
use crate::domain::error::AnalysisError;
use crate::domain::lap::{LapTime, Vehicle, format_lap_time};
use crate::domain::report::{AnalysisResult, AnalysisStatus, GhostLap, LapSummary, SectorStat};
use crate::domain::session::SessionContext;
use crate::domain::telemetry::TelemetryPoint;
use crate::domain::units::finite;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const DEFAULT_ANALYSIS_CACHE_LIMIT: usize = 32;
pub const DEFAULT_COACH_TIMEOUT: Duration = Duration::from_secs(20);

/// One lap to compare against the golden lap of its race.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompareLap {
    pub circuit: String,
    pub race: String,
    pub vehicle: Vehicle,
    pub lap: u32,
}

#[derive(Clone)]
pub struct AnalysisService {
    catalog: LapCatalog,
    golden: GoldenLapService,
    settings: EngineSettings,
    coach: Option<Arc<dyn CoachClient>>,
    coach_timeout: Duration,
    cache: Arc<Mutex<LruCache<CompareLap, Arc<AnalysisResult>>>>,
}

impl AnalysisService {
    pub fn new(
        catalog: LapCatalog,
        golden: GoldenLapService,
        settings: EngineSettings,
        cache_limit: usize,
    ) -> Self {
        Self {
            catalog,
            golden,
            settings,
            coach: None,
            coach_timeout: DEFAULT_COACH_TIMEOUT,
            cache: Arc::new(Mutex::new(LruCache::new(
                NonZeroUsize::new(cache_limit).unwrap_or(NonZeroUsize::MIN),
            ))),
        }
    }

    pub fn with_coach(mut self, coach: Arc<dyn CoachClient>, timeout: Duration) -> Self {
        self.coach = Some(coach);
        self.coach_timeout = timeout;
        self
    }

    pub async fn compare_lap(&self, request: &CompareLap) -> anyhow::Result<Arc<AnalysisResult>> {
        if let Some(cached) = self.cache.lock().await.get(request).cloned() {
            debug!("Analysis cache hit for lap {}", request.lap);
            return Ok(cached);
        }

        let mut result = self.analyze(request).await?;
        if result.status == AnalysisStatus::Complete {
            result.ai_coach = self.ask_coach(&result).await;
        }

        let result = Arc::new(result);
        self.cache.lock().await.put(request.clone(), result.clone());
        Ok(result)
    }

    /// Drop every cached analysis, golden lap and parsed file
    pub async fn clear_caches(&self) {
        self.cache.lock().await.clear();
        self.golden.invalidate().await;
        self.catalog.repository().clear_cache().await;
        info!("Caches cleared");
    }

    async fn analyze(&self, request: &CompareLap) -> anyhow::Result<AnalysisResult> {
        let CompareLap {
            circuit,
            race,
            vehicle,
            lap,
        } = request;

        let lap_times = self.catalog.lap_times(circuit, race).await?;
        let history: Vec<LapTime> = lap_times
            .iter()
            .filter(|l| &l.vehicle == vehicle)
            .cloned()
            .collect();
        let lap_time = history
            .iter()
            .find(|l| l.lap_number == *lap)
            .map(|l| l.lap_time);
        let summary = LapSummary {
            chassis: vehicle.chassis.clone(),
            car_number: vehicle.car_number,
            lap: *lap,
            lap_time,
            formatted: lap_time.map(format_lap_time),
        };

        let driver = self.catalog.telemetry(circuit, race, vehicle, *lap).await?;
        if driver.is_empty() {
            if lap_time.is_none() {
                return Err(AnalysisError::LapNotFound {
                    chassis: vehicle.chassis.clone(),
                    car_number: vehicle.car_number,
                    lap: *lap,
                }
                .into());
            }
            warn!(
                "Lap {} of {}/{} has no telemetry",
                lap, vehicle.chassis, vehicle.car_number
            );
            return Ok(AnalysisResult::empty(AnalysisStatus::NoTelemetry, summary));
        }

        let Some(GoldenReference { info, lap: golden }) =
            self.golden.golden_lap(circuit, race).await?
        else {
            return Ok(AnalysisResult::empty(AnalysisStatus::NoGoldenLap, summary));
        };

        let time_diff = lap_time.and_then(|t| finite(t - info.time));
        let pair = match resample_pair(&driver, &golden.telemetry, self.settings.resample_step_m) {
            Resampled::Paired(pair) => pair,
            Resampled::InsufficientOverlap => {
                let mut result =
                    AnalysisResult::empty(AnalysisStatus::InsufficientOverlap, summary);
                result.golden_lap = Some(info);
                result.time_diff = time_diff;
                return Ok(result);
            }
        };

        info!(
            "Comparing lap {} of {}/{} against golden lap {} of car {}",
            lap, vehicle.chassis, vehicle.car_number, info.lap, info.car_number
        );

        let sector_stats = self.recent_sector_stats(request, &history).await;
        let golden_history: Vec<LapTime> = lap_times
            .iter()
            .filter(|l| l.vehicle == info.vehicle())
            .cloned()
            .collect();

        Ok(AnalysisResult {
            status: AnalysisStatus::Complete,
            message: None,
            driver_lap: summary,
            time_diff,
            sectors: compare_sectors(&driver, &golden.telemetry),
            recommendations: generate(&pair, &self.settings.issue_rules),
            consistency: build_report(&history, &sector_stats, self.settings.consistency_k),
            progression: progression(&history),
            hot_zones: (!sector_stats.is_empty())
                .then(|| hot_zones(sector_stats, self.settings.hot_zone_limit)),
            race_timeline: race_timeline(&history, &golden_history),
            ghost_laps: self.ghost_laps(request, &history).await,
            speed_trace: Some(pair.smoothed(self.settings.smoothing_window)),
            session_context: self.session_context(circuit, race).await,
            golden_lap: Some(info),
            ai_coach: None,
        })
    }

    /// Telemetry of another lap of the same vehicle. A lap that cannot
    /// be read is left out of the history.
    async fn history_lap(&self, request: &CompareLap, lap: u32) -> Option<Vec<TelemetryPoint>> {
        let CompareLap {
            circuit,
            race,
            vehicle,
            ..
        } = request;
        match self.catalog.telemetry(circuit, race, vehicle, lap).await {
            Ok(points) if !points.is_empty() => Some(points),
            Ok(_) => None,
            Err(e) => {
                warn!(
                    "Skipping lap {} of {}/{}: {:#}",
                    lap, vehicle.chassis, vehicle.car_number, e
                );
                None
            }
        }
    }

    /// Sector stability over the vehicle's most recent laps.
    async fn recent_sector_stats(
        &self,
        request: &CompareLap,
        history: &[LapTime],
    ) -> Vec<SectorStat> {
        let start = history.len().saturating_sub(self.settings.recent_laps);
        let mut laps: Vec<Vec<TelemetryPoint>> = Vec::new();
        for lap in &history[start..] {
            if let Some(points) = self.history_lap(request, lap.lap_number).await {
                laps.push(points);
            }
        }
        let views: Vec<&[TelemetryPoint]> = laps.iter().map(Vec::as_slice).collect();
        sector_variances(&views)
    }

    async fn ghost_laps(&self, request: &CompareLap, history: &[LapTime]) -> Vec<GhostLap> {
        let mut ghosts = Vec::new();
        for candidate in ghost_candidates(history, request.lap) {
            if ghosts.len() >= self.settings.ghost_lap_limit {
                break;
            }
            let Some(points) = self.history_lap(request, candidate.lap.lap_number).await else {
                continue;
            };
            ghosts.push(GhostLap {
                label: candidate.label,
                lap: candidate.lap.lap_number,
                lap_time: candidate.lap.formatted(),
                telemetry: ghost_telemetry(&points, self.settings.ghost_sample_size),
            });
        }
        ghosts
    }

    async fn session_context(&self, circuit: &str, race: &str) -> Option<SessionContext> {
        match self.catalog.repository().session_context(circuit, race).await {
            Ok(context) => Some(context),
            Err(e) => {
                warn!("No session context for {} {}: {:#}", circuit, race, e);
                None
            }
        }
    }

    /// Ask the coach once the numbers are final. A slow or failing coach
    /// only costs the text, never the analysis.
    async fn ask_coach(&self, result: &AnalysisResult) -> Option<CoachReply> {
        let coach = self.coach.as_ref()?;
        let payload = CoachPayload::from_result(result);
        match tokio::time::timeout(self.coach_timeout, coach.coach(&payload)).await {
            Ok(Ok(reply)) => Some(reply),
            Ok(Err(e)) => {
                warn!("Coach request failed: {:#}", e);
                None
            }
            Err(_) => {
                warn!("Coach request timed out after {:?}", self.coach_timeout);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::lap_catalog::LapTimeWindow;
    use crate::application::testing::{CIRCUIT, FakeCoach, FakeRepository, RACE};
    use crate::domain::report::{IssueKind, LossZone};
    use crate::domain::session::{WeatherSample, summarize_weather};
    use approx::assert_relative_eq;
    use std::sync::atomic::Ordering;

    fn flat(_: f64) -> f64 {
        100.0
    }

    fn slow_second_sector(d: f64) -> f64 {
        if (200.0..400.0).contains(&d) { 95.0 } else { 100.0 }
    }

    fn driver() -> Vehicle {
        Vehicle::new("002", 2)
    }

    fn golden_car() -> Vehicle {
        Vehicle::new("004", 7)
    }

    fn race() -> Arc<FakeRepository> {
        Arc::new(
            FakeRepository::new()
                .lap(&golden_car(), 95.0, flat)
                .lap(&driver(), 98.0, slow_second_sector)
                .lap(&driver(), 99.0, flat)
                .lap_without_telemetry(&driver(), 101.0),
        )
    }

    fn service(repository: Arc<FakeRepository>) -> AnalysisService {
        let catalog = LapCatalog::new(repository, LapTimeWindow::default());
        let golden = GoldenLapService::new(catalog.clone());
        AnalysisService::new(
            catalog,
            golden,
            EngineSettings::default(),
            DEFAULT_ANALYSIS_CACHE_LIMIT,
        )
    }

    fn request(lap: u32) -> CompareLap {
        CompareLap {
            circuit: CIRCUIT.to_string(),
            race: RACE.to_string(),
            vehicle: driver(),
            lap,
        }
    }

    #[tokio::test]
    async fn test_compare_flags_slow_sector() {
        let result = service(race()).compare_lap(&request(2)).await.unwrap();

        assert_eq!(result.status, AnalysisStatus::Complete);
        let golden = result.golden_lap.as_ref().unwrap();
        assert_eq!((golden.car_number, golden.lap), (7, 2));
        assert_relative_eq!(result.time_diff.unwrap(), 3.0, epsilon = 1e-6);

        assert_eq!(result.recommendations.len(), 1);
        let rec = &result.recommendations[0];
        assert_eq!(rec.sector, 1);
        assert_relative_eq!(rec.speed_loss, 5.0, epsilon = 1e-9);
        assert_relative_eq!(
            rec.estimated_gain,
            200.0 * 3.6 * (1.0 / 95.0 - 1.0 / 100.0),
            epsilon = 1e-9
        );
        assert_eq!(rec.zone, LossZone::Mid);
        assert_eq!(rec.category, IssueKind::LowMinimumSpeed);

        let trace = result.speed_trace.as_ref().unwrap();
        assert_eq!(trace.driver.len(), trace.golden.len());
        assert_eq!(trace.distance.len(), 101);
        assert_eq!(result.sectors.len(), 6);
        assert!(result.ai_coach.is_none());
    }

    #[tokio::test]
    async fn test_compare_builds_vehicle_history() {
        let result = service(race()).compare_lap(&request(3)).await.unwrap();

        let consistency = result.consistency.as_ref().unwrap();
        assert_eq!(consistency.laps.len(), 3);
        assert_eq!(consistency.best_formatted, "1:38.000");

        let zones = result.hot_zones.as_ref().unwrap();
        let sector1 = zones.sectors.iter().find(|s| s.sector == 1).unwrap();
        assert_eq!(sector1.samples, 2);
        assert_relative_eq!(sector1.measured_variance().unwrap(), 6.25, epsilon = 1e-9);

        let progression = result.progression.as_ref().unwrap();
        assert_eq!(progression.laps.len(), 3);

        assert_eq!(result.race_timeline.len(), 3);
        assert_relative_eq!(result.race_timeline[0].gap_to_golden.unwrap(), 3.0, epsilon = 1e-6);
        assert_eq!(result.race_timeline[1].gap_to_golden, None);

        // Lap 4 is slowest and most recent but has no telemetry
        let ghosts: Vec<(&str, u32)> =
            result.ghost_laps.iter().map(|g| (g.label, g.lap)).collect();
        assert_eq!(ghosts, vec![("Best Lap", 2)]);
        assert_eq!(result.ghost_laps[0].telemetry.len(), 101);
    }

    #[tokio::test]
    async fn test_lap_without_telemetry_is_not_an_error() {
        let result = service(race()).compare_lap(&request(4)).await.unwrap();
        assert_eq!(result.status, AnalysisStatus::NoTelemetry);
        assert!(result.message.is_some());
        assert_eq!(result.driver_lap.formatted.as_deref(), Some("1:41.000"));
        assert!(result.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_golden_lap_compared_with_itself() {
        let repository = Arc::new(
            FakeRepository::new()
                .lap_without_telemetry(&golden_car(), 95.0)
                .lap(&driver(), 98.0, flat),
        );
        let result = service(repository).compare_lap(&request(2)).await.unwrap();
        assert_eq!(result.status, AnalysisStatus::Complete);
        assert_eq!(result.time_diff, Some(0.0));
        assert!(result.recommendations.is_empty());
    }

    #[tokio::test]
    async fn test_no_golden_lap_is_not_an_error() {
        // The driver's lap is an out-lap, so it cannot be golden itself
        let repository = Arc::new(
            FakeRepository::new()
                .lap_without_telemetry(&golden_car(), 95.0)
                .lap(&driver(), 250.0, flat),
        );
        let result = service(repository).compare_lap(&request(2)).await.unwrap();
        assert_eq!(result.status, AnalysisStatus::NoGoldenLap);
        assert_eq!(result.driver_lap.lap_time, None);
        assert!(result.golden_lap.is_none());
    }

    #[tokio::test]
    async fn test_unknown_lap_is_an_error() {
        let err = service(race()).compare_lap(&request(42)).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::LapNotFound { lap: 42, .. })
        ));
    }

    #[tokio::test]
    async fn test_results_are_cached_until_cleared() {
        let repository = race();
        let service = service(repository.clone());

        let first = service.compare_lap(&request(2)).await.unwrap();
        let reads = repository.sample_reads.load(Ordering::SeqCst);
        let second = service.compare_lap(&request(2)).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(repository.sample_reads.load(Ordering::SeqCst), reads);

        service.clear_caches().await;
        assert_eq!(repository.clears.load(Ordering::SeqCst), 1);
        let third = service.compare_lap(&request(2)).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(*first, *third);
    }

    #[tokio::test]
    async fn test_least_recent_analysis_is_evicted() {
        let repository = race();
        let catalog = LapCatalog::new(repository, LapTimeWindow::default());
        let golden = GoldenLapService::new(catalog.clone());
        let service = AnalysisService::new(catalog, golden, EngineSettings::default(), 1);

        let first = service.compare_lap(&request(2)).await.unwrap();
        let again = service.compare_lap(&request(2)).await.unwrap();
        assert!(Arc::ptr_eq(&first, &again));

        service.compare_lap(&request(3)).await.unwrap();
        let evicted = service.compare_lap(&request(2)).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &evicted));
    }

    #[tokio::test]
    async fn test_unreadable_history_lap_is_skipped() {
        let repository = Arc::new(
            FakeRepository::new()
                .lap(&golden_car(), 95.0, flat)
                .lap(&driver(), 98.0, slow_second_sector)
                .lap(&driver(), 99.0, flat)
                .lap(&driver(), 100.0, flat)
                .unreadable_lap(&driver(), 3),
        );
        let service = service(repository);

        let result = service.compare_lap(&request(4)).await.unwrap();
        assert_eq!(result.status, AnalysisStatus::Complete);
        assert_eq!(result.consistency.as_ref().unwrap().laps.len(), 3);
        let sector1 = result
            .hot_zones
            .as_ref()
            .unwrap()
            .sectors
            .iter()
            .find(|s| s.sector == 1)
            .unwrap();
        assert_eq!(sector1.samples, 2);
        assert!(result.ghost_laps.iter().all(|g| g.lap != 3));

        // The requested lap itself must be readable
        assert!(service.compare_lap(&request(3)).await.is_err());
    }

    #[tokio::test]
    async fn test_session_context_reaches_result_and_coach() {
        let sample = WeatherSample {
            air_temp: Some(29.0),
            rain: Some(0.2),
            ..WeatherSample::default()
        };
        let session = SessionContext {
            race_results: None,
            weather: summarize_weather(&[sample]),
        };
        let repository = Arc::new(
            FakeRepository::new()
                .lap(&golden_car(), 95.0, flat)
                .lap(&driver(), 98.0, slow_second_sector)
                .session(session.clone()),
        );
        let coach = Arc::new(FakeCoach::answering());
        let service = service(repository).with_coach(coach.clone(), Duration::from_secs(1));

        let result = service.compare_lap(&request(2)).await.unwrap();
        assert_eq!(result.session_context.as_ref(), Some(&session));
        let payloads = coach.payloads.lock().unwrap();
        assert!(payloads[0].weather.as_ref().unwrap().rain);
    }

    #[tokio::test]
    async fn test_coach_reply_is_merged() {
        let coach = Arc::new(FakeCoach::answering());
        let service = service(race()).with_coach(coach.clone(), Duration::from_secs(1));

        let result = service.compare_lap(&request(2)).await.unwrap();
        assert_eq!(result.ai_coach.as_ref().unwrap().summary, "Brake later into turn 5");
        let payloads = coach.payloads.lock().unwrap();
        assert_eq!(payloads[0].recommendations.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_or_slow_coach_keeps_numeric_result() {
        let service_failing =
            service(race()).with_coach(Arc::new(FakeCoach::failing()), Duration::from_secs(1));
        let result = service_failing.compare_lap(&request(2)).await.unwrap();
        assert_eq!(result.status, AnalysisStatus::Complete);
        assert!(result.ai_coach.is_none());

        let service_slow = service(race()).with_coach(
            Arc::new(FakeCoach::slow(Duration::from_secs(5))),
            Duration::from_millis(20),
        );
        let result = service_slow.compare_lap(&request(2)).await.unwrap();
        assert_eq!(result.recommendations.len(), 1);
        assert!(result.ai_coach.is_none());
    }

    #[tokio::test]
    async fn test_coach_not_called_without_data() {
        let coach = Arc::new(FakeCoach::answering());
        let service = service(race()).with_coach(coach.clone(), Duration::from_secs(1));
        service.compare_lap(&request(4)).await.unwrap();
        assert!(coach.payloads.lock().unwrap().is_empty());
    }
}
