// Analysis result models returned by a compare-lap request
use super::coach::CoachReply;
use super::lap::GoldenLap;
use super::session::SessionContext;
use serde::Serialize;

/// Cross-lap speed stability of a sector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SectorRating {
    Excellent,
    Good,
    Ok,
    Weak,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SectorVariance {
    Measured { variance: f64, rating: SectorRating },
    /// Fewer than two laps had samples in the sector.
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorStat {
    pub sector: i64,
    /// Number of laps contributing a mean speed.
    pub samples: usize,
    pub avg_speed: f64,
    #[serde(flatten)]
    pub variance: SectorVariance,
}

impl SectorStat {
    pub fn measured_variance(&self) -> Option<f64> {
        match self.variance {
            SectorVariance::Measured { variance, .. } => Some(variance),
            SectorVariance::InsufficientData => None,
        }
    }

    pub fn rating(&self) -> Option<SectorRating> {
        match self.variance {
            SectorVariance::Measured { rating, .. } => Some(rating),
            SectorVariance::InsufficientData => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HotZones {
    pub sectors: Vec<SectorStat>,
    pub strong: Vec<SectorStat>,
    pub weak: Vec<SectorStat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConsistencyBand {
    Excellent,
    Balanced,
    Weak,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RatingCounts {
    pub excellent: usize,
    pub good: usize,
    pub ok: usize,
    pub weak: usize,
    pub insufficient_data: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LapBreakdown {
    pub lap: u32,
    pub time: f64,
    pub formatted: String,
    pub delta_to_avg: f64,
    pub status: ConsistencyBand,
    pub icon: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsistencyReport {
    pub average_time: f64,
    pub average_formatted: String,
    pub best_time: f64,
    pub best_formatted: String,
    pub worst_time: f64,
    pub worst_formatted: String,
    pub std_dev: f64,
    pub score: f64,
    pub band: ConsistencyBand,
    pub outliers: Vec<u32>,
    pub laps: Vec<LapBreakdown>,
    pub sector_ratings: RatingCounts,
    pub recommendation: String,
}

/// Where inside a sector the speed deficit is concentrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LossZone {
    Entry,
    Mid,
    Exit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    BrakingTooEarly,
    LowMinimumSpeed,
    SlowExit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub sector: i64,
    /// Sector start, meters.
    pub distance: f64,
    pub zone: LossZone,
    pub category: IssueKind,
    pub issue: String,
    pub suggestion: String,
    /// km/h, golden minus driver.
    pub speed_loss: f64,
    /// Seconds.
    pub estimated_gain: f64,
}

/// Per-sector driver vs golden aggregates on the raw (not resampled) laps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorComparison {
    pub sector: i64,
    pub distance_user: f64,
    pub distance_golden: f64,
    pub speed_user: f64,
    pub speed_golden: f64,
    pub throttle_user: f64,
    pub throttle_golden: f64,
    pub brake_user: f64,
    pub brake_golden: f64,
    pub speed_diff: f64,
    pub throttle_diff: f64,
    pub brake_diff: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressionLap {
    pub lap: u32,
    pub time: f64,
    pub formatted: String,
    pub delta_prev: f64,
    pub improvement_from_start: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progression {
    pub total_improvement: f64,
    pub plateau_lap: Option<u32>,
    pub laps: Vec<ProgressionLap>,
    pub insights: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    pub lap: u32,
    pub lap_time: f64,
    pub formatted: String,
    pub cumulative: f64,
    pub gap_to_golden: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GhostPoint {
    pub distance: f64,
    pub speed: f64,
    pub lon: f64,
    pub lat: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GhostLap {
    pub label: &'static str,
    pub lap: u32,
    pub lap_time: String,
    pub telemetry: Vec<GhostPoint>,
}

/// Channels of one lap sampled on a shared distance grid.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ChannelTrace {
    pub speed: Vec<f64>,
    pub throttle: Vec<f64>,
    pub brake: Vec<f64>,
    pub longitude: Vec<f64>,
    pub latitude: Vec<f64>,
}

impl ChannelTrace {
    pub fn len(&self) -> usize {
        self.speed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.speed.is_empty()
    }
}

/// Driver and golden traces aligned on one distance grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeedTrace {
    pub distance: Vec<f64>,
    pub driver: ChannelTrace,
    pub golden: ChannelTrace,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LapSummary {
    pub chassis: String,
    pub car_number: u32,
    pub lap: u32,
    pub lap_time: Option<f64>,
    pub formatted: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Complete,
    NoTelemetry,
    NoGoldenLap,
    InsufficientOverlap,
}

impl AnalysisStatus {
    pub fn message(&self) -> Option<&'static str> {
        match self {
            AnalysisStatus::Complete => None,
            AnalysisStatus::NoTelemetry => Some("No telemetry recorded for this lap."),
            AnalysisStatus::NoGoldenLap => {
                Some("No lap with telemetry is available as a golden reference.")
            }
            AnalysisStatus::InsufficientOverlap => {
                Some("This lap and the golden lap do not cover a common stretch of track.")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisResult {
    pub status: AnalysisStatus,
    pub message: Option<&'static str>,
    pub driver_lap: LapSummary,
    pub golden_lap: Option<GoldenLap>,
    pub time_diff: Option<f64>,
    pub sectors: Vec<SectorComparison>,
    pub recommendations: Vec<Recommendation>,
    pub consistency: Option<ConsistencyReport>,
    pub progression: Option<Progression>,
    pub hot_zones: Option<HotZones>,
    pub race_timeline: Vec<TimelineEntry>,
    pub ghost_laps: Vec<GhostLap>,
    pub speed_trace: Option<SpeedTrace>,
    pub session_context: Option<SessionContext>,
    pub ai_coach: Option<CoachReply>,
}

impl AnalysisResult {
    /// A result carrying only the lap identity and a data-absent status.
    pub fn empty(status: AnalysisStatus, driver_lap: LapSummary) -> Self {
        Self {
            status,
            message: status.message(),
            driver_lap,
            golden_lap: None,
            time_diff: None,
            sectors: Vec::new(),
            recommendations: Vec::new(),
            consistency: None,
            progression: None,
            hot_zones: None,
            race_timeline: Vec::new(),
            ghost_laps: Vec::new(),
            speed_trace: None,
            session_context: None,
            ai_coach: None,
        }
    }
}
