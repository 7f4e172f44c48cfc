// Telemetry analysis engine: pure functions over normalized laps
pub mod consistency;
pub mod golden;
pub mod normalizer;
pub mod progression;
pub mod recommendations;
pub mod replay;
pub mod resampler;
pub mod sectors;

use recommendations::IssueRules;

pub const DEFAULT_HOT_ZONE_LIMIT: usize = 3;
pub const DEFAULT_RECENT_LAPS: usize = 6;

/// Tunable parameters of the engine. Sector width is fixed, see
/// [`sectors::SECTOR_SIZE_M`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub resample_step_m: f64,
    pub smoothing_window: usize,
    pub consistency_k: f64,
    pub issue_rules: IssueRules,
    pub hot_zone_limit: usize,
    /// How many of a vehicle's latest laps feed the sector variance.
    pub recent_laps: usize,
    pub ghost_lap_limit: usize,
    pub ghost_sample_size: usize,
    pub replay_max_points: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            resample_step_m: resampler::DEFAULT_STEP_M,
            smoothing_window: resampler::DEFAULT_SMOOTHING_WINDOW,
            consistency_k: consistency::DEFAULT_CONSISTENCY_K,
            issue_rules: IssueRules::default(),
            hot_zone_limit: DEFAULT_HOT_ZONE_LIMIT,
            recent_laps: DEFAULT_RECENT_LAPS,
            ghost_lap_limit: progression::DEFAULT_GHOST_LAP_LIMIT,
            ghost_sample_size: progression::DEFAULT_GHOST_SAMPLE_SIZE,
            replay_max_points: replay::DEFAULT_REPLAY_MAX_POINTS,
        }
    }
}
