use crate::application::lap_catalog::LapTimeWindow;
use crate::domain::analysis::EngineSettings;
use crate::domain::analysis::recommendations::IssueRules;
use crate::domain::circuit::CircuitMetadata;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE: &str = "config/apex_replay";
const CIRCUIT_CATALOG_FILE: &str = "config/circuits.toml";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub data: DataSettings,
    pub analysis: AnalysisSettings,
    pub coach: CoachSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataSettings {
    pub path: PathBuf,
    pub default_race: String,
    pub min_lap_time_s: f64,
    pub max_lap_time_s: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnalysisSettings {
    pub resample_step_m: f64,
    pub smoothing_window: usize,
    pub consistency_k: f64,
    pub min_speed_loss_kmh: f64,
    pub max_recommendations: usize,
    pub concentration_tolerance_kmh: f64,
    pub hot_zone_limit: usize,
    pub recent_laps: usize,
    pub ghost_lap_limit: usize,
    pub ghost_sample_size: usize,
    pub analysis_cache_limit: usize,
    pub replay_max_points: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CoachSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl DataSettings {
    pub fn lap_time_window(&self) -> LapTimeWindow {
        LapTimeWindow {
            min_s: self.min_lap_time_s,
            max_s: self.max_lap_time_s,
        }
    }
}

impl AnalysisSettings {
    /// Smoothing is centered, so the window must be odd. 0 and 1 disable it.
    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.smoothing_window <= 1 || self.smoothing_window % 2 == 1,
            "analysis.smoothing_window must be odd, got {}",
            self.smoothing_window
        );
        Ok(())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            resample_step_m: self.resample_step_m,
            smoothing_window: self.smoothing_window,
            consistency_k: self.consistency_k,
            issue_rules: IssueRules {
                min_speed_loss_kmh: self.min_speed_loss_kmh,
                concentration_tolerance_kmh: self.concentration_tolerance_kmh,
                max_recommendations: self.max_recommendations,
            },
            hot_zone_limit: self.hot_zone_limit,
            recent_laps: self.recent_laps,
            ghost_lap_limit: self.ghost_lap_limit,
            ghost_sample_size: self.ghost_sample_size,
            replay_max_points: self.replay_max_points,
        }
    }
}

impl CoachSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// API key if one is set and non-blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

fn builder() -> anyhow::Result<config::ConfigBuilder<config::builder::DefaultState>> {
    let defaults = EngineSettings::default();
    let rules = defaults.issue_rules;

    Ok(config::Config::builder()
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8000)?
        .set_default("data.path", "../data")?
        .set_default("data.default_race", "R1")?
        .set_default("data.min_lap_time_s", 60.0)?
        .set_default("data.max_lap_time_s", 200.0)?
        .set_default("analysis.resample_step_m", defaults.resample_step_m)?
        .set_default("analysis.smoothing_window", defaults.smoothing_window as u64)?
        .set_default("analysis.consistency_k", defaults.consistency_k)?
        .set_default("analysis.min_speed_loss_kmh", rules.min_speed_loss_kmh)?
        .set_default("analysis.max_recommendations", rules.max_recommendations as u64)?
        .set_default(
            "analysis.concentration_tolerance_kmh",
            rules.concentration_tolerance_kmh,
        )?
        .set_default("analysis.hot_zone_limit", defaults.hot_zone_limit as u64)?
        .set_default("analysis.recent_laps", defaults.recent_laps as u64)?
        .set_default("analysis.ghost_lap_limit", defaults.ghost_lap_limit as u64)?
        .set_default("analysis.ghost_sample_size", defaults.ghost_sample_size as u64)?
        .set_default("analysis.analysis_cache_limit", 32)?
        .set_default("analysis.replay_max_points", defaults.replay_max_points as u64)?
        .set_default("coach.model", "gemini-2.5-pro")?
        .set_default("coach.base_url", GEMINI_BASE_URL)?
        .set_default("coach.timeout_secs", 20)?)
}

/// Defaults, then `config/apex_replay.*` if present, then `APEX_*` variables.
pub fn load_app_config() -> anyhow::Result<AppConfig> {
    let settings = builder()?
        .add_source(config::File::with_name(CONFIG_FILE).required(false))
        .add_source(
            config::Environment::with_prefix("APEX")
                .prefix_separator("_")
                .separator("__"),
        )
        .set_override_option("coach.api_key", std::env::var("GEMINI_API_KEY").ok())?
        .set_override_option("coach.model", std::env::var("GEMINI_MODEL").ok())?
        .build()?;

    let config: AppConfig = settings.try_deserialize()?;
    config.analysis.validate()?;
    Ok(config)
}

#[derive(Debug, Deserialize, Default)]
struct CircuitCatalog {
    #[serde(default)]
    circuits: HashMap<String, CircuitMetadata>,
}

/// Static circuit metadata keyed by circuit id. A missing file is an empty catalog.
pub fn load_circuit_catalog() -> anyhow::Result<HashMap<String, CircuitMetadata>> {
    load_circuit_catalog_from(Path::new(CIRCUIT_CATALOG_FILE))
}

pub fn load_circuit_catalog_from(
    path: &Path,
) -> anyhow::Result<HashMap<String, CircuitMetadata>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let content = std::fs::read_to_string(path)?;
    parse_circuit_catalog(&content)
}

fn parse_circuit_catalog(content: &str) -> anyhow::Result<HashMap<String, CircuitMetadata>> {
    let catalog: CircuitCatalog = toml::from_str(content)?;
    Ok(catalog.circuits)
}
