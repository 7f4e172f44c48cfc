// Coaching-text collaborator payload and reply
use super::report::{AnalysisResult, RatingCounts, Recommendation, SectorStat};
use super::session::{RaceResults, WeatherSummary};
use serde::{Deserialize, Serialize};

const PAYLOAD_RECOMMENDATIONS: usize = 5;
const PAYLOAD_WEAK_ZONES: usize = 4;

/// Compact numeric summary handed to the coaching-text service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoachPayload {
    pub lap_time: Option<String>,
    pub golden_time: Option<String>,
    pub time_diff: Option<f64>,
    pub recommendations: Vec<Recommendation>,
    pub consistency: Option<CoachConsistency>,
    pub hot_zones: Vec<SectorStat>,
    pub progression: Vec<String>,
    pub weather: Option<WeatherSummary>,
    pub race_results: Option<RaceResults>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoachConsistency {
    pub score: f64,
    pub average: String,
    pub issues: Vec<u32>,
    pub sector_ratings: RatingCounts,
}

impl CoachPayload {
    pub fn from_result(result: &AnalysisResult) -> Self {
        let session = result.session_context.as_ref();
        Self {
            lap_time: result.driver_lap.formatted.clone(),
            golden_time: result.golden_lap.as_ref().map(|g| g.formatted_time.clone()),
            time_diff: result.time_diff,
            recommendations: result
                .recommendations
                .iter()
                .take(PAYLOAD_RECOMMENDATIONS)
                .cloned()
                .collect(),
            consistency: result.consistency.as_ref().map(|c| CoachConsistency {
                score: c.score,
                average: c.average_formatted.clone(),
                issues: c.outliers.clone(),
                sector_ratings: c.sector_ratings.clone(),
            }),
            hot_zones: result
                .hot_zones
                .as_ref()
                .map(|h| h.weak.iter().take(PAYLOAD_WEAK_ZONES).cloned().collect())
                .unwrap_or_default(),
            progression: result
                .progression
                .as_ref()
                .map(|p| p.insights.clone())
                .unwrap_or_default(),
            weather: session.and_then(|s| s.weather.clone()),
            race_results: session.and_then(|s| s.race_results.clone()),
        }
    }
}

/// Reply of the coaching-text service. Passed through without interpretation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoachReply {
    pub summary: String,
    #[serde(default)]
    pub recommendations: Vec<serde_json::Value>,
    #[serde(default)]
    pub race_brief: Option<String>,
    #[serde(default)]
    pub track_insights: Vec<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::analysis::consistency::{DEFAULT_CONSISTENCY_K, build_report};
    use crate::domain::lap::{LapTime, Vehicle};
    use crate::domain::report::{AnalysisStatus, LapSummary, SectorRating, SectorVariance};
    use crate::domain::session::{SessionContext, WeatherSample, summarize_weather};

    fn result() -> AnalysisResult {
        let summary = LapSummary {
            chassis: "002".to_string(),
            car_number: 2,
            lap: 2,
            lap_time: Some(98.0),
            formatted: Some("1:38.000".to_string()),
        };
        AnalysisResult::empty(AnalysisStatus::Complete, summary)
    }

    #[test]
    fn test_payload_carries_sector_ratings() {
        let laps = vec![
            LapTime {
                vehicle: Vehicle::new("002", 2),
                lap_number: 2,
                lap_time: 98.0,
            },
            LapTime {
                vehicle: Vehicle::new("002", 2),
                lap_number: 3,
                lap_time: 99.0,
            },
        ];
        let sectors = vec![SectorStat {
            sector: 1,
            samples: 2,
            avg_speed: 100.0,
            variance: SectorVariance::Measured {
                variance: 9.0,
                rating: SectorRating::Weak,
            },
        }];
        let mut result = result();
        result.consistency = build_report(&laps, &sectors, DEFAULT_CONSISTENCY_K);

        let payload = CoachPayload::from_result(&result);
        let consistency = payload.consistency.unwrap();
        assert_eq!(consistency.sector_ratings.weak, 1);
        assert_eq!(consistency.sector_ratings.excellent, 0);
        assert_eq!(consistency.average, "1:38.500");
    }

    #[test]
    fn test_payload_carries_session_context() {
        let mut result = result();
        assert!(CoachPayload::from_result(&result).weather.is_none());

        let sample = WeatherSample {
            air_temp: Some(31.0),
            ..WeatherSample::default()
        };
        result.session_context = Some(SessionContext {
            race_results: None,
            weather: summarize_weather(&[sample]),
        });
        let payload = CoachPayload::from_result(&result);
        assert_eq!(payload.weather.unwrap().air_temp.unwrap().max, 31.0);
        assert!(payload.race_results.is_none());

        let json = serde_json::to_value(CoachPayload::from_result(&result)).unwrap();
        assert!(json.get("race_results").is_some());
        assert_eq!(json["weather"]["samples"], 1);
    }
}
