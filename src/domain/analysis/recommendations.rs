// Coaching recommendations from per-sector speed loss against the golden lap
use super::resampler::ResampledPair;
use super::sectors::{mean, sector_bounds, sector_of};
use crate::domain::report::{IssueKind, LossZone, Recommendation};
use crate::domain::units::time_gain_s;

pub const DEFAULT_MIN_SPEED_LOSS_KMH: f64 = 1.0;
pub const DEFAULT_CONCENTRATION_TOLERANCE_KMH: f64 = 0.5;
pub const DEFAULT_MAX_RECOMMENDATIONS: usize = 5;

/// Extra brake (driver minus golden) that reads as over-braking on entry.
const HEAVY_BRAKE_DIFF: f64 = 20.0;
/// Missing throttle (driver minus golden, %) that reads as a hesitant exit.
const HESITANT_THROTTLE_DIFF: f64 = -10.0;

/// Tuning for which sectors are flagged and how the issue is classified.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IssueRules {
    /// Sectors losing less than this (km/h) are not flagged.
    pub min_speed_loss_kmh: f64,
    /// When entry/mid/exit losses differ by less than this, the loss is
    /// treated as spread over the whole corner.
    pub concentration_tolerance_kmh: f64,
    pub max_recommendations: usize,
}

impl Default for IssueRules {
    fn default() -> Self {
        Self {
            min_speed_loss_kmh: DEFAULT_MIN_SPEED_LOSS_KMH,
            concentration_tolerance_kmh: DEFAULT_CONCENTRATION_TOLERANCE_KMH,
            max_recommendations: DEFAULT_MAX_RECOMMENDATIONS,
        }
    }
}

/// Pedal differences inside the zone where the loss is concentrated.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PedalContext {
    brake_diff: f64,
    throttle_diff: f64,
}

/// Locate the loss inside a sector: entry, mid or exit third.
pub fn loss_zone(losses: &[f64], tolerance: f64) -> LossZone {
    if losses.len() < 3 {
        return LossZone::Mid;
    }

    let thirds = third_ranges(losses.len());
    let zone_losses: Vec<f64> = thirds
        .iter()
        .map(|r| mean(&losses[r.clone()]).unwrap_or(0.0))
        .collect();

    let max = zone_losses.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let min = zone_losses.iter().copied().fold(f64::INFINITY, f64::min);
    if max - min < tolerance {
        return LossZone::Mid;
    }

    const ZONES: [LossZone; 3] = [LossZone::Entry, LossZone::Mid, LossZone::Exit];
    zone_losses
        .iter()
        .position(|l| *l == max)
        .map(|i| ZONES[i])
        .unwrap_or(LossZone::Mid)
}

fn third_ranges(len: usize) -> [std::ops::Range<usize>; 3] {
    let a = len / 3;
    let b = 2 * len / 3;
    [0..a, a..b, b..len]
}

fn zone_range(zone: LossZone, len: usize) -> std::ops::Range<usize> {
    if len < 3 {
        return 0..len;
    }
    let [entry, mid, exit] = third_ranges(len);
    match zone {
        LossZone::Entry => entry,
        LossZone::Mid => mid,
        LossZone::Exit => exit,
    }
}

fn describe(zone: LossZone, speed_loss: f64, pedals: PedalContext) -> (IssueKind, String, String) {
    match zone {
        LossZone::Entry => {
            if pedals.brake_diff > HEAVY_BRAKE_DIFF {
                (
                    IssueKind::BrakingTooEarly,
                    "Braking too aggressively".to_string(),
                    format!(
                        "Bleed off ~{:.0} bar of brake pressure and brake later into the turn",
                        pedals.brake_diff
                    ),
                )
            } else {
                (
                    IssueKind::BrakingTooEarly,
                    "Braking too early".to_string(),
                    format!(
                        "Move the braking point later and carry ~{:.0} km/h more to turn-in",
                        speed_loss
                    ),
                )
            }
        }
        LossZone::Mid => (
            IssueKind::LowMinimumSpeed,
            "Suboptimal corner speed".to_string(),
            "Tighten the line and release the brake earlier to carry more speed".to_string(),
        ),
        LossZone::Exit => {
            if pedals.throttle_diff < HESITANT_THROTTLE_DIFF {
                (
                    IssueKind::SlowExit,
                    "Hesitant throttle application".to_string(),
                    format!(
                        "Increase throttle by ~{:.0}% exiting the corner",
                        pedals.throttle_diff.abs()
                    ),
                )
            } else {
                (
                    IssueKind::SlowExit,
                    "Slow exit acceleration".to_string(),
                    "Open the steering earlier so you can get back to full throttle sooner"
                        .to_string(),
                )
            }
        }
    }
}

/// Ranked recommendations for a driver lap against the golden lap.
///
/// Only sectors where the driver is slower by at least the configured loss are
/// flagged. Gains are the time difference of covering the sector at each
/// lap's mean speed.
pub fn generate(pair: &ResampledPair, rules: &IssueRules) -> Vec<Recommendation> {
    let (Some(&window_start), Some(&window_end)) = (pair.distance.first(), pair.distance.last())
    else {
        return Vec::new();
    };

    let mut recommendations = Vec::new();
    let mut start = 0;
    while start < pair.distance.len() {
        let sector = sector_of(pair.distance[start]);
        let end = pair.distance[start..]
            .iter()
            .position(|d| sector_of(*d) != sector)
            .map_or(pair.distance.len(), |offset| start + offset);

        let window = (window_start, window_end);
        if let Some(rec) = sector_recommendation(pair, sector, start..end, window, rules) {
            recommendations.push(rec);
        }
        start = end;
    }

    recommendations.sort_by(|a, b| b.estimated_gain.total_cmp(&a.estimated_gain));
    recommendations.truncate(rules.max_recommendations);
    recommendations
}

fn sector_recommendation(
    pair: &ResampledPair,
    sector: i64,
    range: std::ops::Range<usize>,
    (window_start, window_end): (f64, f64),
    rules: &IssueRules,
) -> Option<Recommendation> {
    let (sector_start, sector_end) = sector_bounds(sector);
    let length = sector_end.min(window_end) - sector_start.max(window_start);
    if length <= 0.0 {
        return None;
    }

    let driver_speed = &pair.driver.speed[range.clone()];
    let golden_speed = &pair.golden.speed[range.clone()];
    let driver_avg = mean(driver_speed)?;
    let golden_avg = mean(golden_speed)?;
    let speed_loss = golden_avg - driver_avg;
    if !speed_loss.is_finite() || speed_loss < rules.min_speed_loss_kmh || speed_loss <= 0.0 {
        return None;
    }

    let losses: Vec<f64> = golden_speed
        .iter()
        .zip(driver_speed)
        .map(|(g, d)| g - d)
        .collect();
    let zone = loss_zone(&losses, rules.concentration_tolerance_kmh);

    let zone_indices = zone_range(zone, range.len());
    let zone_mean =
        |values: &[f64]| mean(&values[range.clone()][zone_indices.clone()]).unwrap_or(0.0);
    let pedals = PedalContext {
        brake_diff: zone_mean(&pair.driver.brake) - zone_mean(&pair.golden.brake),
        throttle_diff: zone_mean(&pair.driver.throttle) - zone_mean(&pair.golden.throttle),
    };
    let (category, issue, suggestion) = describe(zone, speed_loss, pedals);

    Some(Recommendation {
        sector,
        distance: sector_start,
        zone,
        category,
        issue,
        suggestion,
        speed_loss,
        estimated_gain: time_gain_s(length, driver_avg, golden_avg).max(0.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::analysis::resampler::{Resampled, resample_pair};
    use crate::domain::telemetry::TelemetryPoint;
    use approx::assert_relative_eq;

    fn lap(speed: impl Fn(f64) -> f64) -> Vec<TelemetryPoint> {
        (0..=100)
            .map(|i| {
                let distance = i as f64 * 10.0;
                TelemetryPoint {
                    distance,
                    speed: speed(distance),
                    ..TelemetryPoint::default()
                }
            })
            .collect()
    }

    fn pair(driver: &[TelemetryPoint], golden: &[TelemetryPoint]) -> ResampledPair {
        match resample_pair(driver, golden, 10.0) {
            Resampled::Paired(pair) => pair,
            Resampled::InsufficientOverlap => panic!("expected overlap"),
        }
    }

    #[test]
    fn test_identical_laps_have_no_recommendations() {
        let driver = lap(|_| 100.0);
        let golden = lap(|_| 100.0);
        assert!(generate(&pair(&driver, &golden), &IssueRules::default()).is_empty());
    }

    #[test]
    fn test_uniform_loss_in_one_sector() {
        let driver = lap(|d| if (200.0..400.0).contains(&d) { 95.0 } else { 100.0 });
        let golden = lap(|_| 100.0);

        let recs = generate(&pair(&driver, &golden), &IssueRules::default());
        assert_eq!(recs.len(), 1);
        let rec = &recs[0];
        assert_eq!(rec.sector, 1);
        assert_eq!(rec.distance, 200.0);
        assert_relative_eq!(rec.speed_loss, 5.0, epsilon = 1e-9);
        let expected = 200.0 * 3.6 * (1.0 / 95.0 - 1.0 / 100.0);
        assert_relative_eq!(rec.estimated_gain, expected, epsilon = 1e-9);
        assert_eq!(rec.zone, LossZone::Mid);
        assert_eq!(rec.category, IssueKind::LowMinimumSpeed);
    }

    #[test]
    fn test_faster_driver_sectors_are_not_flagged() {
        let driver = lap(|d| if d < 200.0 { 110.0 } else { 100.0 });
        let golden = lap(|_| 100.0);
        assert!(generate(&pair(&driver, &golden), &IssueRules::default()).is_empty());
    }

    #[test]
    fn test_entry_loss_is_braking_issue() {
        // Slow only in the first third of sector 2
        let driver = lap(|d| if (400.0..460.0).contains(&d) { 80.0 } else { 100.0 });
        let golden = lap(|_| 100.0);
        let recs = generate(&pair(&driver, &golden), &IssueRules::default());
        assert_eq!(recs[0].zone, LossZone::Entry);
        assert_eq!(recs[0].category, IssueKind::BrakingTooEarly);
        assert_eq!(recs[0].issue, "Braking too early");
    }

    #[test]
    fn test_exit_loss_with_less_throttle() {
        // Last seven grid points of sector 2
        let mut driver = lap(|d| if (530.0..600.0).contains(&d) { 85.0 } else { 100.0 });
        for p in driver.iter_mut() {
            p.throttle = if (530.0..600.0).contains(&p.distance) { 60.0 } else { 100.0 };
        }
        let mut golden = lap(|_| 100.0);
        for p in golden.iter_mut() {
            p.throttle = 100.0;
        }

        let recs = generate(&pair(&driver, &golden), &IssueRules::default());
        assert_eq!(recs[0].sector, 2);
        assert_eq!(recs[0].zone, LossZone::Exit);
        assert_eq!(recs[0].category, IssueKind::SlowExit);
        assert_eq!(recs[0].suggestion, "Increase throttle by ~40% exiting the corner");
    }

    #[test]
    fn test_sorted_by_gain_and_truncated() {
        let driver = lap(|d| 100.0 - (d / 200.0).floor() * 2.0 - 2.0);
        let golden = lap(|_| 100.0);
        let rules = IssueRules {
            max_recommendations: 3,
            ..IssueRules::default()
        };

        let recs = generate(&pair(&driver, &golden), &rules);
        assert_eq!(recs.len(), 3);
        let sectors: Vec<i64> = recs.iter().map(|r| r.sector).collect();
        assert_eq!(sectors, vec![4, 3, 2]);
        assert!(recs.windows(2).all(|w| w[0].estimated_gain >= w[1].estimated_gain));
    }

    #[test]
    fn test_loss_zone_needs_three_samples() {
        assert_eq!(loss_zone(&[5.0, 0.0], 0.5), LossZone::Mid);
        assert_eq!(loss_zone(&[0.0, 0.0, 9.0], 0.5), LossZone::Exit);
    }
}
