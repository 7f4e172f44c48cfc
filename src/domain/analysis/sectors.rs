// Sector segmentation, cross-lap variance and hot/weak zones
use crate::domain::report::{HotZones, SectorComparison, SectorRating, SectorStat, SectorVariance};
use crate::domain::telemetry::TelemetryPoint;
use std::collections::BTreeMap;

/// Width of a sector in meters. The UI overlay draws sectors with the same
/// width, so this is not configurable.
pub const SECTOR_SIZE_M: f64 = 200.0;

/// Upper variance bounds (km/h²) for each rating, checked in order.
const RATING_THRESHOLDS: [(f64, SectorRating); 3] = [
    (1.5, SectorRating::Excellent),
    (3.5, SectorRating::Good),
    (7.0, SectorRating::Ok),
];

pub fn sector_of(distance: f64) -> i64 {
    (distance / SECTOR_SIZE_M).floor() as i64
}

/// `[start, end)` of a sector in meters.
pub fn sector_bounds(sector: i64) -> (f64, f64) {
    let start = sector as f64 * SECTOR_SIZE_M;
    (start, start + SECTOR_SIZE_M)
}

pub fn classify_variance(variance: f64) -> SectorRating {
    RATING_THRESHOLDS
        .iter()
        .find(|(bound, _)| variance < *bound)
        .map(|(_, rating)| *rating)
        .unwrap_or(SectorRating::Weak)
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population variance. Zero for fewer than two values.
pub fn population_variance(values: &[f64]) -> f64 {
    let Some(avg) = mean(values) else {
        return 0.0;
    };
    if values.len() < 2 {
        return 0.0;
    }
    values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
struct SectorAggregate {
    count: usize,
    first_distance: f64,
    speed_sum: f64,
    throttle_sum: f64,
    brake_max: f64,
}

impl SectorAggregate {
    fn speed(&self) -> f64 {
        self.speed_sum / self.count as f64
    }

    fn throttle(&self) -> f64 {
        self.throttle_sum / self.count as f64
    }
}

fn aggregate_by_sector(points: &[TelemetryPoint]) -> BTreeMap<i64, SectorAggregate> {
    let mut sectors: BTreeMap<i64, SectorAggregate> = BTreeMap::new();
    for point in points {
        let agg = sectors.entry(sector_of(point.distance)).or_default();
        if agg.count == 0 {
            agg.first_distance = point.distance;
            agg.brake_max = point.brake;
        }
        agg.count += 1;
        agg.speed_sum += point.speed;
        agg.throttle_sum += point.throttle;
        agg.brake_max = agg.brake_max.max(point.brake);
    }
    sectors
}

/// Mean speed of a lap inside each sector it covers.
pub fn sector_mean_speeds(points: &[TelemetryPoint]) -> BTreeMap<i64, f64> {
    aggregate_by_sector(points)
        .into_iter()
        .map(|(sector, agg)| (sector, agg.speed()))
        .collect()
}

/// Cross-lap stability of every sector covered by any lap, ordered by sector.
///
/// Each lap contributes its own mean speed per sector; the variance is the
/// population variance of those means. Sectors with fewer than two
/// contributing laps are reported as insufficient data.
pub fn sector_variances(laps: &[&[TelemetryPoint]]) -> Vec<SectorStat> {
    let mut per_sector: BTreeMap<i64, Vec<f64>> = BTreeMap::new();
    for lap in laps {
        for (sector, speed) in sector_mean_speeds(lap) {
            per_sector.entry(sector).or_default().push(speed);
        }
    }

    per_sector
        .into_iter()
        .map(|(sector, speeds)| {
            let variance = if speeds.len() >= 2 {
                let variance = population_variance(&speeds);
                SectorVariance::Measured {
                    variance,
                    rating: classify_variance(variance),
                }
            } else {
                SectorVariance::InsufficientData
            };
            SectorStat {
                sector,
                samples: speeds.len(),
                avg_speed: mean(&speeds).unwrap_or(0.0),
                variance,
            }
        })
        .collect()
}

/// Most stable and least stable sectors, each list capped at `limit`.
pub fn hot_zones(sectors: Vec<SectorStat>, limit: usize) -> HotZones {
    let mut strong: Vec<SectorStat> = sectors
        .iter()
        .filter(|s| {
            matches!(
                s.rating(),
                Some(SectorRating::Excellent) | Some(SectorRating::Good)
            )
        })
        .cloned()
        .collect();
    strong.sort_by(|a, b| variance_key(a).total_cmp(&variance_key(b)));
    strong.truncate(limit);

    let mut weak: Vec<SectorStat> = sectors
        .iter()
        .filter(|s| s.rating() == Some(SectorRating::Weak))
        .cloned()
        .collect();
    weak.sort_by(|a, b| variance_key(b).total_cmp(&variance_key(a)));
    weak.truncate(limit);

    HotZones {
        sectors,
        strong,
        weak,
    }
}

fn variance_key(stat: &SectorStat) -> f64 {
    stat.measured_variance().unwrap_or(0.0)
}

/// Per-sector aggregates of two laps, joined on the sectors both cover.
pub fn compare_sectors(
    driver: &[TelemetryPoint],
    golden: &[TelemetryPoint],
) -> Vec<SectorComparison> {
    let golden_sectors = aggregate_by_sector(golden);
    aggregate_by_sector(driver)
        .into_iter()
        .filter_map(|(sector, user)| {
            let gold = golden_sectors.get(&sector)?;
            Some(SectorComparison {
                sector,
                distance_user: user.first_distance,
                distance_golden: gold.first_distance,
                speed_user: user.speed(),
                speed_golden: gold.speed(),
                throttle_user: user.throttle(),
                throttle_golden: gold.throttle(),
                brake_user: user.brake_max,
                brake_golden: gold.brake_max,
                speed_diff: user.speed() - gold.speed(),
                throttle_diff: user.throttle() - gold.throttle(),
                brake_diff: user.brake_max - gold.brake_max,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn constant_lap(length: f64, speed: f64) -> Vec<TelemetryPoint> {
        (0..=(length / 10.0) as usize)
            .map(|i| TelemetryPoint {
                distance: i as f64 * 10.0,
                speed,
                ..TelemetryPoint::default()
            })
            .collect()
    }

    #[test]
    fn test_sector_of() {
        assert_eq!(sector_of(0.0), 0);
        assert_eq!(sector_of(199.99), 0);
        assert_eq!(sector_of(200.0), 1);
        assert_eq!(sector_bounds(2), (400.0, 600.0));
    }

    #[test]
    fn test_rating_thresholds() {
        assert_eq!(classify_variance(0.0), SectorRating::Excellent);
        assert_eq!(classify_variance(1.49), SectorRating::Excellent);
        assert_eq!(classify_variance(1.5), SectorRating::Good);
        assert_eq!(classify_variance(3.5), SectorRating::Ok);
        assert_eq!(classify_variance(6.99), SectorRating::Ok);
        assert_eq!(classify_variance(7.0), SectorRating::Weak);
    }

    #[test]
    fn test_population_variance() {
        assert_relative_eq!(population_variance(&[100.0, 104.0]), 4.0);
        assert_eq!(population_variance(&[100.0]), 0.0);
        assert_eq!(population_variance(&[]), 0.0);
    }

    #[test]
    fn test_single_lap_is_insufficient_data() {
        let lap = constant_lap(1000.0, 120.0);
        let stats = sector_variances(&[&lap]);
        assert_eq!(stats.len(), 6);
        assert!(
            stats
                .iter()
                .all(|s| s.variance == SectorVariance::InsufficientData)
        );
        assert_eq!(stats[0].avg_speed, 120.0);
    }

    #[test]
    fn test_variance_across_laps() {
        let a = constant_lap(400.0, 100.0);
        let b = constant_lap(400.0, 104.0);
        let c = constant_lap(190.0, 102.0);
        let stats = sector_variances(&[&a, &b, &c]);

        assert_eq!(stats[0].samples, 3);
        assert_relative_eq!(stats[0].avg_speed, 102.0);
        assert_relative_eq!(stats[0].measured_variance().unwrap(), 8.0 / 3.0);
        assert_eq!(stats[0].rating(), Some(SectorRating::Good));

        assert_eq!(stats[1].samples, 2);
        assert_relative_eq!(stats[1].measured_variance().unwrap(), 4.0);
        assert_eq!(stats[1].rating(), Some(SectorRating::Ok));
    }

    #[test]
    fn test_hot_zones_ordering_and_limit() {
        let stat = |sector: i64, variance: f64| SectorStat {
            sector,
            samples: 3,
            avg_speed: 100.0,
            variance: SectorVariance::Measured {
                variance,
                rating: classify_variance(variance),
            },
        };
        let sectors = vec![
            stat(0, 2.0),
            stat(1, 0.5),
            stat(2, 9.0),
            stat(3, 12.0),
            stat(4, 5.0),
            stat(5, 1.0),
            stat(6, 8.0),
        ];

        let zones = hot_zones(sectors, 2);
        let strong: Vec<i64> = zones.strong.iter().map(|s| s.sector).collect();
        let weak: Vec<i64> = zones.weak.iter().map(|s| s.sector).collect();
        assert_eq!(strong, vec![1, 5]);
        assert_eq!(weak, vec![3, 2]);
        assert_eq!(zones.sectors.len(), 7);
    }

    #[test]
    fn test_compare_sectors_inner_join() {
        let mut driver = constant_lap(390.0, 95.0);
        driver[0].brake = 10.0;
        driver[1].brake = 30.0;
        let golden = constant_lap(190.0, 100.0);

        let rows = compare_sectors(&driver, &golden);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].sector, 0);
        assert_relative_eq!(rows[0].speed_diff, -5.0);
        assert_eq!(rows[0].brake_user, 30.0);
        assert_eq!(rows[0].brake_diff, 30.0);
    }

    proptest! {
        #[test]
        fn prop_rating_is_monotonic(a in 0.0f64..50.0, b in 0.0f64..50.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(classify_variance(lo) <= classify_variance(hi));
        }
    }
}
