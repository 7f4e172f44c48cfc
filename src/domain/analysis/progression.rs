// Session progression, race timeline and ghost-lap selection for one vehicle
use crate::domain::lap::{LapTime, format_lap_time};
use crate::domain::report::{GhostPoint, Progression, ProgressionLap, TimelineEntry};
use crate::domain::telemetry::TelemetryPoint;
use std::collections::{HashMap, HashSet};

/// Consecutive laps closer than this (seconds) count as a plateau.
pub const PLATEAU_DELTA_S: f64 = 0.1;

pub const DEFAULT_GHOST_LAP_LIMIT: usize = 3;
pub const DEFAULT_GHOST_SAMPLE_SIZE: usize = 250;

fn sorted_by_lap(laps: &[LapTime]) -> Vec<&LapTime> {
    let mut laps: Vec<&LapTime> = laps.iter().filter(|l| l.lap_time.is_finite()).collect();
    laps.sort_by_key(|l| l.lap_number);
    laps
}

/// Improvement over the session, per-lap deltas and the lap where pace
/// last flattened out.
pub fn progression(laps: &[LapTime]) -> Option<Progression> {
    let laps = sorted_by_lap(laps);
    let start = laps.first()?.lap_time;
    let best = laps.iter().map(|l| l.lap_time).fold(f64::INFINITY, f64::min);
    let total_improvement = start - best;

    let mut plateau_start: Option<u32> = None;
    let mut plateau_lap: Option<u32> = None;
    let mut points = Vec::with_capacity(laps.len());

    for (i, lap) in laps.iter().enumerate() {
        // Positive when this lap was quicker than the one before
        let delta_prev = if i > 0 { laps[i - 1].lap_time - lap.lap_time } else { 0.0 };

        if i > 0 {
            if delta_prev.abs() < PLATEAU_DELTA_S {
                let start = *plateau_start.get_or_insert(lap.lap_number);
                plateau_lap = Some(start);
            } else {
                plateau_start = None;
            }
        }

        points.push(ProgressionLap {
            lap: lap.lap_number,
            time: lap.lap_time,
            formatted: lap.formatted(),
            delta_prev,
            improvement_from_start: start - lap.lap_time,
        });
    }

    let mut insights = Vec::new();
    if total_improvement > 0.0 {
        insights.push(format!(
            "Improved {:.2}s from lap 1 to best lap.",
            total_improvement
        ));
    } else {
        insights.push("Pace stayed flat versus the opening lap.".to_string());
    }
    if let Some(lap) = plateau_lap {
        insights.push(format!("Pace plateau detected around lap {}.", lap));
    }

    Some(Progression {
        total_improvement,
        plateau_lap,
        laps: points,
        insights,
    })
}

/// Cumulative time per lap and the running gap to the golden car. The gap
/// only accumulates over lap numbers both cars completed.
pub fn race_timeline(vehicle_laps: &[LapTime], golden_laps: &[LapTime]) -> Vec<TimelineEntry> {
    let golden: HashMap<u32, f64> = golden_laps
        .iter()
        .filter(|l| l.lap_time.is_finite())
        .map(|l| (l.lap_number, l.lap_time))
        .collect();

    let mut cumulative = 0.0;
    let mut golden_cumulative = 0.0;
    sorted_by_lap(vehicle_laps)
        .into_iter()
        .map(|lap| {
            cumulative += lap.lap_time;
            let gap_to_golden = golden.get(&lap.lap_number).map(|time| {
                golden_cumulative += time;
                cumulative - golden_cumulative
            });
            TimelineEntry {
                lap: lap.lap_number,
                lap_time: lap.lap_time,
                formatted: format_lap_time(lap.lap_time),
                cumulative,
                gap_to_golden,
            }
        })
        .collect()
}

/// A lap worth replaying next to the compared one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GhostCandidate<'a> {
    pub label: &'static str,
    pub lap: &'a LapTime,
}

/// Best, slowest and most recent laps of a vehicle, skipping the lap being
/// compared and repeats. Callers drop candidates without telemetry and stop
/// at their limit.
pub fn ghost_candidates(laps: &[LapTime], exclude_lap: u32) -> Vec<GhostCandidate<'_>> {
    let valid: Vec<&LapTime> = laps.iter().filter(|l| l.lap_time.is_finite()).collect();

    let fastest = valid
        .iter()
        .copied()
        .reduce(|a, b| if b.lap_time < a.lap_time { b } else { a });
    let slowest = valid
        .iter()
        .copied()
        .reduce(|a, b| if b.lap_time > a.lap_time { b } else { a });
    let recent = valid.iter().copied().max_by_key(|l| l.lap_number);

    let mut seen = HashSet::new();
    [("Best Lap", fastest), ("Slowest Lap", slowest), ("Most Recent Lap", recent)]
        .into_iter()
        .filter_map(|(label, lap)| lap.map(|lap| GhostCandidate { label, lap }))
        .filter(|c| c.lap.lap_number != exclude_lap)
        .filter(|c| seen.insert(c.lap.lap_number))
        .collect()
}

/// `count` indices spread evenly over `0..len`, keeping both ends.
pub fn linspace_indices(len: usize, count: usize) -> Vec<usize> {
    if len == 0 || count == 0 {
        return Vec::new();
    }
    if len <= count {
        return (0..len).collect();
    }
    if count == 1 {
        return vec![0];
    }
    let last = (len - 1) as f64;
    let steps = (count - 1) as f64;
    (0..count)
        .map(|i| ((i as f64 * last / steps) as usize).min(len - 1))
        .collect()
}

/// Lightweight copy of a lap for the map's ghost cars.
pub fn ghost_telemetry(points: &[TelemetryPoint], sample_size: usize) -> Vec<GhostPoint> {
    linspace_indices(points.len(), sample_size)
        .into_iter()
        .map(|i| {
            let p = &points[i];
            GhostPoint {
                distance: p.distance,
                speed: p.speed,
                lon: p.longitude,
                lat: p.latitude,
            }
        })
        .collect()
}
