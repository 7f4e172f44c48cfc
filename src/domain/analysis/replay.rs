// Distance-to-time replay timelines and race commentary
use super::progression::linspace_indices;
use crate::domain::telemetry::TelemetryPoint;
use crate::domain::units::{METERS_PER_ARC_MINUTE, finite_or_zero, kmh_to_mps};
use serde::{Deserialize, Serialize};

pub const DEFAULT_REPLAY_MAX_POINTS: usize = 4500;

/// GPS jumps longer than this (m) and much longer than the lap-distance step
/// are treated as teleports and dropped.
const GLITCH_MIN_JUMP_M: f64 = 50.0;
const GLITCH_RATIO: f64 = 5.0;
/// Below this average speed (m/s) time steps use the fallback speed.
const SLOW_SPEED_MPS: f64 = 1.0;
const FALLBACK_SPEED_MPS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReplayFrame {
    pub time: f64,
    pub position: Position,
    pub speed: f64,
    pub throttle: f64,
    pub brake: f64,
    pub distance: f64,
}

impl ReplayFrame {
    fn at(time: f64, point: &TelemetryPoint) -> Self {
        Self {
            time: finite_or_zero(time),
            position: Position {
                x: finite_or_zero(point.longitude),
                y: 0.0,
                z: finite_or_zero(point.latitude),
            },
            speed: finite_or_zero(point.speed),
            throttle: finite_or_zero(point.throttle),
            brake: finite_or_zero(point.brake),
            distance: finite_or_zero(point.distance),
        }
    }
}

/// GPS extent of a lap, used to fit the track into the viewer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_z: f64,
    pub max_z: f64,
}

impl Bounds {
    fn of(points: &[TelemetryPoint]) -> Self {
        let fold = |field: fn(&TelemetryPoint) -> f64| {
            points.iter().map(field).fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            })
        };
        let (min_x, max_x) = fold(|p| p.longitude);
        let (min_z, max_z) = fold(|p| p.latitude);
        Self {
            min_x: finite_or_zero(min_x),
            max_x: finite_or_zero(max_x),
            min_z: finite_or_zero(min_z),
            max_z: finite_or_zero(max_z),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Timeline {
    pub duration: f64,
    pub timeline: Vec<ReplayFrame>,
    pub bounds: Bounds,
    pub max_distance: f64,
    pub point_count: usize,
}

/// Time it takes to go from `current` to `next`, or `None` when the step is
/// a data artifact that should be skipped.
fn time_step(current: &TelemetryPoint, next: &TelemetryPoint) -> Option<f64> {
    let mut distance = next.distance - current.distance;
    if distance.is_nan() || distance <= 0.0 {
        return None;
    }

    let d_lat = next.latitude - current.latitude;
    let d_lon = next.longitude - current.longitude;
    let gps_m = (d_lat * d_lat + d_lon * d_lon).sqrt() * METERS_PER_ARC_MINUTE;

    // Teleport: position jumps while lap distance barely moves
    if gps_m > GLITCH_MIN_JUMP_M && gps_m > distance * GLITCH_RATIO {
        return None;
    }
    // Lap-distance spike: trust the GPS step instead
    if distance > GLITCH_MIN_JUMP_M && distance > gps_m * GLITCH_RATIO {
        distance = gps_m;
    }

    let avg_mps = kmh_to_mps((current.speed + next.speed) / 2.0);
    let speed = if avg_mps > SLOW_SPEED_MPS { avg_mps } else { FALLBACK_SPEED_MPS };
    Some(distance / speed)
}

/// Keep at most `max_points` frames, spread evenly and keeping both ends.
pub fn downsample<T: Copy>(frames: &[T], max_points: usize) -> Vec<T> {
    if frames.len() <= max_points {
        return frames.to_vec();
    }
    let mut indices = linspace_indices(frames.len(), max_points);
    indices.dedup();
    indices.into_iter().map(|i| frames[i]).collect()
}

/// Replay timeline of one lap: each frame carries the time the car reaches it.
/// `points` are taken in logging order; steps that do not move forward along
/// the lap are skipped.
pub fn build_timeline(points: &[TelemetryPoint], max_points: usize) -> Option<Timeline> {
    let first = points.first()?;

    let mut frames = vec![ReplayFrame::at(0.0, first)];
    let mut elapsed = 0.0;
    for pair in points.windows(2) {
        let Some(step) = time_step(&pair[0], &pair[1]) else {
            continue;
        };
        elapsed += step;
        frames.push(ReplayFrame::at(elapsed, &pair[1]));
    }

    let frames = downsample(&frames, max_points.max(2));
    let duration = if elapsed > 0.0 {
        elapsed
    } else {
        frames.last().map_or(0.0, |f| f.time)
    };
    let max_distance = points
        .iter()
        .map(|p| p.distance)
        .fold(f64::NEG_INFINITY, f64::max);

    Some(Timeline {
        duration: finite_or_zero(duration),
        point_count: frames.len(),
        timeline: frames,
        bounds: Bounds::of(points),
        max_distance: finite_or_zero(max_distance),
    })
}

/// A car's position on track at one replay instant.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CarState {
    pub name: String,
    #[serde(default)]
    pub distance: f64,
    #[serde(default)]
    pub speed: f64,
}

/// Gap (m) above which the leader is pulling away.
const SOLID_LEAD_M: f64 = 50.0;
/// Gap (m) below which the top two are fighting.
const CLOSE_GAP_M: f64 = 10.0;
/// Leader speed (km/h) worth calling out.
const TOP_SPEED_KMH: f64 = 160.0;

/// Commentary on the two leading cars. The replay clock picks among the lines
/// that apply, so the same state always produces the same line.
pub fn commentary(cars: &[CarState], current_time: f64) -> Option<String> {
    if cars.len() < 2 {
        return None;
    }

    let mut order: Vec<&CarState> = cars.iter().collect();
    order.sort_by(|a, b| b.distance.total_cmp(&a.distance));
    let (leader, second) = (order[0], order[1]);
    let gap = leader.distance - second.distance;

    let mut lines = Vec::new();
    if gap > SOLID_LEAD_M {
        lines.push(format!(
            "{} is building a solid lead, {}m ahead.",
            leader.name, gap as i64
        ));
        lines.push(format!("{} is running away with it!", leader.name));
    } else if gap < CLOSE_GAP_M {
        lines.push(format!(
            "{} is right on the gearbox of {}!",
            second.name, leader.name
        ));
        lines.push(format!(
            "Tight battle for the lead! Only {}m separates them.",
            gap as i64
        ));
    }
    if leader.speed > TOP_SPEED_KMH {
        lines.push(format!(
            "{} hitting top speeds of {} km/h.",
            leader.name, leader.speed as i64
        ));
    }

    if lines.is_empty() {
        return None;
    }
    let tick = if current_time.is_finite() && current_time > 0.0 {
        current_time.floor() as usize
    } else {
        0
    };
    Some(lines.swap_remove(tick % lines.len()))
}
