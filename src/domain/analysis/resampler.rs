// Distance-domain resampling of lap pairs onto a shared grid
use crate::domain::report::{ChannelTrace, SpeedTrace};
use crate::domain::telemetry::TelemetryPoint;

pub const DEFAULT_STEP_M: f64 = 10.0;
pub const DEFAULT_SMOOTHING_WINDOW: usize = 5;

/// Tolerance for deciding whether the window end lands on a grid step.
const GRID_EPSILON: f64 = 1e-9;

/// Two laps interpolated onto one grid, before smoothing.
#[derive(Debug, Clone, PartialEq)]
pub struct ResampledPair {
    pub distance: Vec<f64>,
    pub driver: ChannelTrace,
    pub golden: ChannelTrace,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resampled {
    Paired(ResampledPair),
    /// The laps share no stretch of track.
    InsufficientOverlap,
}

impl ResampledPair {
    /// Chart-ready traces: speed and pedals smoothed with a centered moving
    /// average, GPS left as interpolated so the map path stays on track.
    pub fn smoothed(&self, window: usize) -> SpeedTrace {
        let smooth_trace = |trace: &ChannelTrace| ChannelTrace {
            speed: smooth(&trace.speed, window),
            throttle: smooth(&trace.throttle, window),
            brake: smooth(&trace.brake, window),
            longitude: trace.longitude.clone(),
            latitude: trace.latitude.clone(),
        };

        SpeedTrace {
            distance: self.distance.clone(),
            driver: smooth_trace(&self.driver),
            golden: smooth_trace(&self.golden),
        }
    }
}

/// Common distance range of two laps, or `None` if it is empty.
pub fn overlap_window(a: &[TelemetryPoint], b: &[TelemetryPoint]) -> Option<(f64, f64)> {
    let (a_first, a_last) = (a.first()?, a.last()?);
    let (b_first, b_last) = (b.first()?, b.last()?);
    let start = a_first.distance.max(b_first.distance);
    let end = a_last.distance.min(b_last.distance);
    (end > start).then_some((start, end))
}

/// Grid from `start` to `end` at `step`, always ending exactly on `end`.
pub fn distance_grid(start: f64, end: f64, step: f64) -> Vec<f64> {
    if step.is_nan() || step <= 0.0 || end < start {
        return vec![start];
    }

    let steps = ((end - start) / step + GRID_EPSILON).floor() as usize;
    let mut grid: Vec<f64> = (0..=steps)
        .map(|i| (start + i as f64 * step).min(end))
        .collect();

    if let Some(last) = grid.last_mut() {
        if end - *last > GRID_EPSILON * step.max(1.0) {
            grid.push(end);
        } else {
            *last = end;
        }
    }
    grid
}

/// Linear interpolation of one channel at distance `x`. Values outside the
/// sampled range clamp to the nearest end sample.
pub fn interpolate(points: &[TelemetryPoint], x: f64, field: fn(&TelemetryPoint) -> f64) -> f64 {
    let (Some(first), Some(last)) = (points.first(), points.last()) else {
        return 0.0;
    };
    if x <= first.distance {
        return field(first);
    }
    if x >= last.distance {
        return field(last);
    }

    let upper = points.partition_point(|p| p.distance <= x);
    let lo = &points[upper - 1];
    let hi = &points[upper];
    let span = hi.distance - lo.distance;
    if span <= 0.0 {
        return field(lo);
    }
    let t = (x - lo.distance) / span;
    field(lo) + (field(hi) - field(lo)) * t
}

pub fn resample_channel(
    points: &[TelemetryPoint],
    grid: &[f64],
    field: fn(&TelemetryPoint) -> f64,
) -> Vec<f64> {
    grid.iter().map(|x| interpolate(points, *x, field)).collect()
}

pub fn resample_trace(points: &[TelemetryPoint], grid: &[f64]) -> ChannelTrace {
    ChannelTrace {
        speed: resample_channel(points, grid, |p| p.speed),
        throttle: resample_channel(points, grid, |p| p.throttle),
        brake: resample_channel(points, grid, |p| p.brake),
        longitude: resample_channel(points, grid, |p| p.longitude),
        latitude: resample_channel(points, grid, |p| p.latitude),
    }
}

/// Centered moving average over `window / 2` samples each side, so an even
/// window averages `window + 1` samples. Near the edges the window shrinks
/// to the in-bounds neighbours.
pub fn smooth(values: &[f64], window: usize) -> Vec<f64> {
    if window <= 1 || values.len() < 2 {
        return values.to_vec();
    }

    let half = window / 2;
    (0..values.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half).min(values.len() - 1);
            let slice = &values[lo..=hi];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}

/// Interpolate the driver and golden laps onto the grid spanning their overlap.
pub fn resample_pair(driver: &[TelemetryPoint], golden: &[TelemetryPoint], step: f64) -> Resampled {
    let Some((start, end)) = overlap_window(driver, golden) else {
        return Resampled::InsufficientOverlap;
    };

    let distance = distance_grid(start, end, step);
    Resampled::Paired(ResampledPair {
        driver: resample_trace(driver, &distance),
        golden: resample_trace(golden, &distance),
        distance,
    })
}
