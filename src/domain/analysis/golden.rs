// Golden lap selection
use crate::domain::lap::Lap;

/// Order candidates fastest first. The sort is stable, so laps with the same
/// time keep their input order. Candidates without a usable time are dropped.
pub fn rank_by_lap_time<T>(candidates: &[T], lap_time: impl Fn(&T) -> f64) -> Vec<&T> {
    let mut ranked: Vec<&T> = candidates
        .iter()
        .filter(|c| lap_time(*c).is_finite())
        .collect();
    ranked.sort_by(|a, b| lap_time(*a).total_cmp(&lap_time(*b)));
    ranked
}

/// The fastest lap that has telemetry. A faster lap with broken logging is
/// skipped in favour of a slower clean one.
pub fn select_golden_lap(laps: &[Lap]) -> Option<&Lap> {
    rank_by_lap_time(laps, |lap| lap.lap_time)
        .into_iter()
        .find(|lap| lap.has_telemetry())
}
