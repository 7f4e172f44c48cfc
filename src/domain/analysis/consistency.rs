// Lap-time consistency scoring
use super::sectors::mean;
use crate::domain::lap::{LapTime, format_lap_time};
use crate::domain::report::{
    ConsistencyBand, ConsistencyReport, LapBreakdown, RatingCounts, SectorRating, SectorStat,
};

/// Scores at or above this are "Excellent".
pub const EXCELLENT_SCORE: f64 = 85.0;
/// Scores at or above this (and below excellent) are "Balanced".
pub const BALANCED_SCORE: f64 = 60.0;

/// Default coefficient-of-variation multiplier. A 0.75% lap-time spread
/// scores 85 and a 2% spread scores 60.
pub const DEFAULT_CONSISTENCY_K: f64 = 2000.0;

/// Lap deltas within these multiples of σ are Excellent / Balanced.
const EXCELLENT_SIGMA: f64 = 0.5;
const BALANCED_SIGMA: f64 = 1.5;
/// Laps further than this from the average are called out.
const OUTLIER_SIGMA: f64 = 2.0;

/// Sample standard deviation. Zero for fewer than two values.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values).unwrap_or(0.0);
    let sum_sq: f64 = values.iter().map(|v| (v - avg).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

/// `clamp(100 - (std_dev / average) * k, 0, 100)`, rounded to one decimal.
pub fn consistency_score(std_dev: f64, average: f64, k: f64) -> f64 {
    let cv = if average > 0.0 { std_dev / average } else { 0.0 };
    let score = (100.0 - cv * k).clamp(0.0, 100.0);
    if score.is_finite() {
        (score * 10.0).round() / 10.0
    } else {
        0.0
    }
}

pub fn band_for_score(score: f64) -> ConsistencyBand {
    if score >= EXCELLENT_SCORE {
        ConsistencyBand::Excellent
    } else if score >= BALANCED_SCORE {
        ConsistencyBand::Balanced
    } else {
        ConsistencyBand::Weak
    }
}

/// Status of one lap from its distance to the average, in units of σ.
pub fn lap_status(delta_to_avg: f64, std_dev: f64) -> ConsistencyBand {
    if std_dev <= 0.0 {
        return ConsistencyBand::Excellent;
    }
    let sigmas = delta_to_avg.abs() / std_dev;
    if sigmas <= EXCELLENT_SIGMA {
        ConsistencyBand::Excellent
    } else if sigmas <= BALANCED_SIGMA {
        ConsistencyBand::Balanced
    } else {
        ConsistencyBand::Weak
    }
}

fn icon(status: ConsistencyBand, is_best: bool, is_worst: bool) -> &'static str {
    if is_best {
        return "🏆";
    }
    if is_worst {
        return "❌";
    }
    match status {
        ConsistencyBand::Excellent => "✅",
        ConsistencyBand::Balanced => "➖",
        ConsistencyBand::Weak => "⚠️",
    }
}

pub fn count_ratings(sectors: &[SectorStat]) -> RatingCounts {
    let mut counts = RatingCounts::default();
    for sector in sectors {
        match sector.rating() {
            Some(SectorRating::Excellent) => counts.excellent += 1,
            Some(SectorRating::Good) => counts.good += 1,
            Some(SectorRating::Ok) => counts.ok += 1,
            Some(SectorRating::Weak) => counts.weak += 1,
            None => counts.insufficient_data += 1,
        }
    }
    counts
}

fn recommendation_text(band: ConsistencyBand, outliers: &[u32], sectors: &[SectorStat]) -> String {
    let mut text = match band {
        ConsistencyBand::Excellent => "Great consistency overall. Keep building rhythm.",
        ConsistencyBand::Balanced => {
            "Solid base. Close the gap between your average and your best laps."
        }
        ConsistencyBand::Weak => {
            "Lap times vary a lot. Focus on repeating the same braking points every lap."
        }
    }
    .to_string();

    if !outliers.is_empty() {
        let laps: Vec<String> = outliers.iter().map(|l| l.to_string()).collect();
        text.push_str(&format!(
            " Watch laps {}: pace dropped well away from the average.",
            laps.join(", ")
        ));
    }

    let least_stable = sectors
        .iter()
        .filter(|s| s.rating() == Some(SectorRating::Weak))
        .max_by(|a, b| {
            a.measured_variance()
                .unwrap_or(0.0)
                .total_cmp(&b.measured_variance().unwrap_or(0.0))
        });
    if let Some(sector) = least_stable {
        text.push_str(&format!(
            " Sector {} is the least repeatable part of the lap.",
            sector.sector + 1
        ));
    }

    text
}

/// Consistency report for one vehicle's laps. `None` when there are no laps.
pub fn build_report(laps: &[LapTime], sectors: &[SectorStat], k: f64) -> Option<ConsistencyReport> {
    let mut laps: Vec<&LapTime> = laps.iter().filter(|l| l.lap_time.is_finite()).collect();
    if laps.is_empty() {
        return None;
    }
    laps.sort_by_key(|l| l.lap_number);

    let times: Vec<f64> = laps.iter().map(|l| l.lap_time).collect();
    let average = mean(&times)?;
    let best = times.iter().copied().fold(f64::INFINITY, f64::min);
    let worst = times.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let std_dev = sample_std_dev(&times);
    let score = consistency_score(std_dev, average, k);
    let band = band_for_score(score);

    let mut outliers = Vec::new();
    let breakdown: Vec<LapBreakdown> = laps
        .iter()
        .map(|lap| {
            let delta = lap.lap_time - average;
            if std_dev > 0.0 && delta.abs() > std_dev * OUTLIER_SIGMA {
                outliers.push(lap.lap_number);
            }
            let status = lap_status(delta, std_dev);
            let is_best = lap.lap_time == best;
            let is_worst = laps.len() > 1 && lap.lap_time == worst;
            LapBreakdown {
                lap: lap.lap_number,
                time: lap.lap_time,
                formatted: lap.formatted(),
                delta_to_avg: delta,
                status,
                icon: icon(status, is_best, is_worst),
            }
        })
        .collect();

    Some(ConsistencyReport {
        average_time: average,
        average_formatted: format_lap_time(average),
        best_time: best,
        best_formatted: format_lap_time(best),
        worst_time: worst,
        worst_formatted: format_lap_time(worst),
        std_dev,
        score,
        band,
        recommendation: recommendation_text(band, &outliers, sectors),
        outliers,
        laps: breakdown,
        sector_ratings: count_ratings(sectors),
    })
}
