// Race session context: classification and weather summaries
use serde::Serialize;
use std::collections::BTreeMap;

const TOP_PER_CLASS: usize = 3;

/// One classified car as printed in the results sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub pos: u32,
    pub number: Option<String>,
    pub laps: Option<u32>,
    pub elapsed: Option<String>,
    pub gap_first: Option<String>,
    pub best_lap: Option<String>,
    pub best_kph: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestLap {
    pub number: Option<String>,
    pub time: Option<String>,
    pub kph: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassResults {
    pub class: String,
    pub top: Vec<ResultRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaceResults {
    /// File the classification was read from.
    pub source: String,
    pub overall: ResultRow,
    pub classes: Vec<ClassResults>,
    pub best_lap: Option<BestLap>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub avg: f64,
}

/// One reading of the weather station. Any field may be missing.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WeatherSample {
    pub air_temp: Option<f64>,
    pub track_temp: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
    pub rain: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherSummary {
    pub air_temp: Option<Stats>,
    pub track_temp: Option<Stats>,
    pub humidity: Option<Stats>,
    pub pressure: Option<Stats>,
    pub wind_speed: Option<Stats>,
    /// Median, degrees.
    pub wind_direction: Option<f64>,
    pub rain: bool,
    pub samples: usize,
}

/// Race classification and weather of the session a lap was driven in.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SessionContext {
    pub race_results: Option<RaceResults>,
    pub weather: Option<WeatherSummary>,
}

/// Seconds from a sheet time such as `1:38.765`, `1:02:03.5` or `98,7`.
pub fn parse_clock_time(raw: &str) -> Option<f64> {
    let raw = raw.trim().replace(',', ".");
    if raw.is_empty() {
        return None;
    }
    raw.split(':')
        .map(|part| part.trim().parse::<f64>().ok())
        .try_fold(0.0, |total, part| Some(total * 60.0 + part?))
        .filter(|v| v.is_finite())
}

/// Overall winner, top three of each class and the fastest lap.
/// `entries` pairs each row with its class; `None` when nobody is classified.
pub fn summarize_results(
    source: &str,
    mut entries: Vec<(String, ResultRow)>,
) -> Option<RaceResults> {
    entries.sort_by_key(|(_, row)| row.pos);
    let overall = entries.first()?.1.clone();

    let best_lap = entries
        .iter()
        .filter_map(|(_, row)| {
            let secs = parse_clock_time(row.best_lap.as_deref()?)?;
            Some((secs, row))
        })
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, row)| BestLap {
            number: row.number.clone(),
            time: row.best_lap.clone(),
            kph: row.best_kph.clone(),
        });

    let mut by_class: BTreeMap<String, Vec<ResultRow>> = BTreeMap::new();
    for (class, row) in entries {
        let top = by_class.entry(class).or_default();
        if top.len() < TOP_PER_CLASS {
            top.push(row);
        }
    }

    Some(RaceResults {
        source: source.to_string(),
        overall,
        classes: by_class
            .into_iter()
            .map(|(class, top)| ClassResults { class, top })
            .collect(),
        best_lap,
    })
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn stats(values: impl Iterator<Item = f64>) -> Option<Stats> {
    let values: Vec<f64> = values.filter(|v| v.is_finite()).collect();
    if values.is_empty() {
        return None;
    }
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let avg = values.iter().sum::<f64>() / values.len() as f64;
    Some(Stats {
        min: round_to(min, 2),
        max: round_to(max, 2),
        avg: round_to(avg, 2),
    })
}

fn median(mut values: Vec<f64>) -> Option<f64> {
    values.retain(|v| v.is_finite());
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    })
}

/// Session weather statistics. A zero track temperature is a sensor dropout.
pub fn summarize_weather(samples: &[WeatherSample]) -> Option<WeatherSummary> {
    if samples.is_empty() {
        return None;
    }
    let channel = |field: fn(&WeatherSample) -> Option<f64>| samples.iter().filter_map(field);

    Some(WeatherSummary {
        air_temp: stats(channel(|s| s.air_temp)),
        track_temp: stats(channel(|s| s.track_temp.filter(|t| *t != 0.0))),
        humidity: stats(channel(|s| s.humidity)),
        pressure: stats(channel(|s| s.pressure)),
        wind_speed: stats(channel(|s| s.wind_speed)),
        wind_direction: median(channel(|s| s.wind_direction).collect())
            .map(|d| round_to(d, 1)),
        rain: channel(|s| s.rain).any(|r| r > 0.0),
        samples: samples.len(),
    })
}
