// CSV repository implementation
use crate::application::lap_repository::LapRepository;
use crate::domain::analysis::normalizer::is_known_channel;
use crate::domain::circuit::Circuit;
use crate::domain::error::AnalysisError;
use crate::domain::lap::{LapEvent, Vehicle, normalize_lap_number};
use crate::domain::session::{
    RaceResults, ResultRow, SessionContext, WeatherSample, WeatherSummary, summarize_results,
    summarize_weather,
};
use crate::domain::telemetry::ChannelSample;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime};
use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::hash::Hash;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

const TIMESTAMP_COLUMNS: &[&str] = &["timestamp", "meta_time", "time"];
const NAIVE_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S%.f",
];
const RESULT_CLASS_COLUMNS: &[&str] = &["CLASS_TYPE", "CLASS", "CLASS NAME"];

/// Telemetry of one vehicle, by lap.
type VehicleSamples = HashMap<u32, Vec<ChannelSample>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Telemetry,
    LapTime,
    Results,
    Weather,
}

impl FileKind {
    fn matches(&self, file_name: &str) -> bool {
        let name = file_name.to_lowercase();
        let patterns: &[&str] = match self {
            FileKind::Telemetry => &["telemetry"],
            FileKind::LapTime => &["lap_time", "laptime", "lap time"],
            FileKind::Results => &["results"],
            FileKind::Weather => &["weather"],
        };
        patterns.iter().any(|pattern| name.contains(pattern))
    }
}

/// Parsed data keyed by source, loaded at most once per key until cleared.
/// Concurrent misses on one key wait for a single load; failed loads are
/// not kept.
struct LoadOnce<K, V> {
    cells: Mutex<HashMap<K, Arc<OnceCell<Arc<V>>>>>,
}

impl<K: Eq + Hash, V> LoadOnce<K, V> {
    fn new() -> Self {
        Self {
            cells: Mutex::new(HashMap::new()),
        }
    }

    async fn get_or_load<F, Fut>(&self, key: K, load: F) -> Result<Arc<V>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        let cell = self.cells.lock().await.entry(key).or_default().clone();
        cell.get_or_try_init(|| async { load().await.map(Arc::new) })
            .await
            .cloned()
    }

    async fn clear(&self) {
        self.cells.lock().await.clear();
    }
}

/// Reads race logs from `<data>/<circuit>/*.csv`, caching every parsed file
/// until `clear_cache`. Telemetry is kept per vehicle and only for the
/// channels the analysis reads.
pub struct CsvRepository {
    data_path: PathBuf,
    lap_events: LoadOnce<PathBuf, Vec<LapEvent>>,
    samples: LoadOnce<(PathBuf, Vehicle), VehicleSamples>,
    sessions: LoadOnce<(String, String), SessionContext>,
}

impl CsvRepository {
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            lap_events: LoadOnce::new(),
            samples: LoadOnce::new(),
            sessions: LoadOnce::new(),
        }
    }

    fn circuit_dir(&self, circuit: &str) -> Result<PathBuf> {
        let mut components = Path::new(circuit).components();
        let plain_name = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !plain_name {
            return Err(
                AnalysisError::InputMalformed(format!("invalid circuit id '{}'", circuit)).into(),
            );
        }
        let dir = self.data_path.join(circuit);
        if !dir.is_dir() {
            return Err(AnalysisError::UnknownCircuit(circuit.to_string()).into());
        }
        Ok(dir)
    }

    fn find_data_file(
        &self,
        circuit: &str,
        race: &str,
        kind: FileKind,
    ) -> Result<Option<PathBuf>> {
        let dir = self.circuit_dir(circuit)?;
        let tokens = race_tokens(race);
        let mut candidates: Vec<PathBuf> = csv_files(&dir)?
            .into_iter()
            .filter(|path| {
                let name = file_name(path);
                kind.matches(&name) && matches_race(&name.to_lowercase(), &tokens)
            })
            .collect();
        candidates.sort();
        Ok(candidates.into_iter().next())
    }

    async fn events_for(&self, path: PathBuf) -> Result<Arc<Vec<LapEvent>>> {
        self.lap_events
            .get_or_load(path.clone(), || async move {
                let file = path.clone();
                let events = tokio::task::spawn_blocking(move || read_lap_events(&file))
                    .await
                    .context("Lap time reader task failed")??;
                info!("Loaded {} lap events from {}", events.len(), path.display());
                Ok(events)
            })
            .await
    }

    async fn samples_for(
        &self,
        path: PathBuf,
        vehicle: &Vehicle,
    ) -> Result<Arc<VehicleSamples>> {
        let vehicle = vehicle.clone();
        self.samples
            .get_or_load((path.clone(), vehicle.clone()), || async move {
                let file = path.clone();
                let target = vehicle.clone();
                let laps = tokio::task::spawn_blocking(move || read_samples(&file, &target))
                    .await
                    .context("Telemetry reader task failed")??;
                info!(
                    "Loaded telemetry for {} laps of {}/{} from {}",
                    laps.len(),
                    vehicle.chassis,
                    vehicle.car_number,
                    path.display()
                );
                Ok(laps)
            })
            .await
    }

    /// Side file of a race, parsed with `read`. Unreadable files are logged
    /// and treated as absent.
    async fn side_file<T, F>(
        &self,
        circuit: &str,
        race: &str,
        kind: FileKind,
        read: F,
    ) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&Path) -> Result<Option<T>> + Send + 'static,
    {
        let path = match self.find_data_file(circuit, race, kind) {
            Ok(Some(path)) => path,
            Ok(None) => return None,
            Err(e) => {
                warn!("Cannot look up {:?} file for {} {}: {:#}", kind, circuit, race, e);
                return None;
            }
        };
        let file = path.clone();
        match tokio::task::spawn_blocking(move || read(&file)).await {
            Ok(Ok(parsed)) => parsed,
            Ok(Err(e)) => {
                warn!("Could not parse {}: {:#}", path.display(), e);
                None
            }
            Err(e) => {
                warn!("Reader task for {} failed: {}", path.display(), e);
                None
            }
        }
    }
}

#[async_trait]
impl LapRepository for CsvRepository {
    async fn list_circuits(&self) -> Result<Vec<Circuit>> {
        if !self.data_path.is_dir() {
            warn!("Data directory {} not found", self.data_path.display());
            return Ok(Vec::new());
        }

        let mut dirs: Vec<PathBuf> = std::fs::read_dir(&self.data_path)
            .with_context(|| format!("Failed to list {}", self.data_path.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_dir() && !file_name(path).starts_with('.'))
            .collect();
        dirs.sort();

        let mut circuits = Vec::new();
        for dir in dirs {
            let files = csv_files(&dir)?;
            let names: Vec<String> = files.iter().map(|f| file_name(f)).collect();
            let has_kind = |kind: FileKind| names.iter().any(|n| kind.matches(n));
            if !has_kind(FileKind::Telemetry) || !has_kind(FileKind::LapTime) {
                continue;
            }

            let races: BTreeSet<String> = files
                .iter()
                .filter_map(|f| f.file_stem().and_then(|s| s.to_str()).and_then(race_id))
                .collect();
            circuits.push(Circuit::new(file_name(&dir), races.into_iter().collect()));
        }
        Ok(circuits)
    }

    async fn lap_events(&self, circuit: &str, race: &str) -> Result<Vec<LapEvent>> {
        let Some(path) = self.find_data_file(circuit, race, FileKind::LapTime)? else {
            return Err(AnalysisError::NoLapData {
                circuit: circuit.to_string(),
                race: race.to_string(),
            }
            .into());
        };
        Ok(self.events_for(path).await?.as_ref().clone())
    }

    async fn lap_samples(
        &self,
        circuit: &str,
        race: &str,
        vehicle: &Vehicle,
        lap: u32,
    ) -> Result<Vec<ChannelSample>> {
        let Some(path) = self.find_data_file(circuit, race, FileKind::Telemetry)? else {
            warn!("No telemetry file for {} {}", circuit, race);
            return Ok(Vec::new());
        };
        let laps = self.samples_for(path, vehicle).await?;
        Ok(laps.get(&lap).cloned().unwrap_or_default())
    }

    async fn session_context(&self, circuit: &str, race: &str) -> Result<SessionContext> {
        self.circuit_dir(circuit)?;
        let context = self
            .sessions
            .get_or_load((circuit.to_string(), race.to_string()), || async {
                Ok(SessionContext {
                    race_results: self
                        .side_file(circuit, race, FileKind::Results, read_results)
                        .await,
                    weather: self
                        .side_file(circuit, race, FileKind::Weather, read_weather)
                        .await,
                })
            })
            .await?;
        Ok(context.as_ref().clone())
    }

    async fn clear_cache(&self) {
        self.lap_events.clear().await;
        self.samples.clear().await;
        self.sessions.clear().await;
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"))
        })
        .collect())
}

/// File-name spellings of a race: `R1` is found as `race 1`, `r1` or `race1`.
fn race_tokens(race: &str) -> Vec<String> {
    let race = race.trim();
    if race.is_empty() {
        return Vec::new();
    }

    let number: String = race.chars().skip(1).collect();
    let candidates = [
        if number.is_empty() {
            race.to_lowercase()
        } else {
            format!("race {}", number.to_lowercase())
        },
        race.to_lowercase(),
        race.replace('R', "race").to_lowercase(),
    ];

    let mut tokens = Vec::new();
    for token in candidates {
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens
}

fn matches_race(lowered_name: &str, tokens: &[String]) -> bool {
    tokens.is_empty() || tokens.iter().any(|t| lowered_name.contains(t.as_str()))
}

/// First `R<digits>` token of a file stem, upper-cased.
fn race_id(stem: &str) -> Option<String> {
    stem.char_indices()
        .filter(|(_, c)| c.eq_ignore_ascii_case(&'r'))
        .find_map(|(i, _)| {
            let digits: String = stem[i + 1..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            (!digits.is_empty()).then(|| format!("R{}", digits))
        })
}

/// Seconds since the Unix epoch from an ISO-8601 / logger timestamp or a
/// plain number of seconds.
pub fn parse_timestamp(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_micros() as f64 / 1e6);
    }
    for format in NAIVE_TIMESTAMP_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt.and_utc().timestamp_micros() as f64 / 1e6);
        }
    }
    raw.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_lap(raw: Option<&str>) -> Option<u32> {
    let raw = raw?.trim();
    let lap = raw
        .parse::<i64>()
        .ok()
        .or_else(|| raw.parse::<f64>().ok().filter(|v| v.is_finite()).map(|v| v as i64))?;
    normalize_lap_number(lap)
}

fn column(headers: &csv::StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim() == name)
}

fn required_column(headers: &csv::StringRecord, names: &[&str], path: &Path) -> Result<usize> {
    names
        .iter()
        .find_map(|name| column(headers, name))
        .ok_or_else(|| {
            AnalysisError::MissingColumn {
                column: names.join("|"),
                file: path.display().to_string(),
            }
            .into()
        })
}

fn read_lap_events(path: &Path) -> Result<Vec<LapEvent>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let headers = reader.headers()?.clone();
    let timestamp_col = required_column(&headers, TIMESTAMP_COLUMNS, path)?;
    let vehicle_col = required_column(&headers, &["vehicle_id"], path)?;
    let lap_col = column(&headers, "lap");

    let mut events = Vec::new();
    let mut skipped = 0usize;
    for record in reader.records() {
        let record = record.with_context(|| format!("Malformed row in {}", path.display()))?;
        let timestamp = record.get(timestamp_col).and_then(parse_timestamp);
        let vehicle = record.get(vehicle_col).and_then(|v| Vehicle::parse(v).ok());
        let lap = lap_col.and_then(|c| parse_lap(record.get(c)));

        match (timestamp, vehicle, lap) {
            (Some(timestamp), Some(vehicle), Some(lap)) => events.push(LapEvent {
                timestamp,
                vehicle,
                lap,
            }),
            _ => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!("Skipped {} unusable lap rows in {}", skipped, path.display());
    }
    Ok(events)
}

/// Stream the long-format telemetry file and keep the samples of `target`
/// whose channel the analysis can read. Channel names are shared between
/// samples.
fn read_samples(path: &Path, target: &Vehicle) -> Result<VehicleSamples> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let headers = reader.headers()?.clone();
    let timestamp_col = required_column(&headers, TIMESTAMP_COLUMNS, path)?;
    let vehicle_col = required_column(&headers, &["vehicle_id"], path)?;
    let lap_col = required_column(&headers, &["lap"], path)?;
    let name_col = required_column(&headers, &["telemetry_name"], path)?;
    let value_col = required_column(&headers, &["telemetry_value"], path)?;

    // vehicle_id spellings and channel names repeat on every row
    let mut vehicles: HashMap<String, bool> = HashMap::new();
    let mut channels: HashMap<String, Option<Arc<str>>> = HashMap::new();
    let mut laps = VehicleSamples::new();
    let mut skipped = 0usize;
    let mut record = csv::StringRecord::new();

    while reader
        .read_record(&mut record)
        .with_context(|| format!("Malformed row in {}", path.display()))?
    {
        let Some(id) = record.get(vehicle_col) else {
            skipped += 1;
            continue;
        };
        let wanted = match vehicles.get(id) {
            Some(wanted) => *wanted,
            None => {
                let wanted = Vehicle::parse(id).is_ok_and(|v| &v == target);
                vehicles.insert(id.to_string(), wanted);
                wanted
            }
        };
        if !wanted {
            continue;
        }

        let Some(raw_name) = record.get(name_col).map(str::trim).filter(|n| !n.is_empty())
        else {
            skipped += 1;
            continue;
        };
        let name = match channels.get(raw_name) {
            Some(name) => name.clone(),
            None => {
                let name = is_known_channel(raw_name).then(|| Arc::<str>::from(raw_name));
                channels.insert(raw_name.to_string(), name.clone());
                name
            }
        };
        let Some(name) = name else {
            continue;
        };

        let timestamp = record.get(timestamp_col).and_then(parse_timestamp);
        let lap = parse_lap(record.get(lap_col));
        let (Some(timestamp), Some(lap)) = (timestamp, lap) else {
            skipped += 1;
            continue;
        };
        let value = record
            .get(value_col)
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite());

        laps.entry(lap)
            .or_default()
            .push(ChannelSample::new(timestamp, name, value));
    }

    if skipped > 0 {
        warn!("Skipped {} unusable telemetry rows in {}", skipped, path.display());
    }
    debug!(
        "{} vehicles and {} channels seen in {}",
        vehicles.len(),
        channels.len(),
        path.display()
    );
    Ok(laps)
}

/// Side files are `;`-separated sheets with upper-case headers.
fn sheet_reader(path: &Path) -> Result<(csv::Reader<std::fs::File>, HashMap<String, usize>)> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let headers: HashMap<String, usize> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| (h.trim().to_uppercase(), i))
        .collect();
    Ok((reader, headers))
}

fn text(record: &csv::StringRecord, col: Option<usize>) -> Option<String> {
    col.and_then(|c| record.get(c))
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn number(record: &csv::StringRecord, col: Option<usize>) -> Option<f64> {
    text(record, col)?
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Race classification. `None` when the sheet has no position or class column.
fn read_results(path: &Path) -> Result<Option<RaceResults>> {
    let (mut reader, headers) = sheet_reader(path)?;
    let col = |name: &str| headers.get(name).copied();
    let Some(class_col) = RESULT_CLASS_COLUMNS.iter().find_map(|name| col(name)) else {
        return Ok(None);
    };
    let Some(pos_col) = col("POS") else {
        return Ok(None);
    };

    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("Malformed row in {}", path.display()))?;
        let Some(pos) = number(&record, Some(pos_col)).filter(|p| *p >= 0.0) else {
            continue;
        };
        let row = ResultRow {
            pos: pos as u32,
            number: text(&record, col("NUMBER")),
            laps: number(&record, col("LAPS")).map(|l| l as u32),
            elapsed: text(&record, col("ELAPSED")),
            gap_first: text(&record, col("GAP_FIRST")),
            best_lap: text(&record, col("BEST_LAP_TIME")),
            best_kph: text(&record, col("BEST_LAP_KPH")),
        };
        entries.push((text(&record, Some(class_col)).unwrap_or_default(), row));
    }

    Ok(summarize_results(&file_name(path), entries))
}

fn read_weather(path: &Path) -> Result<Option<WeatherSummary>> {
    let (mut reader, headers) = sheet_reader(path)?;
    let col = |name: &str| headers.get(name).copied();

    let mut samples = Vec::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("Malformed row in {}", path.display()))?;
        samples.push(WeatherSample {
            air_temp: number(&record, col("AIR_TEMP")),
            track_temp: number(&record, col("TRACK_TEMP")),
            humidity: number(&record, col("HUMIDITY")),
            pressure: number(&record, col("PRESSURE")),
            wind_speed: number(&record, col("WIND_SPEED")),
            wind_direction: number(&record, col("WIND_DIRECTION")),
            rain: number(&record, col("RAIN")),
        });
    }

    Ok(summarize_weather(&samples))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::TempDir;

    const LAP_TIMES: &str = "\
timestamp,vehicle_id,lap
2025-09-06T18:40:00.000Z,GR86-002-2,1
2025-09-06T18:41:40.000Z,GR86-002-2,2
2025-09-06T18:43:15.500Z,GR86-002-2,32771
2025-09-06T18:43:20.000Z,broken,4
2025-09-06T18:43:20.000Z,GR86-004-7,0
";

    const TELEMETRY: &str = "\
timestamp,lap,vehicle_id,telemetry_name,telemetry_value
2025-09-06T18:40:01.000Z,2,GR86-002-2,Speed,120.5
2025-09-06T18:40:01.000Z,2,GR86-002-2,Laptrigger_lapdist_dls,10
2025-09-06T18:40:01.000Z,2,GR86-002-2,nmot,6500
2025-09-06T18:40:02.000Z,2,GR86-002-2,Speed,
2025-09-06T18:40:02.000Z,3,GR86-002-2,Speed,99
2025-09-06T18:40:02.000Z,2,GR86-004-7,Speed,101
";

    const RESULTS: &str = "\
POS;NUMBER;LAPS;ELAPSED;GAP_FIRST;BEST_LAP_TIME;BEST_LAP_KPH;CLASS
2;22;27;45:17.100;+2.074;1:37.300;136.2;Am
1;13;27;45:15.026;-;1:37.428;136.0;Am
";

    const WEATHER: &str = "\
TIME_UTC_SECONDS;AIR_TEMP;TRACK_TEMP;HUMIDITY;PRESSURE;WIND_SPEED;WIND_DIRECTION;RAIN
1;29.1;0;56;992;5.4;120;0
2;29.5;41.2;55;992;6.0;130;0
";

    fn data_dir() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        let barber = dir.path().join("barber");
        fs::create_dir(&barber).unwrap();
        fs::write(barber.join("R1_barber_lap_time.csv"), LAP_TIMES).unwrap();
        fs::write(barber.join("R1_barber_telemetry_data.csv"), TELEMETRY).unwrap();
        fs::write(barber.join("barber_race2_lap_time.csv"), LAP_TIMES).unwrap();
        fs::write(barber.join("R2_barber_telemetry_data.csv"), TELEMETRY).unwrap();
        fs::write(barber.join("03_Provisional Results_Race 1.CSV"), RESULTS).unwrap();
        fs::write(barber.join("26_Weather_Race 1.CSV"), WEATHER).unwrap();

        // Only one of the two file kinds: not a usable circuit
        let vir = dir.path().join("vir");
        fs::create_dir(&vir).unwrap();
        fs::write(vir.join("R1_vir_lap_time.csv"), LAP_TIMES).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_list_circuits_discovers_races() {
        let dir = data_dir();
        let repository = CsvRepository::new(dir.path());
        let circuits = repository.list_circuits().await.unwrap();
        assert_eq!(circuits.len(), 1);
        assert_eq!(circuits[0].id, "barber");
        assert_eq!(circuits[0].races, vec!["R1", "R2"]);
    }

    #[tokio::test]
    async fn test_missing_data_dir_has_no_circuits() {
        let repository = CsvRepository::new("/nonexistent/apex-replay-data");
        assert!(repository.list_circuits().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lap_events_mask_and_filter() {
        let dir = data_dir();
        let repository = CsvRepository::new(dir.path());
        let events = repository.lap_events("barber", "R1").await.unwrap();

        let laps: Vec<u32> = events.iter().map(|e| e.lap).collect();
        assert_eq!(laps, vec![1, 2, 3]);
        assert_eq!(events[0].vehicle, Vehicle::new("002", 2));
        assert_eq!(events[1].timestamp - events[0].timestamp, 100.0);
    }

    #[tokio::test]
    async fn test_race_spelled_out_in_file_name() {
        let dir = data_dir();
        let repository = CsvRepository::new(dir.path());
        let events = repository.lap_events("barber", "R2").await.unwrap();
        assert_eq!(events.len(), 3);
    }

    #[tokio::test]
    async fn test_lap_samples_grouped_by_vehicle_and_lap() {
        let dir = data_dir();
        let repository = CsvRepository::new(dir.path());
        let samples = repository
            .lap_samples("barber", "R1", &Vehicle::new("002", 2), 2)
            .await
            .unwrap();

        // The engine-speed channel is not read by the analysis
        assert_eq!(samples.len(), 3);
        assert_eq!(&*samples[0].name, "Speed");
        assert!(Arc::ptr_eq(&samples[0].name, &samples[2].name));
        assert_eq!(samples[0].value, Some(120.5));
        assert_eq!(samples[2].value, None);

        let none = repository
            .lap_samples("barber", "R1", &Vehicle::new("002", 2), 9)
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_lap_samples_only_for_requested_vehicle() {
        let dir = data_dir();
        let repository = CsvRepository::new(dir.path());
        let samples = repository
            .lap_samples("barber", "R1", &Vehicle::new("004", 7), 2)
            .await
            .unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value, Some(101.0));
    }

    #[tokio::test]
    async fn test_concurrent_misses_load_once() {
        let cache: LoadOnce<&str, usize> = LoadOnce::new();
        let counter = AtomicUsize::new(0);
        let loads = &counter;
        let load = || async move {
            loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok::<usize, anyhow::Error>(42)
        };

        let (a, b) = tokio::join!(
            cache.get_or_load("file", load),
            cache.get_or_load("file", load)
        );
        assert_eq!((*a.unwrap(), *b.unwrap()), (42, 42));
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        cache.clear().await;
        cache.get_or_load("file", load).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_load_is_retried() {
        let cache: LoadOnce<&str, usize> = LoadOnce::new();
        let failed = cache
            .get_or_load("file", || async {
                Err::<usize, _>(anyhow::anyhow!("file locked"))
            })
            .await;
        assert!(failed.is_err());
        let loaded = cache
            .get_or_load("file", || async { Ok::<usize, anyhow::Error>(7) })
            .await;
        assert_eq!(*loaded.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_session_context_from_side_files() {
        let dir = data_dir();
        let repository = CsvRepository::new(dir.path());
        let context = repository.session_context("barber", "R1").await.unwrap();

        let results = context.race_results.unwrap();
        assert_eq!(results.source, "03_Provisional Results_Race 1.CSV");
        assert_eq!(results.overall.number.as_deref(), Some("13"));
        assert_eq!(results.best_lap.unwrap().number.as_deref(), Some("22"));
        assert_eq!(results.classes[0].top.len(), 2);

        let weather = context.weather.unwrap();
        let air = weather.air_temp.unwrap();
        assert_eq!((air.min, air.max), (29.1, 29.5));
        // Zero track temperature is a dropout
        assert_eq!(weather.track_temp.unwrap().min, 41.2);
        assert_eq!(weather.wind_direction, Some(125.0));
        assert!(!weather.rain);

        // Race 2 has no side files
        assert_eq!(
            repository.session_context("barber", "R2").await.unwrap(),
            SessionContext::default()
        );
    }

    #[tokio::test]
    async fn test_results_without_classification_are_absent() {
        let dir = data_dir();
        fs::write(
            dir.path().join("barber").join("03_Provisional Results_Race 1.CSV"),
            "NUMBER;LAPS\n13;27\n",
        )
        .unwrap();
        let repository = CsvRepository::new(dir.path());
        let context = repository.session_context("barber", "R1").await.unwrap();
        assert!(context.race_results.is_none());
        assert!(context.weather.is_some());
    }

    #[tokio::test]
    async fn test_unknown_circuit() {
        let dir = data_dir();
        let repository = CsvRepository::new(dir.path());
        let err = repository.lap_events("monaco", "R1").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::UnknownCircuit(_))
        ));

        let err = repository.lap_events("../barber", "R1").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::InputMalformed(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_vehicle_column() {
        let dir = data_dir();
        fs::write(
            dir.path().join("barber").join("R1_barber_lap_time.csv"),
            "timestamp,lap\n2025-09-06T18:40:00Z,1\n",
        )
        .unwrap();
        let repository = CsvRepository::new(dir.path());
        let err = repository.lap_events("barber", "R1").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AnalysisError>(),
            Some(AnalysisError::MissingColumn { column, .. }) if column == "vehicle_id"
        ));
    }

    #[tokio::test]
    async fn test_cache_until_cleared() {
        let dir = data_dir();
        let repository = CsvRepository::new(dir.path());
        assert_eq!(repository.lap_events("barber", "R1").await.unwrap().len(), 3);

        fs::write(
            dir.path().join("barber").join("R1_barber_lap_time.csv"),
            "timestamp,vehicle_id,lap\n2025-09-06T18:40:00Z,GR86-002-2,1\n",
        )
        .unwrap();
        assert_eq!(repository.lap_events("barber", "R1").await.unwrap().len(), 3);

        repository.clear_cache().await;
        assert_eq!(repository.lap_events("barber", "R1").await.unwrap().len(), 1);
    }

    #[test]
    fn test_race_tokens() {
        assert_eq!(race_tokens("R1"), vec!["race 1", "r1", "race1"]);
        assert!(race_tokens(" ").is_empty());
        assert_eq!(race_id("barber_R2_telemetry"), Some("R2".to_string()));
        assert_eq!(race_id("barber_telemetry"), None);
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("1970-01-01T00:01:40Z"), Some(100.0));
        assert_eq!(parse_timestamp("1970-01-01 00:01:40.500"), Some(100.5));
        assert_eq!(parse_timestamp("42.25"), Some(42.25));
        assert_eq!(parse_timestamp("yesterday"), None);
    }
}
