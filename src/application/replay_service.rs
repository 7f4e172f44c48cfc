// Replay service - Progressive preparation of multi-car lap replays
use crate::application::golden_lap_service::GoldenLapService;
use crate::application::lap_catalog::LapCatalog;
use crate::application::vehicle_service::VehicleService;
use crate::domain::analysis::replay::{CarState, Timeline, build_timeline, commentary};
use crate::domain::lap::{GoldenLap, Vehicle, VehicleSummary};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

const DEFAULT_CAR_COLOR: &str = "#ffffff";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplaySetup {
    pub golden_lap: Option<GoldenLap>,
    pub vehicles: Vec<VehicleSummary>,
}

/// One car the client wants on track.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReplayLap {
    pub chassis: String,
    pub car_number: u32,
    pub lap: u32,
    pub name: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LapTimeline {
    /// Position of the lap in the request
    pub index: usize,
    pub circuit: String,
    pub chassis: String,
    pub car_number: u32,
    pub lap: u32,
    pub name: String,
    pub color: String,
    #[serde(flatten)]
    pub timeline: Timeline,
}

/// Messages of a replay preparation stream, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReplayMessage {
    Timeline(Box<LapTimeline>),
    Skipped { index: usize, reason: String },
    Complete { timelines: usize, duration_ms: u64 },
}

#[derive(Clone)]
pub struct ReplayService {
    catalog: LapCatalog,
    golden: GoldenLapService,
    vehicles: VehicleService,
    max_points: usize,
}

impl ReplayService {
    pub fn new(
        catalog: LapCatalog,
        golden: GoldenLapService,
        vehicles: VehicleService,
        max_points: usize,
    ) -> Self {
        Self {
            catalog,
            golden,
            vehicles,
            max_points,
        }
    }

    pub async fn setup(&self, circuit: &str, race: &str) -> anyhow::Result<ReplaySetup> {
        let golden_lap = self
            .golden
            .golden_lap(circuit, race)
            .await?
            .map(|golden| golden.info);
        let vehicles = self.vehicles.list_vehicles(circuit, race).await?;
        Ok(ReplaySetup {
            golden_lap,
            vehicles,
        })
    }

    /// Build each requested timeline in its own task and stream them back
    /// as they finish. A completion message closes the stream.
    pub fn prepare(
        &self,
        circuit: &str,
        race: &str,
        laps: Vec<ReplayLap>,
    ) -> mpsc::Receiver<ReplayMessage> {
        let (tx, rx) = mpsc::channel(16);
        let started = Instant::now();

        let mut tasks = JoinSet::new();
        for (index, request) in laps.into_iter().enumerate() {
            let tx = tx.clone();
            let catalog = self.catalog.clone();
            let circuit = circuit.to_string();
            let race = race.to_string();
            let max_points = self.max_points;

            tasks.spawn(async move {
                let timeline =
                    lap_timeline(&catalog, &circuit, &race, index, request, max_points).await;
                let message = match timeline {
                    Ok(Some(timeline)) => ReplayMessage::Timeline(Box::new(timeline)),
                    Ok(None) => ReplayMessage::Skipped {
                        index,
                        reason: "no telemetry".to_string(),
                    },
                    Err(e) => {
                        warn!("Failed to prepare replay lap {}: {:#}", index, e);
                        ReplayMessage::Skipped {
                            index,
                            reason: e.to_string(),
                        }
                    }
                };
                let delivered = matches!(message, ReplayMessage::Timeline(_));
                let _ = tx.send(message).await;
                delivered
            });
        }

        tokio::spawn(async move {
            let mut timelines = 0;
            while let Some(joined) = tasks.join_next().await {
                if matches!(joined, Ok(true)) {
                    timelines += 1;
                }
            }
            let duration_ms = started.elapsed().as_millis() as u64;
            debug!("Replay prepared: {} timelines in {} ms", timelines, duration_ms);
            let _ = tx
                .send(ReplayMessage::Complete {
                    timelines,
                    duration_ms,
                })
                .await;
        });

        rx
    }

    pub fn commentary(&self, cars: &[CarState], current_time: f64) -> Option<String> {
        commentary(cars, current_time)
    }
}

async fn lap_timeline(
    catalog: &LapCatalog,
    circuit: &str,
    race: &str,
    index: usize,
    request: ReplayLap,
    max_points: usize,
) -> anyhow::Result<Option<LapTimeline>> {
    let vehicle = Vehicle::new(request.chassis.clone(), request.car_number);
    let points = catalog
        .replay_telemetry(circuit, race, &vehicle, request.lap)
        .await?;
    let Some(timeline) = build_timeline(&points, max_points) else {
        return Ok(None);
    };

    Ok(Some(LapTimeline {
        index,
        circuit: circuit.to_string(),
        name: request
            .name
            .unwrap_or_else(|| format!("Car {}", request.car_number)),
        color: request
            .color
            .unwrap_or_else(|| DEFAULT_CAR_COLOR.to_string()),
        chassis: request.chassis,
        car_number: request.car_number,
        lap: request.lap,
        timeline,
    }))
}
