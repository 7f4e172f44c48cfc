// In-memory collaborators for service tests
use crate::application::coach::CoachClient;
use crate::application::lap_repository::LapRepository;
use crate::domain::circuit::Circuit;
use crate::domain::coach::{CoachPayload, CoachReply};
use crate::domain::error::AnalysisError;
use crate::domain::lap::{LapEvent, Vehicle};
use crate::domain::session::SessionContext;
use crate::domain::telemetry::ChannelSample;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

pub const CIRCUIT: &str = "barber";
pub const RACE: &str = "R1";
const LAP_START_TS: f64 = 1_700_000_000.0;

/// One race at one circuit, built lap by lap.
#[derive(Default)]
pub struct FakeRepository {
    events: Vec<LapEvent>,
    samples: HashMap<(Vehicle, u32), Vec<ChannelSample>>,
    last_event: HashMap<Vehicle, (f64, u32)>,
    unreadable: HashSet<(Vehicle, u32)>,
    session: SessionContext,
    /// When set, every lap-event read waits for a permit.
    pub event_gate: Option<Arc<Semaphore>>,
    pub event_reads: AtomicUsize,
    pub sample_reads: AtomicUsize,
    pub clears: AtomicUsize,
}

impl FakeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next lap of a car with telemetry following `speed` over 0..=1000 m.
    pub fn lap(self, vehicle: &Vehicle, lap_time: f64, speed: fn(f64) -> f64) -> Self {
        self.push_lap(vehicle, lap_time, Some(speed))
    }

    pub fn lap_without_telemetry(self, vehicle: &Vehicle, lap_time: f64) -> Self {
        self.push_lap(vehicle, lap_time, None)
    }

    /// Reading the telemetry of this lap fails.
    pub fn unreadable_lap(mut self, vehicle: &Vehicle, lap: u32) -> Self {
        self.unreadable.insert((vehicle.clone(), lap));
        self
    }

    pub fn session(mut self, session: SessionContext) -> Self {
        self.session = session;
        self
    }

    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.event_gate = Some(gate);
        self
    }

    fn push_lap(
        mut self,
        vehicle: &Vehicle,
        lap_time: f64,
        speed: Option<fn(f64) -> f64>,
    ) -> Self {
        let (ts, lap) = match self.last_event.get(vehicle) {
            Some(last) => *last,
            None => {
                // Crossing the line to start lap 1
                self.events.push(LapEvent {
                    timestamp: LAP_START_TS,
                    vehicle: vehicle.clone(),
                    lap: 1,
                });
                (LAP_START_TS, 1)
            }
        };

        let (ts, lap) = (ts + lap_time, lap + 1);
        self.events.push(LapEvent {
            timestamp: ts,
            vehicle: vehicle.clone(),
            lap,
        });
        if let Some(speed) = speed {
            self.samples
                .insert((vehicle.clone(), lap), lap_samples(ts, speed));
        }
        self.last_event.insert(vehicle.clone(), (ts, lap));
        self
    }
}

/// Telemetry every 10 m over a 1000 m lap.
pub fn lap_samples(start_ts: f64, speed: fn(f64) -> f64) -> Vec<ChannelSample> {
    (0..=100)
        .flat_map(|i| {
            let distance = i as f64 * 10.0;
            let ts = start_ts + i as f64 * 0.1;
            [
                ChannelSample::new(ts, "Laptrigger_lapdist_dls", Some(distance)),
                ChannelSample::new(ts, "Speed", Some(speed(distance))),
                ChannelSample::new(ts, "aps", Some(100.0)),
                ChannelSample::new(ts, "VBOX_Long_Minutes", Some(-86.6 + distance * 1e-5)),
                ChannelSample::new(ts, "VBOX_Lat_Min", Some(33.5)),
            ]
        })
        .collect()
}

#[async_trait]
impl LapRepository for FakeRepository {
    async fn list_circuits(&self) -> anyhow::Result<Vec<Circuit>> {
        Ok(vec![Circuit::new(CIRCUIT.to_string(), vec![RACE.to_string()])])
    }

    async fn lap_events(&self, circuit: &str, _race: &str) -> anyhow::Result<Vec<LapEvent>> {
        self.event_reads.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.event_gate {
            drop(gate.acquire().await?);
        }
        if circuit != CIRCUIT {
            return Err(AnalysisError::UnknownCircuit(circuit.to_string()).into());
        }
        Ok(self.events.clone())
    }

    async fn lap_samples(
        &self,
        _circuit: &str,
        _race: &str,
        vehicle: &Vehicle,
        lap: u32,
    ) -> anyhow::Result<Vec<ChannelSample>> {
        self.sample_reads.fetch_add(1, Ordering::SeqCst);
        if self.unreadable.contains(&(vehicle.clone(), lap)) {
            anyhow::bail!("telemetry of lap {} is truncated", lap);
        }
        Ok(self
            .samples
            .get(&(vehicle.clone(), lap))
            .cloned()
            .unwrap_or_default())
    }

    async fn session_context(
        &self,
        circuit: &str,
        _race: &str,
    ) -> anyhow::Result<SessionContext> {
        if circuit != CIRCUIT {
            return Err(AnalysisError::UnknownCircuit(circuit.to_string()).into());
        }
        Ok(self.session.clone())
    }

    async fn clear_cache(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }
}

/// Coach that answers after an optional delay, or fails.
pub struct FakeCoach {
    pub delay: Duration,
    pub fail: bool,
    pub payloads: Mutex<Vec<CoachPayload>>,
}

impl FakeCoach {
    pub fn answering() -> Self {
        Self {
            delay: Duration::ZERO,
            fail: false,
            payloads: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::answering()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::answering()
        }
    }
}

#[async_trait]
impl CoachClient for FakeCoach {
    async fn coach(&self, payload: &CoachPayload) -> anyhow::Result<CoachReply> {
        self.payloads.lock().unwrap().push(payload.clone());
        tokio::time::sleep(self.delay).await;
        if self.fail {
            anyhow::bail!("coach unavailable");
        }
        Ok(CoachReply {
            summary: "Brake later into turn 5".to_string(),
            recommendations: Vec::new(),
            race_brief: None,
            track_insights: Vec::new(),
        })
    }
}
