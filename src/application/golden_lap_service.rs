// Golden lap service - Memoized reference lap per circuit and race
use crate::application::lap_catalog::LapCatalog;
use crate::domain::analysis::golden::{rank_by_lap_time, select_golden_lap};
use crate::domain::lap::{GoldenLap, Lap};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

type RaceKey = (String, String);

/// The golden lap together with its normalized telemetry.
#[derive(Debug, Clone, PartialEq)]
pub struct GoldenReference {
    pub info: GoldenLap,
    pub lap: Arc<Lap>,
}

/// Memoized golden laps. `generation` moves on every invalidation so a
/// search that started before it does not store its result.
#[derive(Default)]
struct GoldenCache {
    generation: u64,
    laps: HashMap<RaceKey, Option<GoldenReference>>,
}

#[derive(Clone)]
pub struct GoldenLapService {
    catalog: LapCatalog,
    cache: Arc<RwLock<GoldenCache>>,
}

impl GoldenLapService {
    pub fn new(catalog: LapCatalog) -> Self {
        Self {
            catalog,
            cache: Arc::new(RwLock::new(GoldenCache::default())),
        }
    }

    /// Golden lap of a race, or `None` when no lap has usable telemetry.
    pub async fn golden_lap(
        &self,
        circuit: &str,
        race: &str,
    ) -> anyhow::Result<Option<GoldenReference>> {
        let key = (circuit.to_string(), race.to_string());
        let generation = {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.laps.get(&key) {
                return Ok(cached.clone());
            }
            cache.generation
        };

        let reference = self.find(circuit, race).await?;
        let mut cache = self.cache.write().await;
        if cache.generation == generation {
            cache.laps.insert(key, reference.clone());
        } else {
            debug!("Data reloaded during golden lap search for {} {}", circuit, race);
        }
        Ok(reference)
    }

    async fn find(&self, circuit: &str, race: &str) -> anyhow::Result<Option<GoldenReference>> {
        let lap_times = self.catalog.lap_times(circuit, race).await?;

        // Load laps fastest first until one has telemetry
        let mut loaded = Vec::new();
        for candidate in rank_by_lap_time(&lap_times, |l| l.lap_time) {
            let lap = match self.catalog.load_lap(circuit, race, candidate).await {
                Ok(lap) => lap,
                Err(e) => {
                    warn!(
                        "Skipping lap {} of {}/{} for golden lap: {:#}",
                        candidate.lap_number,
                        candidate.vehicle.chassis,
                        candidate.vehicle.car_number,
                        e
                    );
                    continue;
                }
            };
            let usable = lap.has_telemetry();
            if !usable {
                warn!(
                    "Skipping lap {} of {}/{} for golden lap: no telemetry",
                    candidate.lap_number, candidate.vehicle.chassis, candidate.vehicle.car_number
                );
            }
            loaded.push((candidate, lap));
            if usable {
                break;
            }
        }

        let laps: Vec<Lap> = loaded.iter().map(|(_, lap)| lap.clone()).collect();
        let Some(golden) = select_golden_lap(&laps) else {
            warn!("No golden lap with telemetry for {} {}", circuit, race);
            return Ok(None);
        };
        let Some((lap_time, _)) = loaded.iter().find(|(_, lap)| lap.key == golden.key) else {
            return Ok(None);
        };

        let info = GoldenLap::from_lap_time(circuit, race, lap_time);
        info!(
            "Golden lap for {} {}: car {} lap {} in {}",
            circuit, race, info.car_number, info.lap, info.formatted_time
        );
        Ok(Some(GoldenReference {
            info,
            lap: Arc::new(golden.clone()),
        }))
    }

    /// Forget every memoized golden lap
    pub async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        cache.laps.clear();
        cache.generation += 1;
    }
}
