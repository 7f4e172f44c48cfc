// Vehicle service - Use case for listing vehicles and their laps
use crate::application::lap_catalog::LapCatalog;
use crate::domain::lap::{LapListing, Vehicle, VehicleSummary};
use std::collections::BTreeMap;

#[derive(Clone)]
pub struct VehicleService {
    catalog: LapCatalog,
}

impl VehicleService {
    pub fn new(catalog: LapCatalog) -> Self {
        Self { catalog }
    }

    /// Vehicles with at least one valid lap, ordered by chassis then car number.
    pub async fn list_vehicles(
        &self,
        circuit: &str,
        race: &str,
    ) -> anyhow::Result<Vec<VehicleSummary>> {
        let mut laps_per_vehicle: BTreeMap<Vehicle, usize> = BTreeMap::new();
        for lap in self.catalog.lap_times(circuit, race).await? {
            *laps_per_vehicle.entry(lap.vehicle).or_default() += 1;
        }

        Ok(laps_per_vehicle
            .into_iter()
            .map(|(vehicle, total_laps)| VehicleSummary {
                chassis: vehicle.chassis,
                car_number: vehicle.car_number,
                total_laps,
            })
            .collect())
    }

    pub async fn list_laps(
        &self,
        circuit: &str,
        race: &str,
        vehicle: &Vehicle,
    ) -> anyhow::Result<Vec<LapListing>> {
        Ok(self
            .catalog
            .vehicle_lap_times(circuit, race, vehicle)
            .await?
            .into_iter()
            .map(|lap| LapListing {
                formatted_time: lap.formatted(),
                lap_number: lap.lap_number,
                lap_time: lap.lap_time,
            })
            .collect())
    }
}
