// Circuit service - Use case for listing circuits
use crate::application::lap_repository::LapRepository;
use crate::domain::circuit::{CircuitInfo, CircuitMetadata};
use crate::domain::error::AnalysisError;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone)]
pub struct CircuitService {
    repository: Arc<dyn LapRepository>,
    catalog: Arc<HashMap<String, CircuitMetadata>>,
}

impl CircuitService {
    pub fn new(
        repository: Arc<dyn LapRepository>,
        catalog: HashMap<String, CircuitMetadata>,
    ) -> Self {
        Self {
            repository,
            catalog: Arc::new(catalog),
        }
    }

    pub async fn list_circuits(&self) -> anyhow::Result<Vec<CircuitInfo>> {
        let mut circuits: Vec<CircuitInfo> = self
            .repository
            .list_circuits()
            .await?
            .iter()
            .map(|c| CircuitInfo::merge(c, self.catalog.get(&c.id), false))
            .collect();
        circuits.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(circuits)
    }

    pub async fn get_circuit(&self, id: &str) -> anyhow::Result<CircuitInfo> {
        let circuits = self.repository.list_circuits().await?;
        let circuit = circuits
            .iter()
            .find(|c| c.id == id)
            .ok_or_else(|| AnalysisError::UnknownCircuit(id.to_string()))?;
        Ok(CircuitInfo::merge(circuit, self.catalog.get(id), true))
    }
}
