// Circuit domain model
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GpsFix {
    pub lat: f64,
    pub lon: f64,
}

/// Static display metadata for a circuit, loaded from the circuit catalog.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct CircuitMetadata {
    pub name: Option<String>,
    pub location: Option<String>,
    pub length_miles: Option<f64>,
    pub length_km: Option<f64>,
    pub sectors: Option<u32>,
    pub finish_line_gps: Option<GpsFix>,
}

/// A circuit discovered in the data directory.
#[derive(Debug, Clone, PartialEq)]
pub struct Circuit {
    pub id: String,
    pub name: String,
    pub races: Vec<String>,
}

impl Circuit {
    pub fn new(id: String, races: Vec<String>) -> Self {
        let name = Self::format_name(&id);
        Self { id, name, races }
    }

    fn format_name(id: &str) -> String {
        // Convert "road_america" to "Road America"
        id.split(['_', '-'])
            .filter(|w| !w.is_empty())
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => {
                        first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                    }
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitInfo {
    pub id: String,
    pub name: String,
    pub length_miles: Option<f64>,
    pub length_km: Option<f64>,
    pub sectors: Option<u32>,
    pub races: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_line_gps: Option<GpsFix>,
}

impl CircuitInfo {
    /// Merge a discovered circuit with its catalog entry. `extended` adds the
    /// location and finish-line fields used by the detail view.
    pub fn merge(circuit: &Circuit, metadata: Option<&CircuitMetadata>, extended: bool) -> Self {
        let meta = metadata.cloned().unwrap_or_default();
        Self {
            id: circuit.id.clone(),
            name: meta.name.unwrap_or_else(|| circuit.name.clone()),
            length_miles: meta.length_miles,
            length_km: meta.length_km,
            sectors: meta.sectors,
            races: circuit.races.clone(),
            location: if extended { meta.location } else { None },
            finish_line_gps: if extended { meta.finish_line_gps } else { None },
        }
    }
}
