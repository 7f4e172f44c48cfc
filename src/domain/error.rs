// Domain errors. Missing data is not an error here: laps without telemetry,
// absent golden laps and non-overlapping traces are reported as values.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Circuit not found: {0}")]
    UnknownCircuit(String),

    #[error("No lap data available for {circuit} {race}")]
    NoLapData { circuit: String, race: String },

    #[error("Lap {lap} not found for chassis {chassis}, car {car_number}")]
    LapNotFound {
        chassis: String,
        car_number: u32,
        lap: u32,
    },

    #[error("Missing column '{column}' in {file}")]
    MissingColumn { column: String, file: String },

    #[error("Invalid vehicle id: {0}")]
    InvalidVehicleId(String),

    #[error("Malformed input: {0}")]
    InputMalformed(String),
}
