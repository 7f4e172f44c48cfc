// Domain layer - Value types and the telemetry analysis engine
pub mod analysis;
pub mod circuit;
pub mod coach;
pub mod error;
pub mod lap;
pub mod report;
pub mod session;
pub mod telemetry;
pub mod units;
