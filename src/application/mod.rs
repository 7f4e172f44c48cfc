// Application layer - Use cases and the ports they depend on
pub mod analysis_service;
pub mod circuit_service;
pub mod coach;
pub mod golden_lap_service;
pub mod lap_catalog;
pub mod lap_repository;
pub mod replay_service;
pub mod vehicle_service;

#[cfg(test)]
pub mod testing;
