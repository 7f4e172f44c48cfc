// Repository trait for lap timing and telemetry access
use crate::domain::circuit::Circuit;
use crate::domain::lap::{LapEvent, Vehicle};
use crate::domain::session::SessionContext;
use crate::domain::telemetry::ChannelSample;
use async_trait::async_trait;

#[async_trait]
pub trait LapRepository: Send + Sync {
    /// Circuits with both telemetry and lap-timing data, with their races
    async fn list_circuits(&self) -> anyhow::Result<Vec<Circuit>>;

    /// Every lap-completion event of a race, all vehicles
    async fn lap_events(&self, circuit: &str, race: &str) -> anyhow::Result<Vec<LapEvent>>;

    /// Long-format telemetry samples of one lap. Empty when the logger
    /// recorded nothing for it.
    async fn lap_samples(
        &self,
        circuit: &str,
        race: &str,
        vehicle: &Vehicle,
        lap: u32,
    ) -> anyhow::Result<Vec<ChannelSample>>;

    /// Classification and weather of a race, from the side files logged
    /// next to the telemetry. Missing or unreadable files leave their part
    /// empty.
    async fn session_context(&self, circuit: &str, race: &str) -> anyhow::Result<SessionContext>;

    /// Drop anything parsed so far; the next call rereads the source files
    async fn clear_cache(&self);
}
