// Coaching-text collaborator seam
use crate::domain::coach::{CoachPayload, CoachReply};
use async_trait::async_trait;

#[async_trait]
pub trait CoachClient: Send + Sync {
    /// Turn the numeric summary of an analysis into coaching text
    async fn coach(&self, payload: &CoachPayload) -> anyhow::Result<CoachReply>;
}
