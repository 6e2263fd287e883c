use async_trait::async_trait;

use crate::domain::entities::ForwardingAttempt;
use crate::domain::value_objects::HealthStatus;

/// Port for judging whether a forwarding attempt carries data
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn check(&self, attempt: &ForwardingAttempt) -> HealthStatus;
}
