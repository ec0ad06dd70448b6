use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::client::{Client, ClientFuture, FetchError};
use crate::{ContentItem, ProviderId, UtcDateTime, ValidationError};

/// Simulated backend characteristics for [`SampleProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleBehavior {
    /// Fixed delay applied to every call.
    pub latency_ms: u64,
    /// Upper bound of an additional random delay.
    pub jitter_ms: u64,
    /// Probability in `[0, 1]` that a call fails.
    pub failure_rate: f64,
}

impl SampleBehavior {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(ValidationError::InvalidFailureRate {
                value: self.failure_rate.to_string(),
            });
        }
        Ok(())
    }

    fn delay(&self) -> Duration {
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            fastrand::u64(0..=self.jitter_ms)
        };
        Duration::from_millis(self.latency_ms.saturating_add(jitter))
    }

    fn should_fail(&self) -> bool {
        self.failure_rate > 0.0 && fastrand::f64() < self.failure_rate
    }
}

/// In-process provider that generates placeholder content.
///
/// Every item is stamped with the provider's own id, so the merged output shows
/// which slot (or fallback) produced it.
#[derive(Debug, Clone)]
pub struct SampleProvider {
    source: ProviderId,
    behavior: SampleBehavior,
}

impl SampleProvider {
    pub fn new(source: ProviderId) -> Self {
        Self {
            source,
            behavior: SampleBehavior::default(),
        }
    }

    pub fn with_behavior(source: ProviderId, behavior: SampleBehavior) -> Self {
        Self { source, behavior }
    }

    pub fn source(&self) -> &ProviderId {
        &self.source
    }

    fn item(&self, query: &str, index: usize) -> ContentItem {
        let id = Uuid::new_v4().to_string();
        let expiry = UtcDateTime::now().saturating_add(time::Duration::hours(1));
        ContentItem::new(
            id.clone(),
            format!("{} #{} from provider {}", query, index + 1, self.source),
            self.source.clone(),
            format!("Sample content generated by provider {}", self.source),
            format!("https://content.example/{}/{}", self.source, id),
            expiry,
        )
    }
}

impl Client for SampleProvider {
    fn fetch<'a>(&'a self, query: &'a str, limit: usize) -> ClientFuture<'a> {
        Box::pin(async move {
            let delay = self.behavior.delay();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            if self.behavior.should_fail() {
                return Err(FetchError::unavailable(format!(
                    "sample provider '{}' simulated an outage",
                    self.source
                ))
                .with_provider(self.source.clone()));
            }

            Ok((0..limit)
                .map(|index| self.item(query, index))
                .collect::<Vec<_>>())
        })
    }
}
