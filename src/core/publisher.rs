//! Alert publishing seam.

use climatecore_stream::{subject, Publisher, StreamError};

use super::schema::AlertEvent;

#[async_trait::async_trait]
pub trait AlertPublisher: Send + Sync {
    async fn publish(&self, subject: &str, event: &AlertEvent) -> Result<(), StreamError>;
}

#[async_trait::async_trait]
impl AlertPublisher for Publisher {
    async fn publish(&self, subject: &str, event: &AlertEvent) -> Result<(), StreamError> {
        Publisher::publish(self, subject, event).await
    }
}

/// `<prefix>.<sensor name>`
pub fn alert_subject(prefix: &str, sensor: &str) -> String {
    subject::join(prefix, sensor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_subject() {
        assert_eq!(alert_subject("alerts.climatecore", "co2"), "alerts.climatecore.co2");
        assert_eq!(alert_subject("alerts.climatecore.", "co2"), "alerts.climatecore.co2");
        assert_eq!(alert_subject("", "co2"), "co2");
    }
}
