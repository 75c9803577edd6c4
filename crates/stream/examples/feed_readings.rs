//! Publishes a bounds config and a short series of readings.
//!
//! Assumes JetStream streams already capture `config.climatecore` and
//! `sensors.>`:
//!
//! ```text
//! nats stream add climatecore_config --subjects config.climatecore --defaults
//! nats stream add sensors_environmental --subjects 'sensors.>' --defaults
//! cargo run -p climatecore-stream --example feed_readings
//! ```

use std::time::Duration;

use climatecore_stream::{subject, StreamManager};
use serde_json::json;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    let server = std::env::var("CLIMATECORE_NATS_SERVER")
        .unwrap_or_else(|_| "nats://localhost:4222".to_string());
    let instance = StreamManager::new(server)?.connect().await?;
    let publisher = instance.publisher();

    publisher
        .publish(
            "config.climatecore",
            &json!({ "co2": { "min": 400.0, "max": 1000.0 } }),
        )
        .await?;
    info!("Published bounds config");

    let reading_subject = subject::join("sensors.co2", "bedroom");
    for value in [800.0, 1200.0, 1350.0, 900.0] {
        tokio::time::sleep(Duration::from_millis(500)).await;
        publisher
            .publish(
                &reading_subject,
                &json!({
                    "name": "co2",
                    "device_id": "demo-1",
                    "location": "bedroom",
                    "value": value,
                }),
            )
            .await?;
        info!("Published co2 = {} on {}", value, reading_subject);
    }

    instance.shutdown().await?;
    Ok(())
}
