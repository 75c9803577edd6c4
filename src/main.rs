use std::{
    process,
    sync::{Arc, OnceLock},
};

use climatecore::{
    config::{
        engine::{EngineConfig, HysteresisMode},
        Config,
    },
    core::{
        bounds::BoundsTable,
        engine::AlertingEngine,
        error::EngineError,
        hysteresis::{GlobalHysteresis, HysteresisTracker, SubjectHysteresis},
        listener::ConfigListener,
    },
    logger::LoggerManager,
    print_error,
};
use climatecore_stream::{ConsumerSpec, DeliveryPolicy, StreamManager};
use tracing::{debug, error, info};

static CONFIG: OnceLock<Config> = OnceLock::new();

const LISTENER: &str = "Config listener";
const ENGINE: &str = "Alerting engine";

pub fn config() -> &'static Config {
    CONFIG.get_or_init(|| {
        Config::new().unwrap_or_else(|e| {
            print_error!("{}", e);
            process::exit(1);
        })
    })
}

fn build_tracker(engine: &EngineConfig) -> Result<Box<dyn HysteresisTracker>, EngineError> {
    match (engine.hysteresis, &engine.state_file) {
        (HysteresisMode::Subject, _) => Ok(Box::new(SubjectHysteresis::new())),
        (HysteresisMode::Global, Some(path)) => {
            info!("Global hysteresis persisted to {}", path.display());
            Ok(Box::new(GlobalHysteresis::load(path)?))
        }
        (HysteresisMode::Global, None) => {
            info!("Global hysteresis kept in memory");
            Ok(Box::new(GlobalHysteresis::new()))
        }
    }
}

fn sensor_consumer_spec(engine: &EngineConfig) -> ConsumerSpec {
    let spec = ConsumerSpec::stream(&engine.sensor_stream, engine.sensor_delivery.into());
    match &engine.durable_name {
        Some(name) => spec.durable(name),
        None => spec,
    }
}

type TaskResult = Result<Result<(), EngineError>, tokio::task::JoinError>;

/// Logs how a worker task ended; `true` when it stopped cleanly.
fn report_exit(name: &'static str, result: TaskResult) -> bool {
    match result {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            error!("{} exited with error: {}", name, e);
            false
        }
        Err(e) => {
            error!("{}: {}", EngineError::TaskAborted(name), e);
            false
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config();
    let mut logger_manager = LoggerManager::new(cfg.logger.clone()).unwrap_or_else(|e| {
        print_error!("Failed to setup Log Manager: {}", e);
        process::exit(1);
    });
    logger_manager.init().unwrap_or_else(|e| {
        print_error!("Failed to init Log Manager: {}", e);
        process::exit(1);
    });
    info!("Starting climatecore version {}...", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", cfg.logger.level);
    debug!("{:#?}", cfg.engine);

    let tracker = build_tracker(&cfg.engine).unwrap_or_else(|e| {
        error!("Failed to set up hysteresis state: {}", e);
        process::exit(1);
    });

    let instance = StreamManager::from_config(cfg.transport.clone())
        .unwrap_or_else(|e| {
            error!("Failed to create StreamManager: {}", e);
            process::exit(1);
        })
        .connect()
        .await
        .unwrap_or_else(|e| {
            error!("Failed to connect to {}: {}", cfg.transport.server, e);
            process::exit(1);
        });

    info!("Broker connection: {}", instance.current_state());
    let monitor = instance.supervisor().monitor();
    info!("State monitoring started");

    let config_consumer = instance
        .pull_consumer(&ConsumerSpec::subject(
            &cfg.engine.config_subject,
            DeliveryPolicy::Last,
        ))
        .await
        .unwrap_or_else(|e| {
            error!(
                "Failed to subscribe to config subject '{}': {}",
                cfg.engine.config_subject, e
            );
            process::exit(1);
        });

    let sensor_consumer = instance
        .pull_consumer(&sensor_consumer_spec(&cfg.engine))
        .await
        .unwrap_or_else(|e| {
            error!(
                "Failed to subscribe to sensor stream '{}': {}",
                cfg.engine.sensor_stream, e
            );
            process::exit(1);
        });
    debug!(
        "Consuming readings from stream '{}' ({:?})",
        sensor_consumer.stream_name(),
        cfg.engine.sensor_delivery
    );

    let table = BoundsTable::new();
    let cancel = instance.cancel_token().child_token();

    let listener = ConfigListener::new(
        Arc::new(config_consumer),
        table.clone(),
        &cfg.engine,
        cfg.transport.retry_backoff(),
    );
    let engine = AlertingEngine::new(
        Arc::new(sensor_consumer),
        Arc::new(instance.publisher()),
        table,
        &cfg.engine,
        cfg.transport.retry_backoff(),
    )
    .with_tracker(tracker);

    let mut listener_task = tokio::spawn(listener.run(cancel.clone()));
    let mut engine_task = tokio::spawn(engine.run(cancel.clone()));

    let early_exit = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, initiating graceful shutdown...");
            None
        }
        result = &mut listener_task => Some((LISTENER, result)),
        result = &mut engine_task => Some((ENGINE, result)),
    };
    cancel.cancel();

    let mut healthy = match early_exit {
        None => {
            let listener_ok = report_exit(LISTENER, listener_task.await);
            let engine_ok = report_exit(ENGINE, engine_task.await);
            listener_ok && engine_ok
        }
        Some((name, result)) => {
            if report_exit(name, result) {
                error!("{} unexpectedly finished", name);
            }
            let (other, handle) = if name == LISTENER {
                (ENGINE, engine_task)
            } else {
                (LISTENER, listener_task)
            };
            report_exit(other, handle.await);
            false
        }
    };

    if let Err(e) = instance.shutdown().await {
        error!("Stream shutdown failed: {}", e);
        healthy = false;
    }
    let _ = monitor.await;
    info!("Shutdown complete");

    if !healthy {
        process::exit(1);
    }
    Ok(())
}
