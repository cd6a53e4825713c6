//! Desktop simulator for the airlog telemetry agent.
//!
//! Runs the real agent loop against file-backed storage, a synthetic sensor
//! and an uplink that drops out on a schedule, so buffering, restart
//! recovery and ordered redelivery can be watched in the log.
//!
//! # Environment
//!
//! Variables are read from the process environment, after loading `.env` if
//! one exists.
//!
//! | Variable                     | Default                   |
//! |------------------------------|---------------------------|
//! | `AIRLOG_DEVICE_ID`           | `sim-01`                  |
//! | `AIRLOG_TOPIC`               | `devices/<id>/events`     |
//! | `AIRLOG_ENDPOINT`            | `localhost:8883`          |
//! | `AIRLOG_WIFI_SSID`           | empty                     |
//! | `AIRLOG_WIFI_PASSWORD`       | empty                     |
//! | `AIRLOG_DATA_DIR`            | `./airlog-data`           |
//! | `AIRLOG_SEND_INTERVAL_SECS`  | `30`                      |
//! | `AIRLOG_RUN_SECS`            | `600`                     |
//!
//! Rerunning with the same data directory resumes the overflow buffer and
//! message id from the previous run.

mod files;
mod mock;

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use std::thread;

use airlog_core::Agent;
use airlog_core::config::{AgentConfig, DeviceConfig, InternetConfig};
use embassy_futures::block_on;
use embassy_time::Duration;
use log::{error, info};

use files::{FileCell, FileStore};
use mock::{FlakyUplink, LogIndicator, MockSensor};

// ---------------------------------------------------------------------------
// Simulation constants
// ---------------------------------------------------------------------------

/// Wall time per simulated second.
const TICK: std::time::Duration = std::time::Duration::from_millis(100);

/// Smaller than on hardware so overflow kicks in within a short run.
const SIM_RAM_CAPACITY: usize = 8;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

struct Settings {
    device_id: String,
    topic: String,
    endpoint: String,
    ssid: String,
    password: String,
    data_dir: PathBuf,
    send_interval_secs: u64,
    run_secs: u64,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| String::from(default))
}

fn parsed_or<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            log::warn!("Ignoring unparsable {}={:?}", name, raw);
            default
        }),
        Err(_) => default,
    }
}

impl Settings {
    fn from_env() -> Self {
        let device_id = var_or("AIRLOG_DEVICE_ID", "sim-01");
        let topic = env::var("AIRLOG_TOPIC").unwrap_or_else(|_| format!("devices/{device_id}/events"));

        Self {
            topic,
            device_id,
            endpoint: var_or("AIRLOG_ENDPOINT", "localhost:8883"),
            ssid: var_or("AIRLOG_WIFI_SSID", ""),
            password: var_or("AIRLOG_WIFI_PASSWORD", ""),
            data_dir: PathBuf::from(var_or("AIRLOG_DATA_DIR", "./airlog-data")),
            send_interval_secs: parsed_or("AIRLOG_SEND_INTERVAL_SECS", 30),
            run_secs: parsed_or("AIRLOG_RUN_SECS", 600),
        }
    }

    fn device(&self) -> DeviceConfig<'_> {
        DeviceConfig {
            device_id: &self.device_id,
            topic: &self.topic,
            endpoint: &self.endpoint,
            internet: InternetConfig {
                ssid: &self.ssid,
                password: &self.password,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    if let Err(e) = dotenvy::dotenv()
        && !e.not_found()
    {
        eprintln!("Failed to load .env: {e}");
    }
    env_logger::init();

    let settings = Settings::from_env();
    info!("Starting airlog simulator for {}", settings.device_id);
    info!(
        "Data in {}, sampling every {}s for {}s",
        settings.data_dir.display(),
        settings.send_interval_secs,
        settings.run_secs
    );

    let store = match FileStore::open(&settings.data_dir.join("overflow")) {
        Ok(store) => store,
        Err(e) => {
            error!("Cannot open overflow directory: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let cell = FileCell::new(&settings.data_dir.join("counter.bin"));

    let config = AgentConfig {
        send_interval: Duration::from_secs(settings.send_interval_secs),
        ..AgentConfig::default()
    };

    // Two outages long enough to spill past the RAM tier
    let outages = vec![90..420, 480..540];
    let uplink = FlakyUplink::new(&settings.endpoint, outages);

    let mut agent: Agent<_, _, _, _, _, SIM_RAM_CAPACITY> = match Agent::new(
        &config,
        &settings.device(),
        MockSensor::new(),
        uplink,
        LogIndicator,
        store,
        cell,
    ) {
        Ok(agent) => agent,
        Err(e) => {
            error!("Cannot recover the overflow buffer: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // -----------------------------------------------------------------------
    // Main loop
    // -----------------------------------------------------------------------
    for uptime in 0..settings.run_secs {
        agent.uplink_mut().set_uptime(uptime);
        let report = block_on(agent.run_once(uptime));

        if report.sampled {
            info!(
                "t={}s pending {} (RAM {}, overflow {})",
                uptime,
                agent.buffer().pending_count(),
                agent.buffer().ram_len(),
                agent.buffer().overflow_len()
            );
        }

        thread::sleep(TICK);
    }

    info!("{}", agent.metrics());
    info!(
        "Simulator exiting with {} readings buffered for the next run",
        agent.buffer().overflow_len()
    );
    ExitCode::SUCCESS
}
