mod config;
mod logging;
mod rumqttc_wrapper;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use chrono::{Timelike, Utc};
use config::Config;
use log::{error, info, warn};
use rumqttc_wrapper::RumqttcWrapper;
use smf2mqtt::coordinator::{sleep_until, Coordinator};
use smf2mqtt::home_assistant::HomeAssistant;
use smf2mqtt::metric_collector::MetricCollector;
use smf2mqtt::simple_mqtt::SimpleMqtt;
use smf2mqtt::solar_manager::SolarManagerClient;

// time for the mqtt event loops to flush the last messages
const FLUSH_DELAY: Duration = Duration::from_millis(500);

fn main() -> anyhow::Result<()> {
    logging::init_logger();
    info!("Running revision: {}", env!("GIT_HASH"));
    if std::env::args().len() > 1 {
        error!("Arguments passed. Tool is configured by config.toml in its path");
    }

    let config = Config::load()?;
    let entry = config.solar_manager.clone();
    entry
        .validate()
        .context("invalid [solar_manager] configuration")?;
    if !config.is_valid() {
        bail!("no output configured, add a [home_assistant] or [simple_mqtt] section");
    }

    let client = SolarManagerClient::from_entry(&entry)?;
    info!(
        "Solar Manager forecast for '{}' from {}",
        entry.title(),
        client.url().unwrap_or("<unset>")
    );
    let coordinator = Coordinator::new(client, entry.update_interval());
    info!(
        "using update interval of {}s",
        coordinator.update_interval().as_secs()
    );
    let store = coordinator.store();

    let mut output_channels: Vec<Box<dyn MetricCollector>> = Vec::new();
    if let Some(config) = &config.home_assistant {
        info!("Publishing to Home Assistant");
        output_channels.push(Box::new(HomeAssistant::<RumqttcWrapper>::new(config, &entry)));
    }
    if let Some(config) = &config.simple_mqtt {
        info!("Publishing to simple MQTT broker");
        output_channels.push(Box::new(SimpleMqtt::<RumqttcWrapper>::new(config)));
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    for signal in [signal_hook::consts::SIGTERM, signal_hook::consts::SIGINT] {
        signal_hook::flag::register(signal, Arc::clone(&shutdown))?;
    }

    if let Err(e) = coordinator.refresh() {
        warn!(
            "First forecast update failed, retrying in {}s: {e}",
            coordinator.update_interval().as_secs()
        );
    }

    let fetcher = {
        let shutdown = Arc::clone(&shutdown);
        thread::Builder::new()
            .name("forecast-fetcher".to_string())
            .spawn(move || coordinator.run(&shutdown))?
    };

    // refresh entity states at the start of every minute, between fetches
    loop {
        let snapshot = store.snapshot(Utc::now());
        output_channels
            .iter_mut()
            .for_each(|channel| channel.publish(&snapshot));

        let next_minute = Duration::from_secs(60 - u64::from(Utc::now().second()));
        if !sleep_until(Instant::now() + next_minute, &shutdown) {
            break;
        }
    }

    info!("Shutting down");
    output_channels
        .iter_mut()
        .for_each(|channel| channel.shutdown());
    if !fetcher.is_finished() {
        info!("Waiting for the running forecast update to finish");
    }
    if fetcher.join().is_err() {
        error!("forecast fetcher panicked");
    }
    thread::sleep(FLUSH_DELAY);
    Ok(())
}
