use std::time::Duration;

use anyhow::Context;
use rumqttc::{AsyncClient, LastWill, MqttOptions, QoS};
use tracing::{debug, info, warn};

use hvac_common::{TOPIC_SENSOR_STATUS, TOPIC_SENSOR_TEMP};

const DEFAULT_INTERVAL_S: u64 = 30;

/// Slow triangle wave around `base` so a connected controller sees both
/// heating and cooling demand.
fn simulated_temperature(tick: u64, base: f32) -> f32 {
    let phase = (tick % 40) as f32;
    let offset = if phase < 20.0 { phase } else { 40.0 - phase };
    base - 2.0 + offset * 0.2
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(1883);
    let interval_s = std::env::var("SENSOR_INTERVAL_S")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(DEFAULT_INTERVAL_S);
    let base_c = std::env::var("SENSOR_BASE_C")
        .ok()
        .and_then(|value| value.parse::<f32>().ok())
        .filter(|value| value.is_finite())
        .unwrap_or(21.0);

    let mut mqtt_options = MqttOptions::new("hvac-sensor", mqtt_host, mqtt_port);
    mqtt_options.set_last_will(LastWill::new(
        TOPIC_SENSOR_STATUS,
        "offline",
        QoS::AtLeastOnce,
        true,
    ));

    if let Ok(user) = std::env::var("MQTT_USER") {
        let pass = std::env::var("MQTT_PASS").unwrap_or_default();
        mqtt_options.set_credentials(user, pass);
    }

    let (mqtt, mut eventloop) = AsyncClient::new(mqtt_options, 32);

    mqtt.publish(TOPIC_SENSOR_STATUS, QoS::AtLeastOnce, true, "online")
        .await
        .context("failed to publish sensor online status")?;

    tokio::spawn(async move {
        loop {
            if let Err(err) = eventloop.poll().await {
                warn!("sensor mqtt poll error: {err}");
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    });

    info!(interval_s, base_c, "sensor publisher started");

    let mut tick: u64 = 0;
    let mut interval = tokio::time::interval(Duration::from_secs(interval_s));

    loop {
        interval.tick().await;
        tick = tick.saturating_add(1);

        // Hardware integration point: swap in a real sensor driver here.
        let temperature_c = simulated_temperature(tick, base_c);
        debug!(temperature_c, "publishing reading");

        mqtt.publish(
            TOPIC_SENSOR_TEMP,
            QoS::AtLeastOnce,
            true,
            format!("{temperature_c:.2}"),
        )
        .await
        .context("failed to publish sensor temperature")?;
    }
}
