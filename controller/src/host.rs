use std::{
    collections::HashMap,
    io::ErrorKind,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
    time::{Duration, Instant},
};

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put, MethodRouter},
    Json, Router,
};
use chrono::{Offset, Utc};
use chrono_tz::Tz;
use rumqttc::{AsyncClient, Event, Incoming, MqttOptions, QoS};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::{
    net::TcpListener,
    sync::{mpsc, Mutex},
};
use tracing::{debug, info, warn};

use hvac_common::{
    dispatch, trigger_topic, Actuator, ControlRequest, EngineEvent, FanMode, Mode,
    PersistedState, Preset, RuntimeConfig, Schedule, ScheduleAction, SwingMode, ThermostatConfig,
    ThermostatEngine, Trigger, PAYLOAD_TRIGGER_FIRE, PAYLOAD_TRIGGER_STOP, TOPIC_CMD_CONTROL,
    TOPIC_CMD_FAN_MODE, TOPIC_CMD_MODE, TOPIC_CMD_PRESET, TOPIC_CMD_SCHEDULE,
    TOPIC_CMD_SWING_MODE, TOPIC_CMD_TARGET, TOPIC_CMD_TARGET_HIGH, TOPIC_CMD_TARGET_LOW,
    TOPIC_CONTROLLER_SCHEDULE_STATE, TOPIC_CONTROLLER_STATE, TOPIC_CONTROLLER_STATUS,
    TOPIC_SENSOR_TEMP,
};

#[derive(Clone)]
struct AppState {
    engine: Arc<Mutex<ThermostatEngine>>,
    schedule: Arc<Mutex<Schedule>>,
    last_schedule_action: Arc<Mutex<Option<ScheduleAction>>>,
    timezone: Arc<Mutex<String>>,
    time_synced: Arc<AtomicBool>,
    last_persisted: Arc<Mutex<Option<PersistedState>>>,
    events: EventSink,
    mqtt: AsyncClient,
    store: AppStore,
}

/// Ordered hand-off of engine output to the single publisher task.
#[derive(Clone)]
struct EventSink {
    tx: mpsc::UnboundedSender<Vec<EngineEvent>>,
}

impl EventSink {
    fn channel() -> (Self, mpsc::UnboundedReceiver<Vec<EngineEvent>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, events: Vec<EngineEvent>) {
        if events.is_empty() {
            return;
        }
        if self.tx.send(events).is_err() {
            warn!("engine event publisher is gone, dropping events");
        }
    }
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
    state_path: Arc<PathBuf>,
    schedule_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Deserialize)]
struct TimezoneUpdate {
    timezone: String,
}

#[derive(Debug, Serialize)]
struct TimeStatus {
    #[serde(rename = "timeSynced")]
    time_synced: bool,
    timezone: String,
    #[serde(rename = "nowEpoch")]
    now_epoch: i64,
}

type QueryParams = HashMap<String, String>;

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;

/// Readings outside this range are treated as a broken sensor.
const SENSOR_RANGE_C: std::ops::RangeInclusive<f32> = -40.0..=125.0;

/// Single-field control commands shared by the MQTT and HTTP surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Mode,
    FanMode,
    SwingMode,
    Preset,
    Target,
    TargetLow,
    TargetHigh,
}

impl Command {
    fn from_topic(topic: &str) -> Option<Self> {
        match topic {
            TOPIC_CMD_MODE => Some(Self::Mode),
            TOPIC_CMD_FAN_MODE => Some(Self::FanMode),
            TOPIC_CMD_SWING_MODE => Some(Self::SwingMode),
            TOPIC_CMD_PRESET => Some(Self::Preset),
            TOPIC_CMD_TARGET => Some(Self::Target),
            TOPIC_CMD_TARGET_LOW => Some(Self::TargetLow),
            TOPIC_CMD_TARGET_HIGH => Some(Self::TargetHigh),
            _ => None,
        }
    }

    fn request(self, value: &str) -> Result<ControlRequest, &'static str> {
        let mut request = ControlRequest::default();
        match self {
            Self::Mode => request.mode = Some(Mode::parse(value).ok_or("Invalid mode")?),
            Self::FanMode => {
                request.fan_mode = Some(FanMode::parse(value).ok_or("Invalid fan mode")?)
            }
            Self::SwingMode => {
                request.swing_mode = Some(SwingMode::parse(value).ok_or("Invalid swing mode")?)
            }
            Self::Preset => request.preset = Some(Preset::parse(value).ok_or("Invalid preset")?),
            Self::Target => request.target_temperature = Some(parse_setpoint(value)?),
            Self::TargetLow => request.target_temperature_low = Some(parse_setpoint(value)?),
            Self::TargetHigh => request.target_temperature_high = Some(parse_setpoint(value)?),
        }
        Ok(request)
    }
}

fn parse_setpoint(value: &str) -> Result<f32, &'static str> {
    value
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or("Invalid temperature value")
}

/// Sensor payload to engine input. Anything unusable becomes NaN ("no reading").
fn parse_temperature(message: &str) -> f32 {
    message
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|value| value.is_finite() && SENSOR_RANGE_C.contains(value))
        .unwrap_or(f32::NAN)
}

/// Collects trigger notifications as MQTT messages for the publisher task.
#[derive(Debug, Default)]
struct MqttActuator {
    messages: Vec<(String, &'static str)>,
}

impl Actuator for MqttActuator {
    fn fire(&mut self, trigger: Trigger) {
        let port = trigger.name();
        info!(%port, "trigger fired");
        self.messages
            .push((trigger_topic(&port), PAYLOAD_TRIGGER_FIRE));
    }

    fn stop(&mut self, trigger: Trigger) {
        let port = trigger.name();
        debug!(%port, "trigger stopped");
        self.messages
            .push((trigger_topic(&port), PAYLOAD_TRIGGER_STOP));
    }
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = AppStore::new();
    let mut runtime = store.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    runtime.thermostat.sanitize();
    if let Err(err) = runtime.thermostat.validate() {
        warn!("rejecting stored thermostat config, using defaults: {err}");
        runtime.thermostat = ThermostatConfig::default();
    }

    let mut schedule = store.load_schedule().await.unwrap_or_else(|err| {
        warn!("failed to load schedule from store: {err:#}");
        Schedule::default()
    });
    schedule.normalize();

    let restored = store.load_state().await.unwrap_or_else(|err| {
        warn!("failed to load persisted state from store: {err:#}");
        None
    });

    let mut engine = ThermostatEngine::new(runtime.thermostat.clone());
    let setup_events = engine.setup(restored, monotonic_ms());

    let mqtt_host = std::env::var("MQTT_HOST").unwrap_or(runtime.mqtt.host.clone());
    let mqtt_port = std::env::var("MQTT_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(runtime.mqtt.port);

    let mut mqtt_options = MqttOptions::new("hvac-controller", mqtt_host, mqtt_port);
    let mqtt_user = std::env::var("MQTT_USER").unwrap_or(runtime.mqtt.user.clone());
    let mqtt_pass = std::env::var("MQTT_PASS").unwrap_or(runtime.mqtt.pass.clone());
    if !mqtt_user.is_empty() {
        mqtt_options.set_credentials(mqtt_user, mqtt_pass);
    }

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options, 64);
    let (events, events_rx) = EventSink::channel();
    events.forward(setup_events);

    let app_state = AppState {
        engine: Arc::new(Mutex::new(engine)),
        schedule: Arc::new(Mutex::new(schedule)),
        last_schedule_action: Arc::new(Mutex::new(None)),
        timezone: Arc::new(Mutex::new(runtime.timezone)),
        time_synced: Arc::new(AtomicBool::new(false)),
        last_persisted: Arc::new(Mutex::new(restored)),
        events,
        mqtt,
        store,
    };

    subscribe_topics(&app_state.mqtt).await?;
    spawn_mqtt_loop(app_state.clone(), eventloop);
    spawn_event_publisher(app_state.clone(), events_rx);
    spawn_control_loop(app_state.clone());
    spawn_status_publish_loop(app_state.clone());

    let app = Router::new()
        .route("/api/status", get(handle_get_status))
        .route("/api/config", get(handle_get_config))
        .route("/api/control", post(handle_post_control))
        .route("/api/mode", command_route(Command::Mode))
        .route("/api/fan_mode", command_route(Command::FanMode))
        .route("/api/swing_mode", command_route(Command::SwingMode))
        .route("/api/preset", command_route(Command::Preset))
        .route("/api/target", command_route(Command::Target))
        .route("/api/target/low", command_route(Command::TargetLow))
        .route("/api/target/high", command_route(Command::TargetHigh))
        .route(
            "/api/schedule",
            get(handle_get_schedule).put(handle_put_schedule),
        )
        .route("/api/time", get(handle_get_time))
        .route("/api/timezone", put(handle_put_timezone))
        .with_state(app_state);

    let port = std::env::var("CONTROLLER_HTTP_PORT")
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind controller server at {addr}"))?;

    info!("controller listening on http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    let topics = [
        TOPIC_SENSOR_TEMP,
        TOPIC_CMD_CONTROL,
        TOPIC_CMD_MODE,
        TOPIC_CMD_FAN_MODE,
        TOPIC_CMD_SWING_MODE,
        TOPIC_CMD_PRESET,
        TOPIC_CMD_TARGET,
        TOPIC_CMD_TARGET_LOW,
        TOPIC_CMD_TARGET_HIGH,
        TOPIC_CMD_SCHEDULE,
    ];

    for topic in topics {
        mqtt.subscribe(topic, QoS::AtMostOnce)
            .await
            .with_context(|| format!("failed to subscribe to {topic}"))?;
    }
    Ok(())
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: rumqttc::EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&app_state, message.topic, message.payload.to_vec())
                            .await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

fn spawn_control_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(1));

        loop {
            interval.tick().await;

            let timezone = { app_state.timezone.lock().await.clone() };
            let now_in_tz = now_in_timezone(&timezone);
            app_state
                .time_synced
                .store(now_in_tz.is_some(), Ordering::Relaxed);

            if let Some(now) = now_in_tz {
                let schedule_action = {
                    let schedule = app_state.schedule.lock().await;
                    schedule.current_action(now)
                };

                let edge = {
                    let mut last = app_state.last_schedule_action.lock().await;
                    let changed = *last != schedule_action;
                    *last = schedule_action;
                    changed
                };

                if let Some(action) = schedule_action.filter(|_| edge) {
                    info!(preset = %action.preset, mode = ?action.mode, "applying schedule entry");
                    apply_request(&app_state, action.to_request()).await;
                }
            }

            drive_engine(&app_state.engine, &app_state.events, |engine, now| {
                engine.tick(now)
            })
            .await;
        }
    });
}

fn spawn_status_publish_loop(app_state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(10));
        loop {
            interval.tick().await;

            match serde_json::to_vec(&build_status(&app_state).await) {
                Ok(body) => {
                    if let Err(err) = app_state
                        .mqtt
                        .publish(TOPIC_CONTROLLER_STATUS, QoS::AtLeastOnce, true, body)
                        .await
                    {
                        warn!("controller status publish failed: {err}");
                    }
                }
                Err(err) => warn!("controller status serialization failed: {err}"),
            }

            let schedule_payload = {
                let schedule = app_state.schedule.lock().await;
                serde_json::to_vec(&*schedule)
            };

            match schedule_payload {
                Ok(body) => {
                    if let Err(err) = app_state
                        .mqtt
                        .publish(
                            TOPIC_CONTROLLER_SCHEDULE_STATE,
                            QoS::AtLeastOnce,
                            true,
                            body,
                        )
                        .await
                    {
                        warn!("schedule state publish failed: {err}");
                    }
                }
                Err(err) => warn!("schedule serialization failed: {err}"),
            }
        }
    });
}

/// Runs one engine step and queues its events before the lock is released,
/// so batches reach the publisher in the order the engine produced them.
async fn drive_engine(
    engine: &Mutex<ThermostatEngine>,
    sink: &EventSink,
    step: impl FnOnce(&mut ThermostatEngine, u64) -> Vec<EngineEvent>,
) {
    let mut engine = engine.lock().await;
    let events = step(&mut engine, monotonic_ms());
    sink.forward(events);
}

fn spawn_event_publisher(app_state: AppState, mut rx: mpsc::UnboundedReceiver<Vec<EngineEvent>>) {
    tokio::spawn(async move {
        while let Some(events) = rx.recv().await {
            if let Err(err) = publish_engine_events(&app_state, events).await {
                warn!("engine event publish failed: {err:#}");
            }
        }
    });
}

/// Sends trigger notifications, publishes the climate state and persists user state.
async fn publish_engine_events(state: &AppState, events: Vec<EngineEvent>) -> anyhow::Result<()> {
    let mut actuator = MqttActuator::default();
    let published = dispatch(events, &mut actuator);

    for (topic, payload) in actuator.messages {
        state
            .mqtt
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .context("trigger publish failed")?;
    }

    if let Some(climate) = published {
        let body = serde_json::to_vec(&climate).context("climate state serialization failed")?;
        state
            .mqtt
            .publish(TOPIC_CONTROLLER_STATE, QoS::AtLeastOnce, true, body)
            .await
            .context("climate state publish failed")?;
        persist_state_if_changed(state).await?;
    }

    Ok(())
}

async fn apply_request(state: &AppState, request: ControlRequest) {
    if request.is_empty() {
        return;
    }
    drive_engine(&state.engine, &state.events, |engine, now| {
        engine.control(request, now)
    })
    .await;
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: String,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let message = String::from_utf8(payload).context("non utf8 mqtt payload")?;

    match topic.as_str() {
        TOPIC_SENSOR_TEMP => {
            let reading = parse_temperature(&message);
            drive_engine(&app_state.engine, &app_state.events, |engine, now| {
                engine.on_temperature(reading, now)
            })
            .await;
        }
        TOPIC_CMD_CONTROL => {
            let request = serde_json::from_str::<ControlRequest>(&message)
                .context("invalid control request")?;
            apply_request(app_state, request).await;
        }
        TOPIC_CMD_SCHEDULE => {
            let mut schedule =
                serde_json::from_str::<Schedule>(&message).context("invalid schedule")?;
            schedule.normalize();
            {
                let mut active = app_state.schedule.lock().await;
                *active = schedule.clone();
            }
            app_state.store.save_schedule(&schedule).await?;
        }
        other => {
            if let Some(command) = Command::from_topic(other) {
                match command.request(&message) {
                    Ok(request) => apply_request(app_state, request).await,
                    Err(reason) => warn!("{reason} on {other}: {message:?}"),
                }
            }
        }
    }

    Ok(())
}

async fn build_status(state: &AppState) -> hvac_common::ControllerStatus {
    let now_ms = monotonic_ms();
    let timezone = state.timezone.lock().await.clone();

    let (schedule_enabled, next_schedule) = {
        let schedule = state.schedule.lock().await;
        (
            schedule.enabled,
            now_in_timezone(&timezone).and_then(|now| schedule.next_event_epoch(now)),
        )
    };
    let time_synced = state.time_synced.load(Ordering::Relaxed);

    let engine = state.engine.lock().await;
    engine.status(
        now_ms,
        schedule_enabled,
        next_schedule,
        time_synced,
        &timezone,
    )
}

async fn handle_get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(build_status(&state).await)
}

async fn handle_get_config(State(state): State<AppState>) -> impl IntoResponse {
    let config = state.engine.lock().await.config().clone();
    Json(config)
}

async fn handle_post_control(
    State(state): State<AppState>,
    Json(request): Json<ControlRequest>,
) -> impl IntoResponse {
    apply_request(&state, request).await;
    handle_get_status(State(state)).await.into_response()
}

/// `POST ?value=` setter for one command.
fn command_route(command: Command) -> MethodRouter<AppState> {
    post(move |State(state): State<AppState>, Query(params): Query<QueryParams>| async move {
        handle_command(state, params, command).await
    })
}

async fn handle_command(
    state: AppState,
    params: QueryParams,
    command: Command,
) -> axum::response::Response {
    let Some(value) = params.get("value") else {
        return error_response(StatusCode::BAD_REQUEST, "Missing 'value' parameter");
    };
    let request = match command.request(value) {
        Ok(request) => request,
        Err(reason) => return error_response(StatusCode::BAD_REQUEST, reason),
    };

    debug!(?command, "applying single-field command");
    apply_request(&state, request).await;

    handle_get_status(State(state)).await.into_response()
}

async fn handle_get_schedule(State(state): State<AppState>) -> impl IntoResponse {
    let schedule = state.schedule.lock().await.clone();
    Json(schedule)
}

async fn handle_put_schedule(
    State(state): State<AppState>,
    Json(mut schedule): Json<Schedule>,
) -> impl IntoResponse {
    schedule.normalize();
    {
        let mut active = state.schedule.lock().await;
        *active = schedule.clone();
    }

    if let Err(err) = state.store.save_schedule(&schedule).await {
        warn!("failed to persist schedule update: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist schedule",
        );
    }

    handle_get_schedule(State(state)).await.into_response()
}

async fn handle_get_time(State(state): State<AppState>) -> impl IntoResponse {
    let timezone = state.timezone.lock().await.clone();
    Json(TimeStatus {
        time_synced: state.time_synced.load(Ordering::Relaxed),
        timezone,
        now_epoch: Utc::now().timestamp(),
    })
}

async fn handle_put_timezone(
    State(state): State<AppState>,
    Json(update): Json<TimezoneUpdate>,
) -> impl IntoResponse {
    if update.timezone.parse::<Tz>().is_err() {
        return error_response(StatusCode::BAD_REQUEST, "Invalid timezone value");
    }

    {
        let mut timezone = state.timezone.lock().await;
        *timezone = update.timezone;
    }

    if let Err(err) = persist_runtime_from_state(&state).await {
        warn!("failed to persist timezone update: {err:#}");
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to persist runtime settings",
        );
    }

    handle_get_time(State(state)).await.into_response()
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("THERMOSTAT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.thermostat"));
        Self::in_dir(&data_dir)
    }

    fn in_dir(data_dir: &Path) -> Self {
        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            state_path: Arc::new(data_dir.join("state.json")),
            schedule_path: Arc::new(data_dir.join("schedule.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn read_json<T: DeserializeOwned>(&self, path: &Path) -> anyhow::Result<Option<T>> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(path).await {
            Ok(raw) => Ok(Some(serde_json::from_slice::<T>(&raw).with_context(|| {
                format!("failed to parse {}", path.display())
            })?)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(value)?;
        tokio::fs::write(path, payload)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        Ok(self
            .read_json(&self.runtime_path)
            .await?
            .unwrap_or_default())
    }

    async fn save_runtime_config(&self, runtime: &RuntimeConfig) -> anyhow::Result<()> {
        self.write_json(&self.runtime_path, runtime).await
    }

    async fn load_state(&self) -> anyhow::Result<Option<PersistedState>> {
        self.read_json(&self.state_path).await
    }

    async fn save_state(&self, state: &PersistedState) -> anyhow::Result<()> {
        self.write_json(&self.state_path, state).await
    }

    async fn load_schedule(&self) -> anyhow::Result<Schedule> {
        Ok(self
            .read_json(&self.schedule_path)
            .await?
            .unwrap_or_default())
    }

    async fn save_schedule(&self, schedule: &Schedule) -> anyhow::Result<()> {
        self.write_json(&self.schedule_path, schedule).await
    }
}

async fn persist_state_if_changed(state: &AppState) -> anyhow::Result<()> {
    let current = state.engine.lock().await.persisted_state();
    let mut last = state.last_persisted.lock().await;
    if last.as_ref() == Some(&current) {
        return Ok(());
    }
    state.store.save_state(&current).await?;
    *last = Some(current);
    Ok(())
}

async fn persist_runtime_from_state(state: &AppState) -> anyhow::Result<()> {
    let timezone = state.timezone.lock().await.clone();

    let mut runtime = state.store.load_runtime_config().await?;
    runtime.timezone = timezone;
    state.store.save_runtime_config(&runtime).await
}

fn now_in_timezone(timezone: &str) -> Option<chrono::DateTime<chrono::FixedOffset>> {
    let tz: Tz = timezone.parse().ok()?;
    let local = Utc::now().with_timezone(&tz);
    Some(local.with_timezone(&local.offset().fix()))
}

fn error_response(status: StatusCode, message: &str) -> axum::response::Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START
        .get_or_init(Instant::now)
        .elapsed()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hvac_common::{Action, Setpoints, TimerConfig};
    use pretty_assertions::assert_eq;

    #[test]
    fn commands_map_topics_and_values_to_requests() {
        assert_eq!(Command::from_topic(TOPIC_CMD_TARGET_LOW), Some(Command::TargetLow));
        assert_eq!(Command::from_topic(TOPIC_SENSOR_TEMP), None);

        assert_eq!(
            Command::Mode.request("auto"),
            Ok(ControlRequest {
                mode: Some(Mode::HeatCool),
                ..ControlRequest::default()
            })
        );
        assert_eq!(
            Command::TargetHigh.request(" 24.5 "),
            Ok(ControlRequest {
                target_temperature_high: Some(24.5),
                ..ControlRequest::default()
            })
        );
        assert_eq!(Command::Preset.request("vacation"), Err("Invalid preset"));
        assert_eq!(
            Command::Target.request("nan"),
            Err("Invalid temperature value")
        );
    }

    #[test]
    fn unusable_sensor_payloads_become_missing_readings() {
        assert_eq!(parse_temperature("21.25"), 21.25);
        assert!(parse_temperature("nan").is_nan());
        assert!(parse_temperature("offline").is_nan());
        assert!(parse_temperature("400").is_nan());
    }

    #[test]
    fn actuator_publishes_on_and_off_per_port() {
        let mut actuator = MqttActuator::default();
        let published = dispatch(
            [
                EngineEvent::Stop(Trigger::Action(Action::Idle)),
                EngineEvent::Fire(Trigger::Action(Action::Heating)),
            ],
            &mut actuator,
        );

        assert_eq!(published, None);
        assert_eq!(
            actuator.messages,
            vec![
                (
                    "thermostat/controller/trigger/action_idle".to_string(),
                    "OFF"
                ),
                (
                    "thermostat/controller/trigger/action_heating".to_string(),
                    "ON"
                ),
            ]
        );
    }

    #[tokio::test]
    async fn store_round_trips_persisted_state() {
        let dir = std::env::temp_dir().join(format!("hvac-store-{}", std::process::id()));
        let store = AppStore::in_dir(&dir);
        assert_eq!(store.load_state().await.unwrap(), None);

        let state = PersistedState {
            mode: Mode::Heat,
            fan_mode: FanMode::Auto,
            swing_mode: SwingMode::Off,
            preset: Preset::Home,
            setpoints: Setpoints::Single { target: Some(20.0) },
        };
        store.save_state(&state).await.unwrap();
        assert_eq!(store.load_state().await.unwrap(), Some(state));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_engine_steps_publish_in_engine_order() {
        let mut config = ThermostatConfig::default();
        config.startup_delay = false;
        config.capabilities.two_points = false;
        config.timers = TimerConfig::default();

        let (sink, mut rx) = EventSink::channel();
        let mut engine = ThermostatEngine::new(config);
        sink.forward(engine.setup(
            Some(PersistedState {
                mode: Mode::Heat,
                fan_mode: FanMode::Auto,
                swing_mode: SwingMode::Off,
                preset: Preset::Home,
                setpoints: Setpoints::Single { target: Some(20.0) },
            }),
            0,
        ));
        let engine = Arc::new(Mutex::new(engine));

        let tasks: Vec<_> = (0..40)
            .map(|round| {
                let engine = Arc::clone(&engine);
                let sink = sink.clone();
                let reading = if round % 2 == 0 { 18.0 } else { 21.0 };
                tokio::spawn(async move {
                    drive_engine(&engine, &sink, |engine, now| {
                        engine.on_temperature(reading, now)
                    })
                    .await;
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        drop(sink);

        let mut actuator = MqttActuator::default();
        while let Some(events) = rx.recv().await {
            dispatch(events, &mut actuator);
        }

        let mut latest = HashMap::new();
        for (topic, payload) in actuator.messages {
            latest.insert(topic, payload);
        }
        let mut running: Vec<String> = latest
            .into_iter()
            .filter(|(topic, payload)| {
                topic.contains("/action_") && *payload == PAYLOAD_TRIGGER_FIRE
            })
            .map(|(topic, _)| topic)
            .collect();
        running.sort();

        let action = engine.lock().await.action();
        assert_eq!(running, vec![trigger_topic(&Trigger::Action(action).name())]);
    }
}
