//! ==============================================================================
//! poller.rs - fixed-interval fetch of esp32 readings
//! ==============================================================================
//!
//! purpose:
//!     every tick: GET http://{device}/data, repair the body if the firmware
//!     dropped its closing brace, validate the four fields and hand the
//!     reading to the aggregator.
//!
//! relationships:
//!     - used by: main.rs (starts the timer), dashboard.rs (manual refetch)
//!     - writes: aggregator.rs (the only caller of Aggregator::apply)
//!     - reports to: Notifier (dashboard alert board)
//!
//! failure handling:
//!
//!     Transport / Parse  ->  error log + user-visible alert
//!     Invalid            ->  warn log only
//!
//!     no failure stops the timer and none touches the aggregator.
//!
//! overlap policy:
//!     timer ticks and manual refetches go through the same mutex, so at most
//!     one request is in flight. a refetch issued mid-tick waits its turn.
//!
//! ==============================================================================

use crate::aggregator::Aggregator;
use crate::domain::SensorReading;

use serde_json::Value;
use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::time::MissedTickBehavior;

/// how often the device is polled
pub const POLL_INTERVAL: Duration = Duration::from_millis(5000);

/// why a single fetch produced no reading
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    /// network unreachable, request failed or non-2xx status
    #[error("transport error: {0}")]
    Transport(String),

    /// body is not valid json even after the closing-brace repair
    #[error("malformed JSON: {0}")]
    Parse(String),

    /// valid json, but a required field is missing or not a number
    #[error("invalid data format: {0}")]
    Invalid(String),
}

impl FetchError {
    /// whether the user should be told about this failure
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, FetchError::Invalid(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Transport(_) => "transport",
            FetchError::Parse(_) => "parse",
            FetchError::Invalid(_) => "invalid",
        }
    }
}

// ==============================================================================
// payload handling
// ==============================================================================

/// the esp32 firmware sometimes cuts off the final `}`.
/// add back exactly one, never more.
pub fn repair_body(raw: &str) -> Cow<'_, str> {
    let trimmed = raw.trim();
    if trimmed.ends_with('}') {
        Cow::Borrowed(trimmed)
    } else {
        Cow::Owned(format!("{}}}", trimmed))
    }
}

/// repair, parse and validate a raw response body
pub fn parse_reading(raw: &str) -> Result<SensorReading, FetchError> {
    let body = repair_body(raw);
    let value: Value =
        serde_json::from_str(&body).map_err(|e| FetchError::Parse(e.to_string()))?;
    validate_reading(&value)
}

fn validate_reading(value: &Value) -> Result<SensorReading, FetchError> {
    let object = value
        .as_object()
        .ok_or_else(|| FetchError::Invalid(format!("expected a JSON object, got {}", value)))?;

    let field = |name: &str| -> Result<f64, FetchError> {
        match object.get(name) {
            // as_f64 is None when the value overflows f64 (e.g. 1e400)
            Some(Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| FetchError::Invalid(format!("{} is out of range: {}", name, n))),
            Some(other) => Err(FetchError::Invalid(format!("{} is not a number: {}", name, other))),
            None => Err(FetchError::Invalid(format!("missing field {}", name))),
        }
    };

    Ok(SensorReading {
        temperature: field("temperature")?,
        gas_level: field("gasLevel")?,
        humidity: field("humidity")?,
        soil_moisture: field("soilMoisture")?,
    })
}

/// one GET against the device endpoint
pub async fn fetch_once(
    client: &reqwest::Client,
    endpoint: &str,
) -> Result<SensorReading, FetchError> {
    let response = client
        .get(endpoint)
        .send()
        .await
        .map_err(|e| FetchError::Transport(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Transport(format!("device answered {}", status)));
    }

    let body = response
        .text()
        .await
        .map_err(|e| FetchError::Transport(e.to_string()))?;
    tracing::debug!(raw = %body, "raw response");

    parse_reading(&body)
}

// ==============================================================================
// device source - the seam between the poller and the network
// ==============================================================================

/// where readings come from. `HttpDevice` in production, fakes in tests.
pub trait DeviceSource: Send + Sync + 'static {
    fn fetch(&self) -> impl Future<Output = Result<SensorReading, FetchError>> + Send;
}

pub struct HttpDevice {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpDevice {
    /// `timeout` of None leaves reqwest's default (no timeout)
    pub fn new(endpoint: impl Into<String>, timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl DeviceSource for HttpDevice {
    fn fetch(&self) -> impl Future<Output = Result<SensorReading, FetchError>> + Send {
        fetch_once(&self.client, &self.endpoint)
    }
}

/// receives failures the user should see
pub trait Notifier: Send + Sync {
    fn notify(&self, error: &FetchError);
}

// ==============================================================================
// poller
// ==============================================================================

pub struct Poller<S> {
    source: S,
    aggregator: Aggregator,
    notifier: Arc<dyn Notifier>,
    show_data: bool,
}

impl<S: DeviceSource> Poller<S> {
    pub fn new(source: S, aggregator: Aggregator, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            source,
            aggregator,
            notifier,
            show_data: true,
        }
    }

    /// log every accepted reading at info (on by default)
    pub fn show_data(mut self, show: bool) -> Self {
        self.show_data = show;
        self
    }

    /// one fetch/apply cycle. the error is returned for callers that want
    /// it; logging and notification already happened here.
    pub async fn tick(&mut self) -> Result<SensorReading, FetchError> {
        match self.source.fetch().await {
            Ok(reading) => {
                if self.show_data {
                    tracing::info!(
                        temperature = reading.temperature,
                        gas_level = reading.gas_level,
                        humidity = reading.humidity,
                        soil_moisture = reading.soil_moisture,
                        "reading accepted"
                    );
                }
                self.aggregator.apply(reading).await;
                Ok(reading)
            }
            Err(e) if e.is_user_visible() => {
                tracing::error!(kind = e.kind(), "error fetching data: {}", e);
                self.notifier.notify(&e);
                Err(e)
            }
            Err(e) => {
                tracing::warn!("{}", e);
                Err(e)
            }
        }
    }

    /// spawn the repeating timer. the first tick fires immediately.
    pub fn start(self, interval: Duration) -> PollerHandle<S> {
        let poller = Arc::new(Mutex::new(self));
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let timer_poller = poller.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    // also fires when every handle is dropped
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        let _ = timer_poller.lock().await.tick().await;
                    }
                }
            }
            tracing::info!("poller stopped");
        });

        PollerHandle {
            poller,
            stop: Arc::new(stop_tx),
        }
    }
}

/// control side of a running poller
pub struct PollerHandle<S> {
    poller: Arc<Mutex<Poller<S>>>,
    stop: Arc<watch::Sender<bool>>,
}

impl<S> Clone for PollerHandle<S> {
    fn clone(&self) -> Self {
        Self {
            poller: self.poller.clone(),
            stop: self.stop.clone(),
        }
    }
}

impl<S: DeviceSource> PollerHandle<S> {
    /// user-initiated fetch through the same path as the timer
    pub async fn refetch(&self) -> Result<SensorReading, FetchError> {
        self.poller.lock().await.tick().await
    }

    /// cancel the timer. a tick already running completes first.
    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }
}
