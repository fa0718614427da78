//! ==============================================================================
//! dashboard.rs - web dashboard (render side)
//! ==============================================================================
//!
//! purpose:
//!     draws the aggregator snapshot as html: four current values, a chart of
//!     the history series and the latest fetch alert. also exposes a json api
//!     and the manual "Fetch Data" trigger.
//!
//! routes:
//!     GET  /           html dashboard
//!     POST /fetch      "Fetch Data" button: refetch, then 303 back to /
//!     GET  /api        snapshot + alert as json
//!     POST /api/fetch  manual refetch with a json result, for scripts
//!
//! relationships:
//!     - reads: aggregator.rs (StateHandle, never writes)
//!     - calls: poller.rs (PollerHandle::refetch)
//!     - implements: poller::Notifier (AlertBoard)
//!
//! ==============================================================================

use crate::aggregator::StateHandle;
use crate::domain::{AggregatorState, HistorySeries};
use crate::poller::{DeviceSource, FetchError, Notifier, PollerHandle};

use anyhow::{Context, Result};
use axum::{
    extract::State,
    response::{Html, Json, Redirect},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::fmt::Write;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use tower_http::cors::CorsLayer;

pub const ALERT_MESSAGE: &str = "Failed to fetch data from ESP32. Please check the connection.";

// ==============================================================================
// alerts
// ==============================================================================

/// a user-visible fetch failure
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Alert {
    pub title: &'static str,
    pub message: &'static str,
    pub kind: &'static str,
    pub detail: String,
    /// unix timestamp (ms) when the failure happened
    pub raised_ms: u64,
}

/// holds the most recent alert for the dashboard
#[derive(Clone, Default)]
pub struct AlertBoard {
    latest: Arc<RwLock<Option<Alert>>>,
}

impl AlertBoard {
    pub fn latest(&self) -> Option<Alert> {
        self.latest.read().ok().and_then(|alert| alert.clone())
    }
}

impl Notifier for AlertBoard {
    fn notify(&self, error: &FetchError) {
        let alert = Alert {
            title: "Error",
            message: ALERT_MESSAGE,
            kind: error.kind(),
            detail: error.to_string(),
            raised_ms: now_ms(),
        };
        if let Ok(mut latest) = self.latest.write() {
            *latest = Some(alert);
        }
    }
}

/// an alert is shown until a newer reading arrives
fn active_alert(state: &AggregatorState, alert: Option<Alert>) -> Option<Alert> {
    alert.filter(|a| a.raised_ms >= state.last_update_ms)
}

// ==============================================================================
// web server
// ==============================================================================

pub struct Dashboard<S> {
    state: StateHandle,
    alerts: AlertBoard,
    poller: PollerHandle<S>,
}

impl<S> Clone for Dashboard<S> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            alerts: self.alerts.clone(),
            poller: self.poller.clone(),
        }
    }
}

impl<S: DeviceSource> Dashboard<S> {
    pub fn new(state: StateHandle, alerts: AlertBoard, poller: PollerHandle<S>) -> Self {
        Self {
            state,
            alerts,
            poller,
        }
    }

    pub fn router(self) -> Router {
        Router::new()
            .route("/", get(dashboard_handler::<S>))
            .route("/fetch", post(fetch_form_handler::<S>))
            .route("/api", get(api_handler::<S>))
            .route("/api/fetch", post(fetch_handler::<S>))
            .layer(CorsLayer::permissive())
            .with_state(self)
    }

    pub async fn serve(self, bind: &str) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(bind)
            .await
            .with_context(|| format!("failed to bind dashboard on {}", bind))?;
        tracing::info!("dashboard live at http://{}", bind);
        axum::serve(listener, self.router())
            .await
            .context("dashboard server stopped")?;
        Ok(())
    }
}

async fn dashboard_handler<S: DeviceSource>(State(dash): State<Dashboard<S>>) -> Html<String> {
    let state = dash.state.snapshot().await;
    let alert = active_alert(&state, dash.alerts.latest());
    Html(render_page(&state, alert.as_ref()))
}

#[derive(Serialize)]
struct ApiResponse {
    #[serde(flatten)]
    state: AggregatorState,
    alert: Option<Alert>,
}

/// json api endpoint for programmatic access
async fn api_handler<S: DeviceSource>(State(dash): State<Dashboard<S>>) -> Json<ApiResponse> {
    let state = dash.state.snapshot().await;
    let alert = active_alert(&state, dash.alerts.latest());
    Json(ApiResponse { state, alert })
}

/// POST /fetch - the "Fetch Data" button
///
/// the outcome reaches the user only through the page: transport/parse
/// failures raise an alert, invalid payloads do not.
async fn fetch_form_handler<S: DeviceSource>(State(dash): State<Dashboard<S>>) -> Redirect {
    let _ = dash.poller.refetch().await;
    Redirect::to("/")
}

/// POST /api/fetch - programmatic refetch
async fn fetch_handler<S: DeviceSource>(
    State(dash): State<Dashboard<S>>,
) -> Json<serde_json::Value> {
    match dash.poller.refetch().await {
        Ok(reading) => Json(serde_json::json!({"status": "ok", "reading": reading})),
        Err(e) => Json(serde_json::json!({
            "status": "error",
            "kind": e.kind(),
            "message": e.to_string(),
        })),
    }
}

// ==============================================================================
// rendering
// ==============================================================================

const CHART_WIDTH: f64 = 640.0;
const CHART_HEIGHT: f64 = 250.0;
const CHART_PAD: f64 = 32.0;

/// (series, stroke color, legend)
fn chart_series(state: &AggregatorState) -> [(&HistorySeries, &'static str, &'static str); 4] {
    [
        (&state.temperature, "rgba(255, 0, 0, 1)", "Temperature"),
        (&state.gas_level, "rgba(0, 0, 255, 1)", "Gas Level"),
        (&state.humidity, "rgba(0, 128, 0, 1)", "Humidity"),
        (&state.soil_moisture, "rgba(255, 165, 0, 1)", "Soil Moisture"),
    ]
}

pub fn render_page(state: &AggregatorState, alert: Option<&Alert>) -> String {
    let latest = &state.latest;
    let mut html = String::new();

    html.push_str(
        r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<meta http-equiv="refresh" content="5">
<title>Bio Manure Monitoring</title>
</head>
<body style="font-family: system-ui; padding: 20px; background: #f5f5f5;">
<h1 style="text-align: center;">Bio Manure Monitoring</h1>
"#,
    );

    if let Some(alert) = alert {
        let _ = write!(
            html,
            r#"<div role="alert" style="background: #ffe5e5; padding: 12px; border-radius: 8px; margin-bottom: 16px;"><strong>{}</strong>: {}<br><small>{}</small></div>
"#,
            alert.title,
            alert.message,
            html_escape(&alert.detail)
        );
    }

    let _ = write!(
        html,
        r#"<div style="background: #fff; padding: 16px; border-radius: 8px; margin-bottom: 20px;">
<p>🌡️ Temperature: <b>{}°C</b></p>
<p>💨 Gas Level: <b>{}%</b></p>
<p>💧 Humidity: <b>{}%</b></p>
<p>🌱 Soil Moisture: <b>{}%</b></p>
</div>
<form method="post" action="/fetch"><button type="submit">Fetch Data</button></form>
<h2>Real time data - Temperature vs Gas Level</h2>
"#,
        latest.temperature, latest.gas_level, latest.humidity, latest.soil_moisture
    );

    if state.temperature.is_empty() {
        html.push_str("<p>No data available yet.</p>\n");
    } else {
        html.push_str(&render_chart(state));
    }

    html.push_str("</body>\n</html>\n");
    html
}

/// inline svg line chart, x = poll index (1..N), y scaled to the data range
fn render_chart(state: &AggregatorState) -> String {
    let series = chart_series(state);
    let points = state.temperature.len();

    let (min, max) = series
        .iter()
        .flat_map(|(s, _, _)| s.values().iter().copied())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    let span = if max > min { max - min } else { 1.0 };

    let x_at = |i: usize| {
        if points <= 1 {
            CHART_PAD
        } else {
            CHART_PAD + (CHART_WIDTH - 2.0 * CHART_PAD) * i as f64 / (points - 1) as f64
        }
    };
    let y_at = |v: f64| CHART_HEIGHT - CHART_PAD - (CHART_HEIGHT - 2.0 * CHART_PAD) * (v - min) / span;

    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg viewBox="0 0 {w} {h}" width="100%" style="background: #fff; border-radius: 16px;">"#,
        w = CHART_WIDTH,
        h = CHART_HEIGHT
    );

    for (values, color, legend) in series {
        if values.is_empty() {
            continue;
        }
        let coords: Vec<String> = values
            .values()
            .iter()
            .enumerate()
            .map(|(i, v)| format!("{:.2},{:.2}", x_at(i), y_at(*v)))
            .collect();
        let _ = writeln!(
            svg,
            r#"<polyline fill="none" stroke="{}" stroke-width="2" points="{}"><title>{}</title></polyline>"#,
            color,
            coords.join(" "),
            legend
        );
    }

    for i in 0..points {
        let _ = writeln!(
            svg,
            r#"<text x="{:.2}" y="{:.2}" font-size="10" text-anchor="middle">{}</text>"#,
            x_at(i),
            CHART_HEIGHT - CHART_PAD / 3.0,
            i + 1
        );
    }

    svg.push_str("</svg>\n");
    svg
}

/// escape html special characters to prevent xss
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
