//! ==============================================================================
//! domain.rs - sensor reading and aggregator state types
//! ==============================================================================
//!
//! purpose:
//!     the plain data that flows from the poller to the dashboard.
//!
//! relationships:
//!     - produced by: poller.rs (validated readings)
//!     - owned by: aggregator.rs (AggregatorState)
//!     - rendered by: dashboard.rs
//!
//! ==============================================================================

use serde::Serialize;

/// one validated set of values from the esp32
///
/// field names on the wire are camelCase (`gasLevel`, `soilMoisture`).
/// built by poller::parse_reading, which checks each field by hand.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    /// temperature in celsius
    pub temperature: f64,
    /// gas level (0-100%)
    pub gas_level: f64,
    /// relative humidity (0-100%)
    pub humidity: f64,
    /// soil moisture (0-100%)
    pub soil_moisture: f64,
}

/// append-only history of one metric, oldest first
///
/// grows without bound for the lifetime of the process.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct HistorySeries(Vec<f64>);

impl HistorySeries {
    pub fn push(&mut self, value: f64) {
        self.0.push(value);
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// everything the dashboard needs to draw a frame
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatorState {
    /// latest reading, all zero until the first successful poll
    pub latest: SensorReading,
    pub temperature: HistorySeries,
    pub gas_level: HistorySeries,
    /// never appended to by the poller
    pub humidity: HistorySeries,
    /// never appended to by the poller
    pub soil_moisture: HistorySeries,
    /// number of readings applied so far
    pub updates: u64,
    /// unix timestamp (ms) of last successful update, 0 if none yet
    pub last_update_ms: u64,
}
