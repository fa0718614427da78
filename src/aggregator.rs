//! ==============================================================================
//! aggregator.rs - latest reading + chart history
//! ==============================================================================
//!
//! purpose:
//!     holds the most recent sensor reading and the series the dashboard charts.
//!
//! ownership:
//!     there is exactly ONE writer. `Aggregator` is not Clone and gets moved
//!     into the poller, so only the poll path can call `apply`.
//!     everyone else (web handlers) holds a `StateHandle`, which can only
//!     take snapshots.
//!
//!     ┌──────────────┐   apply()   ┌──────────────────────┐
//!     │   poller     │ ──────────> │ Arc<RwLock<State>>   │
//!     └──────────────┘             └──────────┬───────────┘
//!                                             │ snapshot()
//!                                   ┌─────────┴─────────┐
//!                                   │  StateHandle (N)  │
//!                                   └───────────────────┘
//!
//! ==============================================================================

use crate::domain::{AggregatorState, SensorReading};

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

/// the single writer for aggregator state
pub struct Aggregator {
    state: Arc<RwLock<AggregatorState>>,
}

/// read-only view handed to the render side
#[derive(Clone)]
pub struct StateHandle {
    state: Arc<RwLock<AggregatorState>>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(AggregatorState::default())),
        }
    }

    /// get a read-only handle for the dashboard
    pub fn handle(&self) -> StateHandle {
        StateHandle {
            state: self.state.clone(),
        }
    }

    /// replace the latest reading and extend the temperature / gas series
    ///
    /// humidity and soil moisture are only stored in `latest`.
    pub async fn apply(&mut self, reading: SensorReading) {
        let mut state = self.state.write().await;
        state.latest = reading;
        state.temperature.push(reading.temperature);
        state.gas_level.push(reading.gas_level);
        state.updates += 1;
        state.last_update_ms = now_ms();
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl StateHandle {
    pub async fn snapshot(&self) -> AggregatorState {
        self.state.read().await.clone()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn reading(temperature: f64, gas_level: f64) -> SensorReading {
        SensorReading {
            temperature,
            gas_level,
            humidity: 55.0,
            soil_moisture: 30.0,
        }
    }

    #[tokio::test]
    async fn test_apply_keeps_call_order() {
        let mut aggregator = Aggregator::new();
        let inputs = [(21.5, 10.0), (22.0, 12.5), (19.0, 8.0), (25.25, 40.0)];
        for (t, g) in inputs {
            aggregator.apply(reading(t, g)).await;
        }

        let state = aggregator.handle().snapshot().await;
        assert_eq!(state.temperature.values(), &[21.5, 22.0, 19.0, 25.25]);
        assert_eq!(state.gas_level.values(), &[10.0, 12.5, 8.0, 40.0]);
        assert_eq!(state.updates, 4);
    }

    #[tokio::test]
    async fn test_latest_is_overwritten() {
        let mut aggregator = Aggregator::new();
        aggregator.apply(reading(10.0, 1.0)).await;
        aggregator.apply(reading(11.0, 2.0)).await;

        let state = aggregator.handle().snapshot().await;
        assert_eq!(state.latest, reading(11.0, 2.0));
        assert!(state.last_update_ms > 0);
    }

    #[tokio::test]
    async fn test_humidity_and_soil_series_stay_empty() {
        let mut aggregator = Aggregator::new();
        aggregator.apply(reading(10.0, 1.0)).await;

        let state = aggregator.handle().snapshot().await;
        assert!(state.humidity.is_empty());
        assert!(state.soil_moisture.is_empty());
    }

    #[tokio::test]
    async fn test_handle_sees_writes_but_snapshot_is_detached() {
        let mut aggregator = Aggregator::new();
        let handle = aggregator.handle();

        let before = handle.snapshot().await;
        aggregator.apply(reading(30.0, 5.0)).await;
        let after = handle.snapshot().await;

        assert!(before.temperature.is_empty());
        assert_eq!(after.temperature.values(), &[30.0]);
    }
}
