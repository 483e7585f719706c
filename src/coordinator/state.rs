//! Session state owned exclusively by the coordinator task.
//!
//! Nothing here is synchronized: every other task interacts with this state
//! only by sending messages through the two hand-off channels, so the
//! coordinator is the single writer by construction.

use chrono::{DateTime, Local};
use std::collections::VecDeque;

use crate::config::ControlConfig;

/// Fixed-capacity time series. Appending beyond capacity evicts the oldest
/// sample, so the buffer always holds the most recent window.
#[derive(Debug, Clone)]
pub struct Series {
    points: VecDeque<(f64, DateTime<Local>)>,
    capacity: usize,
}

impl Series {
    pub fn new(capacity: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, value: f64, at: DateTime<Local>) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back((value, at));
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(f64, DateTime<Local>)> {
        self.points.iter()
    }

    /// Timestamp of the oldest retained sample.
    pub fn first_at(&self) -> Option<DateTime<Local>> {
        self.points.front().map(|(_, at)| *at)
    }
}

/// Thermostat session state for the single controlled zone.
///
/// Invariant: `setpoint` is either `default_setpoint` (heater disabled) or a
/// value strictly inside the configured bounds (heater enabled), and
/// `heater_enabled` tracks which of the two holds. [`enable`](Self::enable)
/// and [`disable`](Self::disable) are the only mutators of that pair.
#[derive(Debug)]
pub struct SessionState {
    pub last_temperature: Option<f64>,
    pub last_humidity: Option<f64>,
    pub temp_series: Series,
    pub humidity_series: Series,
    pub setpoint: f64,
    pub default_setpoint: f64,
    pub heater_enabled: bool,
}

impl SessionState {
    pub fn new(control: &ControlConfig) -> Self {
        Self {
            last_temperature: None,
            last_humidity: None,
            temp_series: Series::new(control.series_capacity),
            humidity_series: Series::new(control.series_capacity),
            setpoint: control.default_setpoint,
            default_setpoint: control.default_setpoint,
            heater_enabled: false,
        }
    }

    pub fn enable(&mut self, setpoint: f64) {
        self.setpoint = setpoint;
        self.heater_enabled = true;
    }

    pub fn disable(&mut self) {
        self.setpoint = self.default_setpoint;
        self.heater_enabled = false;
    }

    pub fn record_temperature(&mut self, value: f64, at: DateTime<Local>) {
        self.last_temperature = Some(value);
        self.temp_series.push(value, at);
    }

    pub fn record_humidity(&mut self, value: f64, at: DateTime<Local>) {
        self.last_humidity = Some(value);
        self.humidity_series.push(value, at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_control(series_capacity: usize) -> ControlConfig {
        ControlConfig {
            series_capacity,
            ..ControlConfig::default()
        }
    }

    #[test]
    fn series_evicts_oldest_beyond_capacity() {
        let mut series = Series::new(10_000);
        let now = Local::now();
        for i in 0..10_001 {
            series.push(i as f64, now);
        }
        assert_eq!(series.len(), 10_000);
        let values: Vec<f64> = series.iter().map(|(v, _)| *v).collect();
        assert_eq!(values[0], 1.0);
        assert_eq!(values[9_999], 10_000.0);
        // still ordered oldest to newest
        assert!(values.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn fresh_state_has_no_readings_and_heater_off() {
        let state = SessionState::new(&small_control(100));
        assert!(state.last_temperature.is_none());
        assert!(state.last_humidity.is_none());
        assert!(!state.heater_enabled);
        assert_eq!(state.setpoint, state.default_setpoint);
    }

    #[test]
    fn enable_disable_keep_setpoint_invariant() {
        let mut state = SessionState::new(&small_control(100));
        state.enable(18.5);
        assert!(state.heater_enabled);
        assert_eq!(state.setpoint, 18.5);
        state.disable();
        assert!(!state.heater_enabled);
        assert_eq!(state.setpoint, state.default_setpoint);
    }

    #[test]
    fn recording_updates_last_value_and_series() {
        let mut state = SessionState::new(&small_control(2));
        let now = Local::now();
        state.record_temperature(19.0, now);
        state.record_temperature(19.5, now);
        state.record_temperature(20.0, now);
        assert_eq!(state.last_temperature, Some(20.0));
        assert_eq!(state.temp_series.len(), 2);
        state.record_humidity(55.0, now);
        assert_eq!(state.last_humidity, Some(55.0));
        assert_eq!(state.humidity_series.len(), 1);
    }
}
