//! Broker-facing adapters.
//!
//! Two independent pieces share the broker configuration: the persistent
//! ingest connection feeding telemetry into the coordinator, and the
//! one-shot actuator publisher switching the heater. They never share a
//! connection, so a stalled telemetry loop cannot delay actuation.

pub mod actuator;
pub mod ingest;

pub use actuator::MqttActuator;
pub use ingest::TelemetryIngest;

/// Raw broker message as received. Numeric decoding is deliberately left to
/// the coordinator; the ingest loop only moves bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryFrame {
    pub topic: String,
    pub payload: Vec<u8>,
}
