//! One-shot heater switch over MQTT.

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use std::time::Duration;
use tracing::debug;

use crate::config::BrokerConfig;
use crate::coordinator::ports::{ActuatorError, ActuatorPort};

const ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Publishes `"1"`/`"0"` to the heater topic over a short-lived connection
/// opened per call, mirroring how the device expects fire-and-forget
/// commands. QoS 1 so each switch is confirmed by the broker before the
/// connection is dropped.
pub struct MqttActuator {
    broker: BrokerConfig,
    topic: String,
}

impl MqttActuator {
    pub fn new(broker: BrokerConfig, topic: String) -> Self {
        Self { broker, topic }
    }
}

impl ActuatorPort for MqttActuator {
    async fn set_heater(&self, on: bool) -> Result<(), ActuatorError> {
        let payload = if on { "1" } else { "0" };
        let mut options = MqttOptions::new(
            format!("{}-actuator", self.broker.client_id),
            self.broker.host.clone(),
            self.broker.port,
        );
        options.set_keep_alive(Duration::from_secs(5));
        let (client, mut event_loop) = AsyncClient::new(options, 4);

        client
            .publish(self.topic.clone(), QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| ActuatorError::Publish(e.to_string()))?;

        tokio::time::timeout(ACK_TIMEOUT, wait_for_ack(&mut event_loop))
            .await
            .map_err(|_| ActuatorError::Connection("timed out waiting for puback".to_string()))??;

        let _ = client.disconnect().await;
        debug!("published {payload} to {}", self.topic);
        Ok(())
    }
}

async fn wait_for_ack(event_loop: &mut EventLoop) -> Result<(), ActuatorError> {
    loop {
        match event_loop
            .poll()
            .await
            .map_err(|e| ActuatorError::Connection(e.to_string()))?
        {
            Event::Incoming(Packet::PubAck(_)) => return Ok(()),
            _ => {}
        }
    }
}
