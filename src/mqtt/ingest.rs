//! Telemetry ingestion adapter.
//!
//! Keeps a persistent connection to the broker and forwards every inbound
//! publish to the coordinator's bounded channel. Subscription happens on
//! every ConnAck, so a reconnect renews it automatically.

use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::TelemetryFrame;
use crate::config::{BrokerConfig, TopicConfig};

pub struct TelemetryIngest {
    broker: BrokerConfig,
    subscribe: String,
    frames: mpsc::Sender<TelemetryFrame>,
}

impl TelemetryIngest {
    pub fn new(
        broker: BrokerConfig,
        topics: &TopicConfig,
        frames: mpsc::Sender<TelemetryFrame>,
    ) -> Self {
        Self {
            broker,
            subscribe: topics.subscribe.clone(),
            frames,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        let mut options = MqttOptions::new(
            format!("{}-ingest", self.broker.client_id),
            self.broker.host.clone(),
            self.broker.port,
        );
        options.set_keep_alive(Duration::from_secs(self.broker.keep_alive_secs));
        let (client, mut event_loop) = AsyncClient::new(options, 10);

        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!(
                        "connected to mqtt broker at {}:{}",
                        self.broker.host, self.broker.port
                    );
                    if let Err(e) = client
                        .subscribe(self.subscribe.clone(), QoS::AtMostOnce)
                        .await
                    {
                        error!("failed to subscribe to {}: {e}", self.subscribe);
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let frame = TelemetryFrame {
                        topic: publish.topic,
                        payload: publish.payload.to_vec(),
                    };
                    // a full channel parks the whole ingest loop here until
                    // the coordinator drains a slot
                    if self.frames.send(frame).await.is_err() {
                        warn!("telemetry channel closed, stopping ingest");
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    error!("mqtt connection error: {e}");
                    tokio::time::sleep(Duration::from_secs(self.broker.reconnect_secs)).await;
                }
            }
        }
    }
}
