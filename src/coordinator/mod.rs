//! State coordinator - the thermostat control loop.
//!
//! The coordinator is the sole owner of [`SessionState`]. The telemetry
//! ingest task and the Telegram intake never touch the state directly; they
//! hand off messages through two bounded channels and the coordinator
//! multiplexes over both, processing one item per iteration. That keeps the
//! state lock-free and the cross-queue interleaving bounded.
//!
//! ```text
//! mqtt::ingest ──[TelemetryFrame]──▶ ┌─────────────┐ ──▶ ActuatorPort
//!                                    │ Coordinator │
//! telegram ────────[Request]───────▶ └─────────────┘ ──▶ ReplyPort
//! ```

pub mod ports;
pub mod state;

use chrono::Local;
use teloxide::types::ChatId;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{ControlConfig, TopicConfig};
use crate::mqtt::TelemetryFrame;
use crate::plot;
use ports::{ActuatorPort, ReplyPort};
use state::SessionState;

/// A user command picked off the request channel, consumed exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub kind: RequestKind,
    pub chat: ChatId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RequestKind {
    QueryTemperature,
    SetHeater(f64),
    QueryPlot,
}

pub struct Coordinator<A, R> {
    state: SessionState,
    requests: mpsc::Receiver<Request>,
    frames: mpsc::Receiver<TelemetryFrame>,
    actuator: A,
    reply: R,
    topics: TopicConfig,
    control: ControlConfig,
}

impl<A: ActuatorPort, R: ReplyPort> Coordinator<A, R> {
    pub fn new(
        control: ControlConfig,
        topics: TopicConfig,
        requests: mpsc::Receiver<Request>,
        frames: mpsc::Receiver<TelemetryFrame>,
        actuator: A,
        reply: R,
    ) -> Self {
        Self {
            state: SessionState::new(&control),
            requests,
            frames,
            actuator,
            reply,
            topics,
            control,
        }
    }

    /// Runs until both input channels close.
    pub async fn run(mut self) {
        info!("coordinator started");
        loop {
            tokio::select! {
                Some(request) = self.requests.recv() => self.handle_request(request).await,
                Some(frame) = self.frames.recv() => self.handle_frame(frame).await,
                else => break,
            }
        }
        info!("input channels closed, coordinator stopping");
    }

    async fn handle_request(&mut self, request: Request) {
        match request.kind {
            RequestKind::QueryTemperature => {
                let text = format!(
                    "Temperatura sala: {}, umidita sala: {}",
                    fmt_reading(self.state.last_temperature),
                    fmt_reading(self.state.last_humidity)
                );
                if let Err(e) = self.reply.send_text(request.chat, &text).await {
                    warn!("failed to send temperature reply: {e}");
                }
                debug!("replied to temperature request from {:?}", request.chat);
            }
            RequestKind::SetHeater(value) => {
                let accepted =
                    value > self.control.setpoint_min && value < self.control.setpoint_max;
                if accepted {
                    self.state.enable(value);
                    debug!("heater enabled with setpoint {value}");
                } else {
                    // any out-of-range value, including the 0.0 sentinel from
                    // "Heating off", lands here
                    self.state.disable();
                    debug!("heater disabled (requested setpoint {value})");
                }
                self.switch_heater(accepted).await;
            }
            RequestKind::QueryPlot => {
                match plot::render(&self.state.temp_series, &self.state.humidity_series) {
                    Ok(png) => {
                        if let Err(e) = self.reply.send_photo(request.chat, png).await {
                            warn!("failed to send plot reply: {e}");
                        }
                        debug!("replied to plot request from {:?}", request.chat);
                    }
                    Err(e) => {
                        error!("plot rendering failed: {e}");
                        if let Err(e) = self
                            .reply
                            .send_text(request.chat, "Unable to render the plot right now")
                            .await
                        {
                            warn!("failed to send plot failure notice: {e}");
                        }
                    }
                }
            }
        }
    }

    async fn handle_frame(&mut self, frame: TelemetryFrame) {
        let Some(value) = decode_value(&frame.payload) else {
            error!(
                "unable to decode telemetry payload on {}: {:?}",
                frame.topic,
                String::from_utf8_lossy(&frame.payload)
            );
            return;
        };
        let now = Local::now();
        if frame.topic == self.topics.temperature {
            if self.state.heater_enabled {
                // threshold control without a dead-band, re-evaluated on
                // every sample
                self.switch_heater(value < self.state.setpoint).await;
            }
            self.state.record_temperature(value, now);
        } else if frame.topic == self.topics.humidity {
            self.state.record_humidity(value, now);
        }
    }

    async fn switch_heater(&self, on: bool) {
        if let Err(e) = self.actuator.set_heater(on).await {
            error!("heater publish failed: {e}");
        }
    }
}

fn decode_value(payload: &[u8]) -> Option<f64> {
    std::str::from_utf8(payload).ok()?.trim().parse().ok()
}

fn fmt_reading(value: Option<f64>) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.1}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ports::{ActuatorError, ReplyError};
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc::error::TrySendError;

    #[derive(Clone, Default)]
    struct MockActuator {
        published: Arc<Mutex<Vec<bool>>>,
    }

    impl ActuatorPort for MockActuator {
        async fn set_heater(&self, on: bool) -> Result<(), ActuatorError> {
            self.published.lock().unwrap().push(on);
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct MockReply {
        texts: Arc<Mutex<Vec<(ChatId, String)>>>,
        photos: Arc<Mutex<Vec<(ChatId, Vec<u8>)>>>,
    }

    impl ReplyPort for MockReply {
        async fn send_text(&self, chat: ChatId, text: &str) -> Result<(), ReplyError> {
            self.texts.lock().unwrap().push((chat, text.to_string()));
            Ok(())
        }

        async fn send_photo(&self, chat: ChatId, png: Vec<u8>) -> Result<(), ReplyError> {
            self.photos.lock().unwrap().push((chat, png));
            Ok(())
        }

        async fn send_keyboard(
            &self,
            chat: ChatId,
            text: &str,
            _rows: &[&[&str]],
        ) -> Result<(), ReplyError> {
            self.texts.lock().unwrap().push((chat, text.to_string()));
            Ok(())
        }
    }

    struct Fixture {
        coordinator: Coordinator<MockActuator, MockReply>,
        request_tx: mpsc::Sender<Request>,
        frame_tx: mpsc::Sender<TelemetryFrame>,
        actuator: MockActuator,
        reply: MockReply,
    }

    fn fixture() -> Fixture {
        let (request_tx, request_rx) = mpsc::channel(10);
        let (frame_tx, frame_rx) = mpsc::channel(10);
        let actuator = MockActuator::default();
        let reply = MockReply::default();
        let coordinator = Coordinator::new(
            ControlConfig::default(),
            TopicConfig::default(),
            request_rx,
            frame_rx,
            actuator.clone(),
            reply.clone(),
        );
        Fixture {
            coordinator,
            request_tx,
            frame_tx,
            actuator,
            reply,
        }
    }

    fn set_heater(value: f64) -> Request {
        Request {
            kind: RequestKind::SetHeater(value),
            chat: ChatId(7),
        }
    }

    fn frame(topic: &str, payload: &str) -> TelemetryFrame {
        TelemetryFrame {
            topic: topic.to_string(),
            payload: payload.as_bytes().to_vec(),
        }
    }

    #[tokio::test]
    async fn valid_setpoint_enables_heater_with_one_on_publish() {
        let mut f = fixture();
        f.coordinator.handle_request(set_heater(18.0)).await;
        assert!(f.coordinator.state.heater_enabled);
        assert_eq!(f.coordinator.state.setpoint, 18.0);
        assert_eq!(*f.actuator.published.lock().unwrap(), vec![true]);
    }

    #[tokio::test]
    async fn out_of_range_setpoint_disables_regardless_of_prior_state() {
        let mut f = fixture();
        f.coordinator.handle_request(set_heater(18.0)).await;
        f.coordinator.handle_request(set_heater(30.0)).await;
        assert!(!f.coordinator.state.heater_enabled);
        assert_eq!(
            f.coordinator.state.setpoint,
            f.coordinator.state.default_setpoint
        );
        assert_eq!(*f.actuator.published.lock().unwrap(), vec![true, false]);
    }

    #[tokio::test]
    async fn bounds_are_strict_and_zero_sentinel_disables() {
        for value in [15.0, 24.0, 0.0, -3.0] {
            let mut f = fixture();
            f.coordinator.handle_request(set_heater(value)).await;
            assert!(!f.coordinator.state.heater_enabled, "value {value}");
            assert_eq!(*f.actuator.published.lock().unwrap(), vec![false]);
        }
    }

    #[tokio::test]
    async fn enabled_heater_reevaluates_on_every_temperature_sample() {
        let mut f = fixture();
        f.coordinator.handle_request(set_heater(18.0)).await;
        f.coordinator
            .handle_frame(frame("home/sala/temperature", "17.5"))
            .await;
        f.coordinator
            .handle_frame(frame("home/sala/temperature", "19.0"))
            .await;
        // one publish from the request, one per sample
        assert_eq!(
            *f.actuator.published.lock().unwrap(),
            vec![true, true, false]
        );
        assert_eq!(f.coordinator.state.last_temperature, Some(19.0));
        assert_eq!(f.coordinator.state.temp_series.len(), 2);
    }

    #[tokio::test]
    async fn disabled_heater_records_samples_without_publishing() {
        let mut f = fixture();
        f.coordinator
            .handle_frame(frame("home/sala/temperature", "12.0"))
            .await;
        assert!(f.actuator.published.lock().unwrap().is_empty());
        assert_eq!(f.coordinator.state.last_temperature, Some(12.0));
    }

    #[tokio::test]
    async fn query_before_any_reading_reports_absent_values() {
        let mut f = fixture();
        f.coordinator
            .handle_request(Request {
                kind: RequestKind::QueryTemperature,
                chat: ChatId(3),
            })
            .await;
        let texts = f.reply.texts.lock().unwrap();
        assert_eq!(
            texts.as_slice(),
            &[(
                ChatId(3),
                "Temperatura sala: n/a, umidita sala: n/a".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn query_reports_latest_readings() {
        let mut f = fixture();
        f.coordinator
            .handle_frame(frame("home/sala/temperature", "19.5"))
            .await;
        f.coordinator
            .handle_frame(frame("home/sala/humidity", "47.0"))
            .await;
        f.coordinator
            .handle_request(Request {
                kind: RequestKind::QueryTemperature,
                chat: ChatId(3),
            })
            .await;
        let texts = f.reply.texts.lock().unwrap();
        assert_eq!(
            texts[0].1,
            "Temperatura sala: 19.5, umidita sala: 47.0".to_string()
        );
    }

    #[tokio::test]
    async fn bad_payload_is_discarded_and_later_samples_still_work() {
        let mut f = fixture();
        f.coordinator
            .handle_frame(frame("home/sala/temperature", "garbage"))
            .await;
        assert!(f.coordinator.state.last_temperature.is_none());
        assert!(f.coordinator.state.temp_series.is_empty());
        f.coordinator
            .handle_frame(frame("home/sala/temperature", "21.0"))
            .await;
        assert_eq!(f.coordinator.state.last_temperature, Some(21.0));
    }

    #[tokio::test]
    async fn unrelated_topics_are_ignored() {
        let mut f = fixture();
        f.coordinator
            .handle_frame(frame("home/sala/stufa", "1"))
            .await;
        assert!(f.coordinator.state.last_temperature.is_none());
        assert!(f.actuator.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn plot_request_sends_a_png_photo() {
        let mut f = fixture();
        f.coordinator
            .handle_frame(frame("home/sala/temperature", "19.5"))
            .await;
        f.coordinator
            .handle_frame(frame("home/sala/humidity", "47.0"))
            .await;
        f.coordinator
            .handle_request(Request {
                kind: RequestKind::QueryPlot,
                chat: ChatId(4),
            })
            .await;
        let photos = f.reply.photos.lock().unwrap();
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].0, ChatId(4));
        assert_eq!(&photos[0].1[..4], &[0x89, b'P', b'N', b'G']);
    }

    #[tokio::test]
    async fn full_request_channel_blocks_the_eleventh_send_until_drained() {
        let f = fixture();
        let tx = f.request_tx.clone();
        let mut coordinator = f.coordinator;
        for _ in 0..10 {
            tx.try_send(set_heater(18.0)).unwrap();
        }
        assert!(matches!(
            tx.try_send(set_heater(18.0)),
            Err(TrySendError::Full(_))
        ));

        let blocked = tokio::spawn({
            let tx = tx.clone();
            async move { tx.send(set_heater(20.0)).await.unwrap() }
        });
        tokio::task::yield_now().await;
        assert!(!blocked.is_finished());

        // draining one slot lets the blocked producer through
        let next = coordinator.requests.recv().await.unwrap();
        coordinator.handle_request(next).await;
        blocked.await.unwrap();
    }

    #[tokio::test]
    async fn run_loop_consumes_both_channels_and_stops_when_closed() {
        let f = fixture();
        let actuator = f.actuator.clone();
        let handle = tokio::spawn(f.coordinator.run());

        f.request_tx.send(set_heater(18.0)).await.unwrap();
        // give the loop a moment so the request lands before the sample
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        f.frame_tx
            .send(frame("home/sala/temperature", "17.0"))
            .await
            .unwrap();

        drop(f.request_tx);
        drop(f.frame_tx);
        handle.await.unwrap();
        assert_eq!(*actuator.published.lock().unwrap(), vec![true, true]);
    }
}
