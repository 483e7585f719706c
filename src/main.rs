pub mod config;
pub mod coordinator;
pub mod mqtt;
pub mod plot;
pub mod telegram;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use std::sync::Arc;
use teloxide::Bot;
use tokio::sync::mpsc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use config::BridgeConfig;
use coordinator::Coordinator;
use mqtt::{MqttActuator, TelemetryIngest};
use telegram::{CommandIntake, TelegramReply};

#[derive(Debug, Parser)]
#[command(
    name = "termobot",
    about = "Telegram control center for an MQTT-connected home thermostat",
    version
)]
struct Cli {
    /// Telegram bot API token.
    #[arg(short = 't', long = "token")]
    token: String,

    /// Path to the TOML config file.
    #[arg(short = 'c', long = "config", default_value = "termobot.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup()?;

    let config = BridgeConfig::load(&cli.config)?;

    let (request_tx, request_rx) = mpsc::channel(config.control.queue_capacity);
    let (frame_tx, frame_rx) = mpsc::channel(config.control.queue_capacity);

    let _ingest_handle =
        TelemetryIngest::new(config.broker.clone(), &config.topics, frame_tx).spawn();

    let bot = Bot::new(cli.token);
    let actuator = MqttActuator::new(config.broker.clone(), config.topics.heater.clone());
    let reply = TelegramReply::new(bot.clone());

    let coordinator = Coordinator::new(
        config.control.clone(),
        config.topics.clone(),
        request_rx,
        frame_rx,
        actuator,
        reply,
    );
    let _coordinator_handle = tokio::spawn(coordinator.run());

    let intake = Arc::new(CommandIntake::new(request_tx));
    info!("starting telegram dispatcher");
    telegram::run_dispatcher(bot, intake).await;

    Ok(())
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();
    Ok(())
}
