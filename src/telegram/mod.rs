//! Telegram command intake and reply delivery.
//!
//! [`CommandIntake`] maps user messages to [`Request`]s on the bounded
//! request channel; it never touches the session state. Enabling the heater
//! is a two-step flow: "Heating on" shows a setpoint keyboard and marks the
//! chat as pending, and the next numeric message from that chat becomes the
//! setpoint. Pending flags are tracked per chat, so concurrent users cannot
//! corrupt each other's flow.

use std::collections::HashSet;
use std::sync::Arc;

use teloxide::dptree;
use teloxide::payloads::SendMessageSetters;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile, KeyboardButton, KeyboardMarkup};
use teloxide::utils::command::BotCommands;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::coordinator::ports::{ReplyError, ReplyPort};
use crate::coordinator::{Request, RequestKind};

/// Main menu. "Automatic control" is shown but not routed anywhere, kept
/// for parity with the deployed keyboard layout.
pub const MAIN_MENU: [&[&str]; 3] = [
    &["Heating on", "Heating off"],
    &["Automatic control"],
    &["Get plot", "Get actual temperature"],
];

/// Suggested setpoints; freeform numbers are accepted too.
pub const SETPOINT_MENU: [&[&str]; 2] = [&["16", "17", "18", "19"], &["20", "21", "22", "23"]];

const WELCOME: &str = "Welcome to the home control center";
const HELP: &str = "Available controls:\n\
    /start - show the control keyboard\n\
    Heating on - choose a setpoint and enable the thermostat\n\
    Heating off - disable the thermostat\n\
    Get plot - chart of the recent temperature and humidity\n\
    Get actual temperature - latest readings";

/// Always outside the accepted setpoint range, so the coordinator takes the
/// disable branch.
const HEATER_OFF_SENTINEL: f64 = 0.0;

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("request channel closed, coordinator is gone")]
    CoordinatorGone,

    #[error(transparent)]
    Reply(#[from] ReplyError),
}

pub struct CommandIntake {
    requests: mpsc::Sender<Request>,
    pending_setpoint: Mutex<HashSet<ChatId>>,
}

impl CommandIntake {
    pub fn new(requests: mpsc::Sender<Request>) -> Self {
        Self {
            requests,
            pending_setpoint: Mutex::new(HashSet::new()),
        }
    }

    pub async fn on_start(&self, chat: ChatId, reply: &impl ReplyPort) -> Result<(), IntakeError> {
        debug!("received start request from {chat:?}");
        reply.send_text(chat, WELCOME).await?;
        reply.send_keyboard(chat, "Select the option", &MAIN_MENU).await?;
        Ok(())
    }

    pub async fn on_help(&self, chat: ChatId, reply: &impl ReplyPort) -> Result<(), IntakeError> {
        reply.send_text(chat, HELP).await?;
        Ok(())
    }

    pub async fn on_text(
        &self,
        chat: ChatId,
        text: &str,
        reply: &impl ReplyPort,
    ) -> Result<(), IntakeError> {
        match text {
            "Heating on" => {
                debug!("received new setpoint request from {chat:?}");
                self.pending_setpoint.lock().await.insert(chat);
                reply
                    .send_keyboard(chat, "Insert desired temperature", &SETPOINT_MENU)
                    .await?;
            }
            "Heating off" => {
                debug!("heater off requested by {chat:?}");
                reply.send_text(chat, "Turning off the heater").await?;
                self.submit(RequestKind::SetHeater(HEATER_OFF_SENTINEL), chat)
                    .await?;
            }
            "Get plot" => {
                debug!("received plot request from {chat:?}");
                self.submit(RequestKind::QueryPlot, chat).await?;
            }
            "Get actual temperature" => {
                debug!("received temperature request from {chat:?}");
                self.submit(RequestKind::QueryTemperature, chat).await?;
            }
            _ => self.on_freeform(chat, text, reply).await?,
        }
        Ok(())
    }

    /// A freeform message only matters while the chat has a pending
    /// setpoint; anything non-numeric in that state is ignored and the
    /// pending flag is kept.
    async fn on_freeform(
        &self,
        chat: ChatId,
        text: &str,
        reply: &impl ReplyPort,
    ) -> Result<(), IntakeError> {
        if !self.pending_setpoint.lock().await.contains(&chat) {
            return Ok(());
        }
        let Ok(value) = text.trim().parse::<f64>() else {
            debug!("ignoring non-numeric setpoint candidate from {chat:?}");
            return Ok(());
        };
        self.pending_setpoint.lock().await.remove(&chat);
        reply
            .send_text(
                chat,
                &format!("Turning on the heater with the following setpoint: {value}"),
            )
            .await?;
        self.submit(RequestKind::SetHeater(value), chat).await?;
        reply.send_keyboard(chat, "Select the option", &MAIN_MENU).await?;
        Ok(())
    }

    async fn submit(&self, kind: RequestKind, chat: ChatId) -> Result<(), IntakeError> {
        self.requests
            .send(Request { kind, chat })
            .await
            .map_err(|_| IntakeError::CoordinatorGone)
    }
}

/// Reply sink backed by the Telegram bot API.
pub struct TelegramReply {
    bot: Bot,
}

impl TelegramReply {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

impl ReplyPort for TelegramReply {
    async fn send_text(&self, chat: ChatId, text: &str) -> Result<(), ReplyError> {
        self.bot
            .send_message(chat, text)
            .await
            .map(drop)
            .map_err(to_reply_error)
    }

    async fn send_photo(&self, chat: ChatId, png: Vec<u8>) -> Result<(), ReplyError> {
        self.bot
            .send_photo(chat, InputFile::memory(png))
            .await
            .map(drop)
            .map_err(to_reply_error)
    }

    async fn send_keyboard(
        &self,
        chat: ChatId,
        text: &str,
        rows: &[&[&str]],
    ) -> Result<(), ReplyError> {
        let markup = KeyboardMarkup::new(
            rows.iter()
                .map(|row| row.iter().map(|label| KeyboardButton::new(label.to_string()))),
        );
        self.bot
            .send_message(chat, text)
            .reply_markup(markup)
            .await
            .map(drop)
            .map_err(to_reply_error)
    }
}

fn to_reply_error(e: teloxide::RequestError) -> ReplyError {
    ReplyError::Delivery(e.to_string())
}

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
enum MenuCommand {
    Start,
    Help,
}

/// Runs the Telegram event loop; returns only when the dispatcher stops.
pub async fn run_dispatcher(bot: Bot, intake: Arc<CommandIntake>) {
    let handler = Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<MenuCommand>()
                .endpoint(on_command),
        )
        .branch(dptree::endpoint(on_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![intake])
        .build()
        .dispatch()
        .await;
}

async fn on_command(
    bot: Bot,
    msg: Message,
    command: MenuCommand,
    intake: Arc<CommandIntake>,
) -> ResponseResult<()> {
    let reply = TelegramReply::new(bot);
    let chat = msg.chat.id;
    let result = match command {
        MenuCommand::Start => intake.on_start(chat, &reply).await,
        MenuCommand::Help => intake.on_help(chat, &reply).await,
    };
    if let Err(e) = result {
        warn!("command handling failed: {e}");
    }
    Ok(())
}

async fn on_message(bot: Bot, msg: Message, intake: Arc<CommandIntake>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let reply = TelegramReply::new(bot);
    if let Err(e) = intake.on_text(msg.chat.id, text, &reply).await {
        warn!("message handling failed: {e}");
    }
    Ok(())
}
