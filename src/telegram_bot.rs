use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use teloxide::{
    net::Download,
    prelude::*,
    types::{InlineKeyboardButton, InlineKeyboardMarkup, User, Voice},
    utils::command::BotCommands,
};
use tracing::{error, info, warn};

use crate::{
    config::{parse_end_time, parse_utc_offset},
    keywords::KeywordIntent,
    notify::Notifier,
    replies,
    report::EndTrigger,
    service::ShiftService,
    shift::{BreakOutcome, TransferOutcome, VoiceVerdict},
    speech::SpeechAnalysis,
    types::Role,
};

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "snake_case", description = "Shift commands:")]
pub enum Command {
    #[command(description = "show this help")]
    Help,
    #[command(description = "join the shift, optionally as host or co-host")]
    Join(String),
    #[command(description = "show shift progress")]
    Status,
    #[command(description = "pause your counters")]
    Pause,
    #[command(description = "end your pause")]
    Resume,
    #[command(description = "reply to someone to hand them the shift")]
    Transfer,
    #[command(description = "end the shift and post the report (admins)")]
    Report,
    #[command(description = "turn tracking on in this chat (admins)")]
    Enable,
    #[command(description = "turn tracking off in this chat (admins)")]
    Disable,
    #[command(description = "set the shift end time, HH:MM (admins)")]
    SetEndTime(String),
    #[command(description = "set the chat UTC offset, e.g. +03:00 (admins)")]
    SetTimezone(String),
    #[command(description = "set the inactivity reminder in minutes (admins)")]
    SetTimeout(String),
    #[command(description = "override the voice goal, or `off` (admins)")]
    SetGoal(String),
    #[command(description = "set content templates separated by `;` (admins)")]
    SetTemplates(String),
}

impl Command {
    fn is_admin_only(&self) -> bool {
        matches!(
            self,
            Command::Report
                | Command::Enable
                | Command::Disable
                | Command::SetEndTime(_)
                | Command::SetTimezone(_)
                | Command::SetTimeout(_)
                | Command::SetGoal(_)
                | Command::SetTemplates(_)
        )
    }

    fn ignores_enabled_flag(&self) -> bool {
        matches!(self, Command::Help | Command::Enable | Command::Disable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferAnswer {
    Accept,
    Decline,
}

fn transfer_callback(answer: TransferAnswer, request_id: u64) -> String {
    match answer {
        TransferAnswer::Accept => format!("transfer:accept:{request_id}"),
        TransferAnswer::Decline => format!("transfer:decline:{request_id}"),
    }
}

fn parse_transfer_callback(data: &str) -> Option<(TransferAnswer, u64)> {
    let mut parts = data.splitn(3, ':');
    if parts.next()? != "transfer" {
        return None;
    }
    let answer = match parts.next()? {
        "accept" => TransferAnswer::Accept,
        "decline" => TransferAnswer::Decline,
        _ => return None,
    };
    let request_id = parts.next()?.parse().ok()?;
    Some((answer, request_id))
}

fn transfer_keyboard(request_id: u64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        InlineKeyboardButton::callback(
            "✅ Accept",
            transfer_callback(TransferAnswer::Accept, request_id),
        ),
        InlineKeyboardButton::callback(
            "❌ Decline",
            transfer_callback(TransferAnswer::Decline, request_id),
        ),
    ]])
}

fn parse_goal(raw: &str) -> anyhow::Result<Option<u32>> {
    match raw.trim().to_lowercase().as_str() {
        "" => anyhow::bail!("usage: /set_goal N or /set_goal off"),
        "off" | "none" | "0" => Ok(None),
        value => Ok(Some(value.parse()?)),
    }
}

fn parse_templates(raw: &str) -> Vec<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|template| !template.is_empty())
        .map(str::to_owned)
        .collect()
}

pub struct TelegramNotifier {
    bot: Bot,
}

impl TelegramNotifier {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_text(&self, chat_id: crate::types::ChatId, text: &str) -> anyhow::Result<()> {
        self.bot.send_message(ChatId(chat_id), text).await?;
        Ok(())
    }
}

pub async fn start_telegram_bot(bot: Bot, service: Arc<ShiftService>) {
    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(
                    |bot: Bot, msg: Message, command: Command, service: Arc<ShiftService>| async move {
                        if let Err(error) = handle_command(&bot, &msg, command, &service).await {
                            error!(?error, chat_id = msg.chat.id.0, "command handler failed");
                        }
                        Ok::<(), anyhow::Error>(())
                    },
                ),
        )
        .branch(Update::filter_message().endpoint(
            |bot: Bot, msg: Message, service: Arc<ShiftService>| async move {
                if let Err(error) = handle_message(&bot, &msg, &service).await {
                    error!(?error, chat_id = msg.chat.id.0, "message handler failed");
                }
                Ok::<(), anyhow::Error>(())
            },
        ))
        .branch(Update::filter_callback_query().endpoint(
            |bot: Bot, q: CallbackQuery, service: Arc<ShiftService>| async move {
                if let Err(error) = handle_callback(&bot, &q, &service).await {
                    error!(?error, "callback handler failed");
                }
                Ok::<(), anyhow::Error>(())
            },
        ));

    info!("starting Telegram dispatcher");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![service])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn is_admin(bot: &Bot, chat_id: ChatId, user: &User) -> anyhow::Result<bool> {
    if chat_id.is_user() {
        return Ok(true);
    }
    let member = bot.get_chat_member(chat_id, user.id).await?;
    Ok(member.is_privileged())
}

async fn handle_command(
    bot: &Bot,
    msg: &Message,
    command: Command,
    service: &Arc<ShiftService>,
) -> anyhow::Result<()> {
    let Some(user) = msg.from.as_ref().filter(|user| !user.is_bot) else {
        return Ok(());
    };
    let chat = msg.chat.id;
    let now = Utc::now();
    let name = user.full_name();

    if !command.ignores_enabled_flag() && !service.chat_config(chat.0).await?.enabled {
        return Ok(());
    }
    if command.is_admin_only() && !is_admin(bot, chat, user).await? {
        bot.send_message(chat, "⛔ Only chat admins can do that.").await?;
        return Ok(());
    }

    let reply = match command {
        Command::Help => Command::descriptions().to_string(),
        Command::Join(raw) => {
            let role = match raw.trim() {
                "" => None,
                value => match Role::parse(value) {
                    Some(role) => Some(role),
                    None => {
                        bot.send_message(chat, "Usage: /join, /join host or /join co-host")
                            .await?;
                        return Ok(());
                    }
                },
            };
            let outcome = service.join(chat.0, user.id.0, &name, role, now).await?;
            replies::join(&outcome, &name)
        }
        Command::Status => match service.chat_state(chat.0).await {
            Some(state) => replies::status(&state, now),
            None => "No shift in progress.".to_owned(),
        },
        Command::Pause => {
            let outcome = service.start_pause(chat.0, user.id.0, now).await?;
            replies::pause(&outcome, &name, now)
        }
        Command::Resume => {
            let outcome = service.end_pause(chat.0, user.id.0, now).await?;
            replies::pause(&outcome, &name, now)
        }
        Command::Transfer => return request_transfer(bot, msg, user, service).await,
        Command::Report => {
            let outcome = service.end_shift(chat.0, now, EndTrigger::Manual).await?;
            replies::end_of_shift(&outcome)
        }
        Command::Enable => set_enabled(service, chat, true).await?,
        Command::Disable => set_enabled(service, chat, false).await?,
        Command::SetEndTime(raw) => match parse_end_time(&raw) {
            Ok(end_time) => {
                service
                    .update_config(chat.0, move |config| config.end_time = end_time)
                    .await?;
                format!("🕚 Shift ends at {}.", end_time.format("%H:%M"))
            }
            Err(error) => format!("⚠️ {error}"),
        },
        Command::SetTimezone(raw) => match parse_utc_offset(&raw) {
            Ok(minutes) => {
                let config = service
                    .update_config(chat.0, move |config| config.utc_offset_minutes = minutes)
                    .await?;
                format!("🌍 Chat time zone set to UTC{}.", config.offset())
            }
            Err(error) => format!("⚠️ {error}"),
        },
        Command::SetTimeout(raw) => match raw.trim().parse::<u32>() {
            Ok(minutes) if minutes > 0 => {
                service
                    .update_config(chat.0, move |config| config.voice_timeout_minutes = minutes)
                    .await?;
                format!("🔔 Inactivity reminder after {minutes} min.")
            }
            _ => "Usage: /set_timeout MINUTES".to_owned(),
        },
        Command::SetGoal(raw) => match parse_goal(&raw) {
            Ok(goal) => {
                service
                    .update_config(chat.0, move |config| config.goal_override = goal)
                    .await?;
                match goal {
                    Some(goal) => format!("🎯 Goal set to {goal} voice messages."),
                    None => "🎯 Goal override removed; roles set the goal again.".to_owned(),
                }
            }
            Err(error) => format!("⚠️ {error}"),
        },
        Command::SetTemplates(raw) => {
            let templates = parse_templates(&raw);
            let count = templates.len();
            service
                .update_config(chat.0, move |config| config.content_templates = templates)
                .await?;
            format!("📝 {count} content templates saved.")
        }
    };

    bot.send_message(chat, reply).await?;
    Ok(())
}

async fn set_enabled(
    service: &Arc<ShiftService>,
    chat: ChatId,
    enabled: bool,
) -> anyhow::Result<String> {
    service
        .update_config(chat.0, move |config| config.enabled = enabled)
        .await?;
    info!(chat_id = chat.0, enabled, "chat tracking toggled");
    Ok(if enabled {
        "▶️ Shift tracking is on.".to_owned()
    } else {
        "⏹ Shift tracking is off.".to_owned()
    })
}

async fn request_transfer(
    bot: &Bot,
    msg: &Message,
    user: &User,
    service: &Arc<ShiftService>,
) -> anyhow::Result<()> {
    let chat = msg.chat.id;
    let Some(target) = msg
        .reply_to_message()
        .and_then(|replied| replied.from.as_ref())
        .filter(|target| !target.is_bot)
    else {
        bot.send_message(chat, "Reply to a message of the person who takes over with /transfer.")
            .await?;
        return Ok(());
    };

    let now = Utc::now();
    let target_name = target.full_name();
    let outcome = service
        .request_transfer(chat.0, user.id.0, target.id.0, &target_name, now)
        .await?;
    let text = replies::transfer_request(&outcome, &user.full_name(), now);

    match &outcome {
        TransferOutcome::Requested(pending) => {
            bot.send_message(chat, text)
                .reply_markup(transfer_keyboard(pending.id))
                .await?;
        }
        _ => {
            bot.send_message(chat, text).await?;
        }
    }
    Ok(())
}

async fn handle_message(bot: &Bot, msg: &Message, service: &Arc<ShiftService>) -> anyhow::Result<()> {
    let Some(user) = msg.from.as_ref().filter(|user| !user.is_bot) else {
        return Ok(());
    };

    if let Some(voice) = msg.voice() {
        if !service.chat_config(msg.chat.id.0).await?.enabled {
            return Ok(());
        }
        return handle_voice(bot, msg, voice, user, service).await;
    }

    let Some(text) = msg.text().filter(|text| !text.starts_with('/')) else {
        return Ok(());
    };
    let Some(intent) = service.keywords().classify(text) else {
        return Ok(());
    };
    if !service.chat_config(msg.chat.id.0).await?.enabled {
        return Ok(());
    }

    let chat = msg.chat.id;
    let now = Utc::now();
    let name = user.full_name();
    let reply = match intent {
        KeywordIntent::Break => {
            let outcome = service.request_break(chat.0, user.id.0, now).await?;
            // Chatter that merely mentions a break should not draw a reply.
            if outcome == BreakOutcome::NotJoined {
                None
            } else {
                Some(replies::break_request(&outcome, &name, now))
            }
        }
        KeywordIntent::Return => {
            let outcome = service.record_return(chat.0, user.id.0, now).await?;
            replies::break_return(&outcome, &name)
        }
    };

    if let Some(reply) = reply {
        bot.send_message(chat, reply).await?;
    }
    Ok(())
}

async fn handle_voice(
    bot: &Bot,
    msg: &Message,
    voice: &Voice,
    user: &User,
    service: &Arc<ShiftService>,
) -> anyhow::Result<()> {
    let chat = msg.chat.id;
    let name = user.full_name();
    let outcome = service
        .record_voice(chat.0, user.id.0, &name, voice.duration.seconds(), Utc::now())
        .await?;

    if let Some(reply) = replies::voice(&outcome, &name) {
        bot.send_message(chat, reply).await?;
    }

    if matches!(outcome.verdict, VoiceVerdict::Counted { .. }) && service.speech_enabled() {
        let bot = bot.clone();
        let service = Arc::clone(service);
        let file_id = voice.file.id.clone();
        let user_id = user.id.0;
        tokio::spawn(async move {
            let result: anyhow::Result<Option<SpeechAnalysis>> = async {
                let file = bot.get_file(file_id).await?;
                let mut audio = Vec::new();
                bot.download_file(&file.path, &mut audio).await?;
                service.analyze_voice(chat.0, user_id, audio).await
            }
            .await;

            match result {
                Ok(Some(analysis)) => {
                    info!(chat_id = chat.0, user_id, tags = ?analysis.tags, "voice analyzed")
                }
                Ok(None) => {}
                Err(error) => warn!(?error, chat_id = chat.0, user_id, "speech analysis failed"),
            }
        });
    }

    Ok(())
}

async fn handle_callback(
    bot: &Bot,
    q: &CallbackQuery,
    service: &Arc<ShiftService>,
) -> anyhow::Result<()> {
    let Some((answer, request_id)) = q.data.as_deref().and_then(parse_transfer_callback) else {
        return Ok(());
    };
    bot.answer_callback_query(q.id.clone()).await?;

    let Some(message) = q.message.as_ref() else {
        return Ok(());
    };
    let chat = message.chat().id;
    let now = Utc::now();
    let name = q.from.full_name();

    let current = service
        .chat_state(chat.0)
        .await
        .and_then(|state| state.pending_transfer)
        .map(|pending| pending.id);
    if current != Some(request_id) {
        bot.send_message(chat, "⌛ This handover is no longer open.").await?;
        return Ok(());
    }

    let decision = match answer {
        TransferAnswer::Accept => service.accept_transfer(chat.0, q.from.id.0, now).await?,
        TransferAnswer::Decline => service.decline_transfer(chat.0, q.from.id.0, now).await?,
    };
    let text = replies::transfer_decision(&decision, &name);

    if let Some(regular) = message.regular_message() {
        bot.edit_message_text(chat, regular.id, text).await?;
    } else {
        bot.send_message(chat, text).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use teloxide::utils::command::BotCommands;

    use super::{
        Command, TransferAnswer, parse_goal, parse_templates, parse_transfer_callback,
        transfer_callback,
    };

    #[test]
    fn parses_commands_with_arguments() {
        assert_eq!(
            Command::parse("/join co-host", "shiftbot").expect("join should parse"),
            Command::Join("co-host".to_owned())
        );
        assert_eq!(
            Command::parse("/set_end_time 23:30", "shiftbot").expect("end time should parse"),
            Command::SetEndTime("23:30".to_owned())
        );
        assert!(Command::SetGoal(String::new()).is_admin_only());
        assert!(!Command::Status.is_admin_only());
    }

    #[test]
    fn transfer_callback_data_round_trips() {
        let data = transfer_callback(TransferAnswer::Decline, 42);
        assert_eq!(
            parse_transfer_callback(&data),
            Some((TransferAnswer::Decline, 42))
        );
        assert_eq!(parse_transfer_callback("transfer:maybe:1"), None);
        assert_eq!(parse_transfer_callback("other:accept:1"), None);
    }

    #[test]
    fn goal_and_template_arguments() {
        assert_eq!(parse_goal("20").unwrap(), Some(20));
        assert_eq!(parse_goal("off").unwrap(), None);
        assert!(parse_goal("lots").is_err());
        assert_eq!(
            parse_templates("birthday: happy birthday; ; encore"),
            vec!["birthday: happy birthday".to_owned(), "encore".to_owned()]
        );
    }
}
