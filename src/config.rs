use std::{env, net::SocketAddr, path::PathBuf, time::Duration};

use chrono::{NaiveTime, TimeDelta};

use crate::{keywords::KeywordPolicy, types::ChatConfig};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_bind: SocketAddr,
    pub telegram_token: Option<String>,
    pub database_url: Option<String>,
    pub snapshot_path: PathBuf,
    pub openai_api_key: Option<String>,
    pub openai_stt_model: String,
    pub speech_analysis_enabled: bool,
    pub export_webhook_url: Option<String>,
    pub export_webhook_token: Option<String>,
    pub voice_cooldown_sec: u64,
    pub min_voice_duration_sec: u64,
    pub break_duration_min: u64,
    pub break_delay_min: u64,
    pub pause_duration_min: u64,
    pub break_reminder_interval_min: u64,
    pub transfer_timeout_sec: u64,
    pub tick_interval_sec: u64,
    pub snapshot_interval_sec: u64,
    pub default_voice_timeout_min: u64,
    pub default_end_time: NaiveTime,
    pub default_utc_offset_minutes: i32,
    pub weekday_host_goal: u64,
    pub weekend_host_goal: u64,
    pub weekend_cohost_goal: u64,
    pub break_keywords: Option<Vec<String>>,
    pub return_keywords: Option<Vec<String>>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let port = env::var("PORT").unwrap_or_else(|_| "8080".to_owned());
        let http_bind = env::var("HTTP_BIND").unwrap_or_else(|_| format!("0.0.0.0:{port}"));
        let http_bind = http_bind.parse()?;

        let default_end_time = match env::var("DEFAULT_END_TIME") {
            Ok(raw) => parse_end_time(&raw)?,
            Err(_) => NaiveTime::from_hms_opt(23, 0, 0).unwrap_or(NaiveTime::MIN),
        };
        let default_utc_offset_minutes = match env::var("DEFAULT_UTC_OFFSET") {
            Ok(raw) => parse_utc_offset(&raw)?,
            Err(_) => 0,
        };

        Ok(Self {
            http_bind,
            telegram_token: env::var("TELOXIDE_TOKEN")
                .or_else(|_| env::var("TELEGRAM_BOT_TOKEN"))
                .ok(),
            database_url: env::var("DATABASE_URL").ok(),
            snapshot_path: env::var("SNAPSHOT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/shift_snapshot.json")),
            openai_api_key: env::var("OPENAI_API_KEY").ok(),
            openai_stt_model: env::var("OPENAI_STT_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini-transcribe".to_owned()),
            speech_analysis_enabled: env_bool("SPEECH_ANALYSIS_ENABLED", true),
            export_webhook_url: env::var("EXPORT_WEBHOOK_URL").ok(),
            export_webhook_token: env::var("EXPORT_WEBHOOK_TOKEN").ok(),
            voice_cooldown_sec: env_u64("VOICE_COOLDOWN_SEC", 60),
            min_voice_duration_sec: env_u64("MIN_VOICE_DURATION_SEC", 5),
            break_duration_min: env_u64("BREAK_DURATION_MIN", 15),
            break_delay_min: env_u64("BREAK_DELAY_MIN", 60),
            pause_duration_min: env_u64("PAUSE_DURATION_MIN", 30),
            break_reminder_interval_min: env_u64("BREAK_REMINDER_INTERVAL_MIN", 2),
            transfer_timeout_sec: env_u64("TRANSFER_TIMEOUT_SEC", 300),
            tick_interval_sec: env_u64("TICK_INTERVAL_SEC", 60),
            snapshot_interval_sec: env_u64("SNAPSHOT_INTERVAL_SEC", 300),
            default_voice_timeout_min: env_u64("DEFAULT_VOICE_TIMEOUT_MIN", 30),
            default_end_time,
            default_utc_offset_minutes,
            weekday_host_goal: env_u64("WEEKDAY_HOST_GOAL", 18),
            weekend_host_goal: env_u64("WEEKEND_HOST_GOAL", 15),
            weekend_cohost_goal: env_u64("WEEKEND_COHOST_GOAL", 15),
            break_keywords: env_list("BREAK_KEYWORDS"),
            return_keywords: env_list("RETURN_KEYWORDS"),
        })
    }

    pub fn keyword_policy(&self) -> KeywordPolicy {
        let defaults = KeywordPolicy::default();
        KeywordPolicy::new(
            self.break_keywords
                .clone()
                .unwrap_or_else(|| defaults.break_terms().to_vec()),
            self.return_keywords
                .clone()
                .unwrap_or_else(|| defaults.return_terms().to_vec()),
        )
    }

    pub fn shift_rules(&self) -> anyhow::Result<ShiftRules> {
        Ok(ShiftRules {
            voice_cooldown: seconds("VOICE_COOLDOWN_SEC", self.voice_cooldown_sec)?,
            min_voice_duration_secs: narrow("MIN_VOICE_DURATION_SEC", self.min_voice_duration_sec)?,
            break_duration: minutes("BREAK_DURATION_MIN", self.break_duration_min)?,
            break_delay: minutes("BREAK_DELAY_MIN", self.break_delay_min)?,
            pause_duration: minutes("PAUSE_DURATION_MIN", self.pause_duration_min)?,
            break_reminder_interval: minutes(
                "BREAK_REMINDER_INTERVAL_MIN",
                self.break_reminder_interval_min,
            )?,
            transfer_timeout: Duration::from_secs(self.transfer_timeout_sec),
            tick_interval: Duration::from_secs(self.tick_interval_sec.max(1)),
            snapshot_interval: Duration::from_secs(self.snapshot_interval_sec.max(1)),
            default_voice_timeout_minutes: narrow(
                "DEFAULT_VOICE_TIMEOUT_MIN",
                self.default_voice_timeout_min,
            )?,
            default_end_time: self.default_end_time,
            default_utc_offset_minutes: self.default_utc_offset_minutes,
            weekday_host_goal: narrow("WEEKDAY_HOST_GOAL", self.weekday_host_goal)?,
            weekend_host_goal: narrow("WEEKEND_HOST_GOAL", self.weekend_host_goal)?,
            weekend_cohost_goal: narrow("WEEKEND_COHOST_GOAL", self.weekend_cohost_goal)?,
        })
    }
}

fn seconds(name: &str, value: u64) -> anyhow::Result<TimeDelta> {
    i64::try_from(value)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .ok_or_else(|| anyhow::anyhow!("{name} is out of range: {value}"))
}

fn minutes(name: &str, value: u64) -> anyhow::Result<TimeDelta> {
    i64::try_from(value)
        .ok()
        .and_then(TimeDelta::try_minutes)
        .ok_or_else(|| anyhow::anyhow!("{name} is out of range: {value}"))
}

fn narrow(name: &str, value: u64) -> anyhow::Result<u32> {
    u32::try_from(value).map_err(|_| anyhow::anyhow!("{name} is out of range: {value}"))
}

#[derive(Debug, Clone)]
pub struct ShiftRules {
    pub voice_cooldown: TimeDelta,
    pub min_voice_duration_secs: u32,
    pub break_duration: TimeDelta,
    pub break_delay: TimeDelta,
    pub pause_duration: TimeDelta,
    pub break_reminder_interval: TimeDelta,
    pub transfer_timeout: Duration,
    pub tick_interval: Duration,
    pub snapshot_interval: Duration,
    pub default_voice_timeout_minutes: u32,
    pub default_end_time: NaiveTime,
    pub default_utc_offset_minutes: i32,
    pub weekday_host_goal: u32,
    pub weekend_host_goal: u32,
    pub weekend_cohost_goal: u32,
}

impl Default for ShiftRules {
    fn default() -> Self {
        Self {
            voice_cooldown: TimeDelta::seconds(60),
            min_voice_duration_secs: 5,
            break_duration: TimeDelta::minutes(15),
            break_delay: TimeDelta::minutes(60),
            pause_duration: TimeDelta::minutes(30),
            break_reminder_interval: TimeDelta::minutes(2),
            transfer_timeout: Duration::from_secs(300),
            tick_interval: Duration::from_secs(60),
            snapshot_interval: Duration::from_secs(300),
            default_voice_timeout_minutes: 30,
            default_end_time: NaiveTime::from_hms_opt(23, 0, 0).unwrap_or(NaiveTime::MIN),
            default_utc_offset_minutes: 0,
            weekday_host_goal: 18,
            weekend_host_goal: 15,
            weekend_cohost_goal: 15,
        }
    }
}

impl ShiftRules {
    pub fn default_chat_config(&self) -> ChatConfig {
        ChatConfig {
            enabled: true,
            utc_offset_minutes: self.default_utc_offset_minutes,
            end_time: self.default_end_time,
            voice_timeout_minutes: self.default_voice_timeout_minutes,
            goal_override: None,
            content_templates: Vec::new(),
        }
    }
}

pub fn parse_end_time(raw: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|error| anyhow::anyhow!("invalid time `{raw}`, expected HH:MM: {error}"))
}

pub fn parse_utc_offset(raw: &str) -> anyhow::Result<i32> {
    let trimmed = raw.trim();
    let body = trimmed
        .strip_prefix("UTC")
        .or_else(|| trimmed.strip_prefix("utc"))
        .or_else(|| trimmed.strip_prefix("GMT"))
        .unwrap_or(trimmed)
        .trim();

    if body.is_empty() {
        return Ok(0);
    }

    let (sign, digits) = match body.as_bytes()[0] {
        b'+' => (1, &body[1..]),
        b'-' => (-1, &body[1..]),
        _ => (1, body),
    };

    let (hours, minutes) = match digits.split_once(':') {
        Some((hours, minutes)) => (hours.parse::<i32>()?, minutes.parse::<i32>()?),
        None => (digits.parse::<i32>()?, 0),
    };

    if hours > 14 || !(0..60).contains(&minutes) {
        anyhow::bail!("UTC offset out of range: {raw}");
    }

    Ok(sign * (hours * 60 + minutes))
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_bool(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

fn env_list(name: &str) -> Option<Vec<String>> {
    env::var(name).ok().map(|raw| split_list(&raw)).filter(|items| !items.is_empty())
}

pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveTime;

    use super::{ShiftRules, minutes, narrow, parse_end_time, parse_utc_offset, seconds, split_list};

    #[test]
    fn oversized_durations_are_rejected_instead_of_panicking() {
        assert_eq!(
            minutes("BREAK_DURATION_MIN", 15)
                .expect("small value should convert")
                .num_minutes(),
            15
        );
        assert!(minutes("BREAK_DURATION_MIN", u64::MAX).is_err());
        assert!(minutes("BREAK_DURATION_MIN", 1_000_000_000_000_000_000).is_err());
        assert!(seconds("VOICE_COOLDOWN_SEC", i64::MAX as u64).is_err());
        assert!(narrow("WEEKDAY_HOST_GOAL", u64::from(u32::MAX) + 1).is_err());
    }

    #[test]
    fn keyword_lists_are_trimmed_and_lowercased() {
        assert_eq!(
            split_list(" Перерыв, BRB ,,smoke "),
            vec!["перерыв".to_owned(), "brb".to_owned(), "smoke".to_owned()]
        );
        assert!(split_list(" , ").is_empty());
    }

    #[test]
    fn parses_offsets_in_common_forms() {
        assert_eq!(parse_utc_offset("+03:00").unwrap(), 180);
        assert_eq!(parse_utc_offset("UTC+3").unwrap(), 180);
        assert_eq!(parse_utc_offset("-5").unwrap(), -300);
        assert_eq!(parse_utc_offset("+05:30").unwrap(), 330);
        assert_eq!(parse_utc_offset("UTC").unwrap(), 0);
        assert!(parse_utc_offset("+25").is_err());
        assert!(parse_utc_offset("Europe/Moscow").is_err());
    }

    #[test]
    fn parses_end_time() {
        assert_eq!(
            parse_end_time("23:30").unwrap(),
            NaiveTime::from_hms_opt(23, 30, 0).unwrap()
        );
        assert!(parse_end_time("25:00").is_err());
    }

    #[test]
    fn default_chat_config_follows_rules() {
        let rules = ShiftRules {
            default_voice_timeout_minutes: 45,
            default_utc_offset_minutes: 120,
            ..ShiftRules::default()
        };
        let config = rules.default_chat_config();
        assert_eq!(config.voice_timeout_minutes, 45);
        assert_eq!(config.utc_offset_minutes, 120);
        assert!(config.enabled);
    }
}
