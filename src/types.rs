use std::{collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

pub type ChatId = i64;
pub type UserId = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Host,
    CoHost,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Host => "host",
            Role::CoHost => "co-host",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "host" | "main" | "ведущий" => Some(Role::Host),
            "co-host" | "cohost" | "co_host" | "second" | "соведущий" => Some(Role::CoHost),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityStatus {
    Active,
    OnBreak,
    OnPause,
}

/// Per-user progress and timers within one shift.
///
/// `on_break` and `on_pause` are only changed through the `begin_*` / `end_*`
/// methods so the two flags can never be set at the same time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserActivity {
    pub user_id: UserId,
    pub display_name: String,
    pub role: Role,
    pub goal: u32,
    pub count: u32,
    pub joined_at: DateTime<Utc>,
    pub last_voice_at: Option<DateTime<Utc>>,
    pub break_started_at: Option<DateTime<Utc>>,
    pub last_break_at: Option<DateTime<Utc>>,
    pub break_ended_at: Option<DateTime<Utc>>,
    pub break_reminder_at: Option<DateTime<Utc>>,
    pub pause_started_at: Option<DateTime<Utc>>,
    pub pause_ended_at: Option<DateTime<Utc>>,
    on_break: bool,
    on_pause: bool,
    pub inactivity_reminder_sent: bool,
    pub breaks_taken: u32,
    pub late_returns: u32,
    pub voice_gaps_minutes: Vec<f64>,
    pub voice_durations_secs: Vec<u32>,
    pub content_tags: Vec<String>,
}

impl UserActivity {
    pub fn new(
        user_id: UserId,
        display_name: impl Into<String>,
        role: Role,
        goal: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            display_name: display_name.into(),
            role,
            goal,
            count: 0,
            joined_at: now,
            last_voice_at: None,
            break_started_at: None,
            last_break_at: None,
            break_ended_at: None,
            break_reminder_at: None,
            pause_started_at: None,
            pause_ended_at: None,
            on_break: false,
            on_pause: false,
            inactivity_reminder_sent: false,
            breaks_taken: 0,
            late_returns: 0,
            voice_gaps_minutes: Vec::new(),
            voice_durations_secs: Vec::new(),
            content_tags: Vec::new(),
        }
    }

    pub fn status(&self) -> ActivityStatus {
        if self.on_break {
            ActivityStatus::OnBreak
        } else if self.on_pause {
            ActivityStatus::OnPause
        } else {
            ActivityStatus::Active
        }
    }

    pub fn is_on_break(&self) -> bool {
        self.on_break
    }

    pub fn is_on_pause(&self) -> bool {
        self.on_pause
    }

    pub(crate) fn begin_break(&mut self, now: DateTime<Utc>) {
        if self.on_pause {
            self.end_pause(now);
        }
        self.on_break = true;
        self.break_started_at = Some(now);
        self.last_break_at = Some(now);
        self.break_reminder_at = None;
        self.breaks_taken += 1;
    }

    pub(crate) fn end_break(&mut self, now: DateTime<Utc>) -> TimeDelta {
        let started = self.break_started_at.unwrap_or(now);
        self.on_break = false;
        self.break_ended_at = Some(now);
        self.break_reminder_at = None;
        now - started
    }

    pub(crate) fn begin_pause(&mut self, now: DateTime<Utc>) {
        if self.on_break {
            self.on_break = false;
            self.break_ended_at = Some(now);
            self.break_reminder_at = None;
        }
        self.on_pause = true;
        self.pause_started_at = Some(now);
    }

    pub(crate) fn end_pause(&mut self, now: DateTime<Utc>) -> TimeDelta {
        let started = self.pause_started_at.unwrap_or(now);
        self.on_pause = false;
        self.pause_ended_at = Some(now);
        now - started
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        [
            self.last_voice_at,
            self.break_ended_at,
            self.pause_ended_at,
        ]
        .into_iter()
        .flatten()
        .fold(self.joined_at, |latest, at| latest.max(at))
    }

    pub fn add_tags<I>(&mut self, tags: I)
    where
        I: IntoIterator<Item = String>,
    {
        for tag in tags {
            if !self.content_tags.contains(&tag) {
                self.content_tags.push(tag);
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatConfig {
    pub enabled: bool,
    pub utc_offset_minutes: i32,
    pub end_time: NaiveTime,
    pub voice_timeout_minutes: u32,
    pub goal_override: Option<u32>,
    #[serde(default)]
    pub content_templates: Vec<String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            utc_offset_minutes: 0,
            end_time: NaiveTime::from_hms_opt(23, 0, 0).unwrap_or(NaiveTime::MIN),
            voice_timeout_minutes: 30,
            goal_override: None,
            content_templates: Vec::new(),
        }
    }
}

impl ChatConfig {
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix())
    }

    pub fn local_now(&self, now: DateTime<Utc>) -> DateTime<FixedOffset> {
        now.with_timezone(&self.offset())
    }

    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        self.local_now(now).date_naive()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingTransfer {
    pub id: u64,
    pub from_user: UserId,
    pub to_user: UserId,
    pub to_name: String,
    pub requested_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ShiftEventKind {
    Joined,
    BreakStarted,
    BreakEnded,
    PauseStarted,
    PauseEnded,
    TransferRequested,
    TransferAccepted,
    TransferDeclined,
    TransferExpired,
    ShiftEnded,
}

impl ShiftEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ShiftEventKind::Joined => "joined",
            ShiftEventKind::BreakStarted => "break_started",
            ShiftEventKind::BreakEnded => "break_ended",
            ShiftEventKind::PauseStarted => "pause_started",
            ShiftEventKind::PauseEnded => "pause_ended",
            ShiftEventKind::TransferRequested => "transfer_requested",
            ShiftEventKind::TransferAccepted => "transfer_accepted",
            ShiftEventKind::TransferDeclined => "transfer_declined",
            ShiftEventKind::TransferExpired => "transfer_expired",
            ShiftEventKind::ShiftEnded => "shift_ended",
        }
    }
}

impl FromStr for ShiftEventKind {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let kind = match raw {
            "joined" => ShiftEventKind::Joined,
            "break_started" => ShiftEventKind::BreakStarted,
            "break_ended" => ShiftEventKind::BreakEnded,
            "pause_started" => ShiftEventKind::PauseStarted,
            "pause_ended" => ShiftEventKind::PauseEnded,
            "transfer_requested" => ShiftEventKind::TransferRequested,
            "transfer_accepted" => ShiftEventKind::TransferAccepted,
            "transfer_declined" => ShiftEventKind::TransferDeclined,
            "transfer_expired" => ShiftEventKind::TransferExpired,
            "shift_ended" => ShiftEventKind::ShiftEnded,
            other => anyhow::bail!("unknown shift event kind: {other}"),
        };
        Ok(kind)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShiftEvent {
    pub chat_id: ChatId,
    pub user_id: Option<UserId>,
    pub kind: ShiftEventKind,
    pub detail: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShiftState {
    pub chat_id: ChatId,
    pub main_user: Option<UserId>,
    pub started_at: Option<DateTime<Utc>>,
    pub goal: u32,
    pub config: ChatConfig,
    pub users: BTreeMap<UserId, UserActivity>,
    #[serde(default)]
    pub retired: Vec<UserActivity>,
    pub last_report_date: Option<NaiveDate>,
    pub pending_transfer: Option<PendingTransfer>,
    #[serde(default)]
    pub next_transfer_id: u64,
    #[serde(default)]
    pub journal: Vec<ShiftEvent>,
}

impl ShiftState {
    pub fn new(chat_id: ChatId, config: ChatConfig) -> Self {
        Self {
            chat_id,
            main_user: None,
            started_at: None,
            goal: 0,
            config,
            users: BTreeMap::new(),
            retired: Vec::new(),
            last_report_date: None,
            pending_transfer: None,
            next_transfer_id: 1,
            journal: Vec::new(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.users.is_empty() && self.retired.is_empty()
    }

    pub fn holder_of(&self, role: Role) -> Option<&UserActivity> {
        self.users.values().find(|user| user.role == role)
    }

    pub fn main_activity(&self) -> Option<&UserActivity> {
        self.main_user.and_then(|id| self.users.get(&id))
    }

    pub fn refresh_goal(&mut self) {
        self.goal = self.users.values().map(|user| user.goal).sum();
    }

    pub fn record(
        &mut self,
        timestamp: DateTime<Utc>,
        user_id: Option<UserId>,
        kind: ShiftEventKind,
        detail: impl Into<String>,
    ) {
        self.journal.push(ShiftEvent {
            chat_id: self.chat_id,
            user_id,
            kind,
            detail: detail.into(),
            timestamp,
        });
    }

    pub fn drain_journal(&mut self) -> Vec<ShiftEvent> {
        std::mem::take(&mut self.journal)
    }

    pub fn reset(&mut self) {
        self.main_user = None;
        self.started_at = None;
        self.goal = 0;
        self.users.clear();
        self.retired.clear();
        self.pending_transfer = None;
    }
}
