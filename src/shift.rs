use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Utc};
use serde::Serialize;

use crate::{
    config::ShiftRules,
    report::{EndTrigger, ShiftReport, build_report},
    roles::{DayClass, RoleRejection, assign_role, roles_for},
    types::{PendingTransfer, Role, ShiftEventKind, ShiftState, UserActivity, UserId},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum JoinOutcome {
    Joined { role: Role, goal: u32, is_main: bool },
    AlreadyJoined { role: Role },
    Rejected(RoleRejection),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PauseEnd {
    pub elapsed_minutes: i64,
    pub expired: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BreakReturn {
    pub elapsed_minutes: i64,
    pub late: bool,
    pub late_returns: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum VoiceVerdict {
    Counted {
        count: u32,
        goal: u32,
        gap_minutes: Option<f64>,
    },
    BreakReturn(BreakReturn),
    TooSoon { remaining_secs: i64 },
    TooShort { min_secs: u32 },
    NotAssigned,
    Rejected(RoleRejection),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoiceOutcome {
    pub auto_joined: Option<Role>,
    pub pause_ended: Option<PauseEnd>,
    pub verdict: VoiceVerdict,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum BreakOutcome {
    Started {
        until: DateTime<Utc>,
        breaks_taken: u32,
    },
    NotJoined,
    NotMain,
    OnPause,
    AlreadyOnBreak,
    TooEarly { available_at: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ReturnOutcome {
    Returned(BreakReturn),
    NotOnBreak,
    NotJoined,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PauseOutcome {
    Started { until: DateTime<Utc> },
    Ended(PauseEnd),
    AlreadyPaused,
    NotPaused,
    NotJoined,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TransferOutcome {
    Requested(PendingTransfer),
    NotMain,
    SelfTarget,
    AlreadyPending { to_name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum TransferDecision {
    Accepted {
        request_id: u64,
        from_user: UserId,
        role: Role,
    },
    Declined {
        request_id: u64,
        from_user: UserId,
    },
    Expired {
        request_id: u64,
    },
    NoPending,
    NotTarget,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum EndOutcome {
    NoUsers,
    AlreadyReported { date: NaiveDate },
    Report(Box<ShiftReport>),
}

pub fn join(
    state: &mut ShiftState,
    user_id: UserId,
    display_name: &str,
    requested: Option<Role>,
    now: DateTime<Utc>,
    rules: &ShiftRules,
) -> JoinOutcome {
    if let Some(existing) = state.users.get(&user_id) {
        return JoinOutcome::AlreadyJoined {
            role: existing.role,
        };
    }

    let day = state.config.local_now(now).weekday();
    let day_roles = roles_for(day, rules);
    let role = match assign_role(&day_roles, state, requested) {
        Ok(role) => role,
        Err(rejection) => return JoinOutcome::Rejected(rejection),
    };

    let goal = state
        .config
        .goal_override
        .or_else(|| day_roles.goal_for(role))
        .unwrap_or_default();

    state.users.insert(
        user_id,
        UserActivity::new(user_id, display_name, role, goal, now),
    );
    let is_main = state.main_user.is_none();
    if is_main {
        state.main_user = Some(user_id);
    }
    state.started_at.get_or_insert(now);
    state.refresh_goal();
    state.record(
        now,
        Some(user_id),
        ShiftEventKind::Joined,
        format!("{display_name} joined as {role}"),
    );

    JoinOutcome::Joined {
        role,
        goal,
        is_main,
    }
}

pub fn record_voice(
    state: &mut ShiftState,
    user_id: UserId,
    display_name: &str,
    duration_secs: u32,
    now: DateTime<Utc>,
    rules: &ShiftRules,
) -> VoiceOutcome {
    let mut outcome = VoiceOutcome {
        auto_joined: None,
        pause_ended: None,
        verdict: VoiceVerdict::NotAssigned,
    };

    if !state.users.contains_key(&user_id) {
        let day = DayClass::of(state.config.local_now(now).weekday());
        if !state.users.is_empty() && day == DayClass::Weekday {
            return outcome;
        }
        if duration_secs < rules.min_voice_duration_secs {
            outcome.verdict = VoiceVerdict::TooShort {
                min_secs: rules.min_voice_duration_secs,
            };
            return outcome;
        }
        match join(state, user_id, display_name, None, now, rules) {
            JoinOutcome::Joined { role, .. } => outcome.auto_joined = Some(role),
            JoinOutcome::Rejected(rejection) => {
                outcome.verdict = VoiceVerdict::Rejected(rejection);
                return outcome;
            }
            JoinOutcome::AlreadyJoined { .. } => {}
        }
    }

    outcome.pause_ended = expire_pause_if_due(state, user_id, now, rules)
        .or_else(|| close_pause(state, user_id, now, false));

    let Some(user) = state.users.get(&user_id) else {
        return outcome;
    };
    if user.is_on_break() {
        if let ReturnOutcome::Returned(back) = record_return(state, user_id, now, rules) {
            outcome.verdict = VoiceVerdict::BreakReturn(back);
        }
        return outcome;
    }

    if let Some(last) = user.last_voice_at {
        let elapsed = now - last;
        if elapsed < rules.voice_cooldown {
            let remaining = rules.voice_cooldown - elapsed;
            outcome.verdict = VoiceVerdict::TooSoon {
                remaining_secs: (remaining.num_milliseconds() + 999) / 1000,
            };
            return outcome;
        }
    }

    if duration_secs < rules.min_voice_duration_secs {
        outcome.verdict = VoiceVerdict::TooShort {
            min_secs: rules.min_voice_duration_secs,
        };
        return outcome;
    }

    state.started_at.get_or_insert(now);
    let Some(user) = state.users.get_mut(&user_id) else {
        return outcome;
    };
    let gap_minutes = user
        .last_voice_at
        .map(|last| (now - last).num_seconds() as f64 / 60.0);
    if let Some(gap) = gap_minutes {
        user.voice_gaps_minutes.push(gap);
    }
    user.voice_durations_secs.push(duration_secs);
    user.count += 1;
    user.last_voice_at = Some(now);
    user.inactivity_reminder_sent = false;

    outcome.verdict = VoiceVerdict::Counted {
        count: user.count,
        goal: user.goal,
        gap_minutes,
    };
    outcome
}

pub fn request_break(
    state: &mut ShiftState,
    user_id: UserId,
    now: DateTime<Utc>,
    rules: &ShiftRules,
) -> BreakOutcome {
    if !state.users.contains_key(&user_id) {
        return BreakOutcome::NotJoined;
    }
    if state.main_user != Some(user_id) {
        return BreakOutcome::NotMain;
    }
    expire_pause_if_due(state, user_id, now, rules);

    let Some(user) = state.users.get_mut(&user_id) else {
        return BreakOutcome::NotJoined;
    };
    if user.is_on_pause() {
        return BreakOutcome::OnPause;
    }
    if user.is_on_break() {
        return BreakOutcome::AlreadyOnBreak;
    }
    if let Some(ended) = user.break_ended_at {
        let available_at = ended + rules.break_delay;
        if now < available_at {
            return BreakOutcome::TooEarly { available_at };
        }
    }

    user.begin_break(now);
    let breaks_taken = user.breaks_taken;
    state.record(
        now,
        Some(user_id),
        ShiftEventKind::BreakStarted,
        format!("break #{breaks_taken}"),
    );

    BreakOutcome::Started {
        until: now + rules.break_duration,
        breaks_taken,
    }
}

pub fn record_return(
    state: &mut ShiftState,
    user_id: UserId,
    now: DateTime<Utc>,
    rules: &ShiftRules,
) -> ReturnOutcome {
    let Some(user) = state.users.get_mut(&user_id) else {
        return ReturnOutcome::NotJoined;
    };
    if !user.is_on_break() {
        return ReturnOutcome::NotOnBreak;
    }

    let elapsed = user.end_break(now);
    let late = elapsed > rules.break_duration;
    if late {
        user.late_returns += 1;
    }
    let back = BreakReturn {
        elapsed_minutes: elapsed.num_minutes(),
        late,
        late_returns: user.late_returns,
    };

    state.record(
        now,
        Some(user_id),
        ShiftEventKind::BreakEnded,
        if late {
            format!("late return after {} min", back.elapsed_minutes)
        } else {
            format!("returned after {} min", back.elapsed_minutes)
        },
    );

    ReturnOutcome::Returned(back)
}

pub fn start_pause(
    state: &mut ShiftState,
    user_id: UserId,
    now: DateTime<Utc>,
    rules: &ShiftRules,
) -> PauseOutcome {
    if !state.users.contains_key(&user_id) {
        return PauseOutcome::NotJoined;
    }
    expire_pause_if_due(state, user_id, now, rules);

    let Some(user) = state.users.get_mut(&user_id) else {
        return PauseOutcome::NotJoined;
    };
    if user.is_on_pause() {
        return PauseOutcome::AlreadyPaused;
    }

    user.begin_pause(now);
    state.record(now, Some(user_id), ShiftEventKind::PauseStarted, "pause");

    PauseOutcome::Started {
        until: now + rules.pause_duration,
    }
}

pub fn end_pause(
    state: &mut ShiftState,
    user_id: UserId,
    now: DateTime<Utc>,
    rules: &ShiftRules,
) -> PauseOutcome {
    if !state.users.contains_key(&user_id) {
        return PauseOutcome::NotJoined;
    }

    match expire_pause_if_due(state, user_id, now, rules)
        .or_else(|| close_pause(state, user_id, now, false))
    {
        Some(ended) => PauseOutcome::Ended(ended),
        None => PauseOutcome::NotPaused,
    }
}

pub fn expire_pause_if_due(
    state: &mut ShiftState,
    user_id: UserId,
    now: DateTime<Utc>,
    rules: &ShiftRules,
) -> Option<PauseEnd> {
    let user = state.users.get(&user_id)?;
    let started = user.pause_started_at?;
    if user.is_on_pause() && now - started >= rules.pause_duration {
        close_pause(state, user_id, now, true)
    } else {
        None
    }
}

fn close_pause(
    state: &mut ShiftState,
    user_id: UserId,
    now: DateTime<Utc>,
    expired: bool,
) -> Option<PauseEnd> {
    let user = state.users.get_mut(&user_id)?;
    if !user.is_on_pause() {
        return None;
    }

    let ended = PauseEnd {
        elapsed_minutes: user.end_pause(now).num_minutes(),
        expired,
    };
    state.record(
        now,
        Some(user_id),
        ShiftEventKind::PauseEnded,
        if expired {
            format!("pause expired after {} min", ended.elapsed_minutes)
        } else {
            format!("pause ended after {} min", ended.elapsed_minutes)
        },
    );
    Some(ended)
}

pub fn request_transfer(
    state: &mut ShiftState,
    from_user: UserId,
    to_user: UserId,
    to_name: &str,
    now: DateTime<Utc>,
    rules: &ShiftRules,
) -> TransferOutcome {
    if state.main_user != Some(from_user) || !state.users.contains_key(&from_user) {
        return TransferOutcome::NotMain;
    }
    if from_user == to_user {
        return TransferOutcome::SelfTarget;
    }
    if let Some(pending) = state
        .pending_transfer
        .as_ref()
        .filter(|pending| pending.expires_at > now)
    {
        return TransferOutcome::AlreadyPending {
            to_name: pending.to_name.clone(),
        };
    }

    let id = state.next_transfer_id.max(1);
    state.next_transfer_id = id + 1;
    let timeout = TimeDelta::from_std(rules.transfer_timeout).unwrap_or(TimeDelta::minutes(5));
    let pending = PendingTransfer {
        id,
        from_user,
        to_user,
        to_name: to_name.to_owned(),
        requested_at: now,
        expires_at: now + timeout,
    };
    state.pending_transfer = Some(pending.clone());
    state.record(
        now,
        Some(from_user),
        ShiftEventKind::TransferRequested,
        format!("transfer #{id} to {to_name}"),
    );

    TransferOutcome::Requested(pending)
}

/// Hands the main seat over. A target already in the shift swaps role and
/// goal with the outgoing user; a new target inherits them and the outgoing
/// user is retired.
pub fn accept_transfer(
    state: &mut ShiftState,
    user_id: UserId,
    now: DateTime<Utc>,
) -> TransferDecision {
    let pending = match take_pending_for(state, user_id, now) {
        Ok(pending) => pending,
        Err(decision) => return decision,
    };

    let Some(mut outgoing) = state.users.remove(&pending.from_user) else {
        state.record(
            now,
            Some(user_id),
            ShiftEventKind::TransferExpired,
            format!("transfer #{} dropped, sender left", pending.id),
        );
        return TransferDecision::NoPending;
    };
    let role = outgoing.role;

    match state.users.remove(&user_id) {
        Some(mut incoming) => {
            std::mem::swap(&mut incoming.role, &mut outgoing.role);
            std::mem::swap(&mut incoming.goal, &mut outgoing.goal);
            state.users.insert(user_id, incoming);
            state.users.insert(outgoing.user_id, outgoing);
        }
        None => {
            let incoming = UserActivity::new(
                user_id,
                pending.to_name.clone(),
                outgoing.role,
                outgoing.goal,
                now,
            );
            state.users.insert(user_id, incoming);
            state.retired.push(outgoing);
        }
    }

    state.main_user = Some(user_id);
    state.refresh_goal();
    state.record(
        now,
        Some(user_id),
        ShiftEventKind::TransferAccepted,
        format!("transfer #{} accepted as {role}", pending.id),
    );

    TransferDecision::Accepted {
        request_id: pending.id,
        from_user: pending.from_user,
        role,
    }
}

pub fn decline_transfer(
    state: &mut ShiftState,
    user_id: UserId,
    now: DateTime<Utc>,
) -> TransferDecision {
    let pending = match take_pending_for(state, user_id, now) {
        Ok(pending) => pending,
        Err(decision) => return decision,
    };

    state.record(
        now,
        Some(user_id),
        ShiftEventKind::TransferDeclined,
        format!("transfer #{} declined", pending.id),
    );
    TransferDecision::Declined {
        request_id: pending.id,
        from_user: pending.from_user,
    }
}

/// Drops the pending transfer only if it is still the request `request_id`.
pub fn expire_transfer(
    state: &mut ShiftState,
    request_id: u64,
    now: DateTime<Utc>,
) -> Option<PendingTransfer> {
    if state.pending_transfer.as_ref()?.id != request_id {
        return None;
    }
    let pending = state.pending_transfer.take()?;
    state.record(
        now,
        Some(pending.from_user),
        ShiftEventKind::TransferExpired,
        format!("transfer #{} expired", pending.id),
    );
    Some(pending)
}

fn take_pending_for(
    state: &mut ShiftState,
    user_id: UserId,
    now: DateTime<Utc>,
) -> Result<PendingTransfer, TransferDecision> {
    let pending = state
        .pending_transfer
        .as_ref()
        .ok_or(TransferDecision::NoPending)?;
    if pending.to_user != user_id {
        return Err(TransferDecision::NotTarget);
    }
    if pending.expires_at <= now {
        let request_id = pending.id;
        expire_transfer(state, request_id, now);
        return Err(TransferDecision::Expired { request_id });
    }
    state
        .pending_transfer
        .take()
        .ok_or(TransferDecision::NoPending)
}

pub fn finish_shift(state: &mut ShiftState, now: DateTime<Utc>, trigger: EndTrigger) -> EndOutcome {
    let date = state.config.local_date(now);
    if state.last_report_date == Some(date) {
        return EndOutcome::AlreadyReported { date };
    }
    if state.is_idle() {
        return EndOutcome::NoUsers;
    }

    let report = build_report(state, now, trigger);
    state.last_report_date = Some(date);
    state.record(
        now,
        state.main_user,
        ShiftEventKind::ShiftEnded,
        format!(
            "{}/{} ({:.0}%), {:?}",
            report.count, report.goal, report.percentage, trigger
        ),
    );
    state.reset();

    EndOutcome::Report(Box::new(report))
}

pub fn summary(state: &ShiftState, now: DateTime<Utc>) -> Option<ShiftReport> {
    if state.is_idle() {
        return None;
    }
    Some(build_report(state, now, EndTrigger::Manual))
}
