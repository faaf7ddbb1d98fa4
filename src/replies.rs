use std::fmt::Write as _;

use chrono::{DateTime, Utc};

use crate::{
    report::percentage,
    roles::RoleRejection,
    scheduler::Notice,
    shift::{
        BreakOutcome, EndOutcome, JoinOutcome, PauseEnd, PauseOutcome, ReturnOutcome,
        TransferDecision, TransferOutcome, VoiceOutcome, VoiceVerdict,
    },
    types::{ActivityStatus, PendingTransfer, ShiftState},
};

fn minutes_until(at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = (at - now).num_seconds().max(0);
    (seconds + 59) / 60
}

pub fn role_rejection(rejection: &RoleRejection) -> String {
    match rejection {
        RoleRejection::Taken { role, holder } => {
            format!("⛔ The {role} role is already taken by {holder}.")
        }
        RoleRejection::Unavailable { role, day } => {
            format!("⛔ There is no {role} role on a {day}.")
        }
        RoleRejection::NoneLeft => "⛔ All roles for today are taken.".to_owned(),
    }
}

pub fn join(outcome: &JoinOutcome, name: &str) -> String {
    match outcome {
        JoinOutcome::Joined {
            role,
            goal,
            is_main,
        } => {
            let main = if *is_main { ", main for this shift" } else { "" };
            format!("👋 {name} joined as {role}{main}. Goal: {goal} voice messages.")
        }
        JoinOutcome::AlreadyJoined { role } => format!("{name}, you are already on shift as {role}."),
        JoinOutcome::Rejected(rejection) => role_rejection(rejection),
    }
}

fn pause_end(ended: &PauseEnd, name: &str) -> String {
    if ended.expired {
        format!("⏯ {name}, your pause ran out after {} min.", ended.elapsed_minutes)
    } else {
        format!("⏯ {name}, pause over after {} min.", ended.elapsed_minutes)
    }
}

pub fn voice(outcome: &VoiceOutcome, name: &str) -> Option<String> {
    let mut lines = Vec::new();
    if let Some(role) = outcome.auto_joined {
        lines.push(format!("👋 {name} joined as {role}."));
    }
    if let Some(ended) = &outcome.pause_ended {
        lines.push(pause_end(ended, name));
    }

    match &outcome.verdict {
        VoiceVerdict::Counted { count, goal, .. } => lines.push(format!(
            "🎤 {name}: {count}/{goal} ({:.0}%)",
            percentage(*count, *goal)
        )),
        VoiceVerdict::BreakReturn(back) => {
            lines.push(return_line(name, back.elapsed_minutes, back.late));
        }
        VoiceVerdict::TooSoon { remaining_secs } => lines.push(format!(
            "⏳ {name}, too soon. Next voice message counts in {remaining_secs} s."
        )),
        VoiceVerdict::TooShort { min_secs } => lines.push(format!(
            "✂️ {name}, too short. Voice messages need at least {min_secs} s."
        )),
        VoiceVerdict::NotAssigned => {}
        VoiceVerdict::Rejected(rejection) => lines.push(role_rejection(rejection)),
    }

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn return_line(name: &str, elapsed_minutes: i64, late: bool) -> String {
    if late {
        format!("⚠️ {name} is back after {elapsed_minutes} min. Late return.")
    } else {
        format!("✅ {name} is back after {elapsed_minutes} min.")
    }
}

pub fn break_request(outcome: &BreakOutcome, name: &str, now: DateTime<Utc>) -> String {
    match outcome {
        BreakOutcome::Started {
            until,
            breaks_taken,
        } => format!(
            "☕ {name}, break #{breaks_taken} started. Back in {} min.",
            minutes_until(*until, now)
        ),
        BreakOutcome::NotJoined => format!("{name}, you are not on shift."),
        BreakOutcome::NotMain => "Only the main host can take a break.".to_owned(),
        BreakOutcome::OnPause => format!("{name}, you are on pause; breaks are off until it ends."),
        BreakOutcome::AlreadyOnBreak => format!("{name}, you are already on a break."),
        BreakOutcome::TooEarly { available_at } => format!(
            "⏳ {name}, next break is available in {} min.",
            minutes_until(*available_at, now)
        ),
    }
}

pub fn break_return(outcome: &ReturnOutcome, name: &str) -> Option<String> {
    match outcome {
        ReturnOutcome::Returned(back) => Some(return_line(name, back.elapsed_minutes, back.late)),
        ReturnOutcome::NotOnBreak | ReturnOutcome::NotJoined => None,
    }
}

pub fn pause(outcome: &PauseOutcome, name: &str, now: DateTime<Utc>) -> String {
    match outcome {
        PauseOutcome::Started { until } => format!(
            "⏸ {name} is on pause for {} min. Counters are on hold.",
            minutes_until(*until, now)
        ),
        PauseOutcome::Ended(ended) => pause_end(ended, name),
        PauseOutcome::AlreadyPaused => format!("{name} is already on pause."),
        PauseOutcome::NotPaused => format!("{name} is not on pause."),
        PauseOutcome::NotJoined => format!("{name} is not on shift."),
    }
}

pub fn transfer_request(outcome: &TransferOutcome, from_name: &str, now: DateTime<Utc>) -> String {
    match outcome {
        TransferOutcome::Requested(pending) => format!(
            "🔁 {from_name} wants to hand the shift to {}. Accept within {} min.",
            pending.to_name,
            minutes_until(pending.expires_at, now)
        ),
        TransferOutcome::NotMain => "Only the main host can hand the shift over.".to_owned(),
        TransferOutcome::SelfTarget => "You cannot hand the shift to yourself.".to_owned(),
        TransferOutcome::AlreadyPending { to_name } => {
            format!("A handover to {to_name} is already waiting for an answer.")
        }
    }
}

pub fn transfer_decision(decision: &TransferDecision, name: &str) -> String {
    match decision {
        TransferDecision::Accepted { role, .. } => {
            format!("🤝 {name} accepted the shift and is now main ({role}).")
        }
        TransferDecision::Declined { .. } => format!("{name} declined the handover."),
        TransferDecision::Expired { .. } => "⌛ This handover has already expired.".to_owned(),
        TransferDecision::NoPending => "There is no handover waiting.".to_owned(),
        TransferDecision::NotTarget => "This handover is not addressed to you.".to_owned(),
    }
}

pub fn transfer_expired(pending: &PendingTransfer) -> String {
    format!(
        "⌛ The handover to {} expired. The shift stays with the current main host.",
        pending.to_name
    )
}

pub fn end_of_shift(outcome: &EndOutcome) -> String {
    match outcome {
        EndOutcome::NoUsers => "Nobody joined the shift, nothing to report.".to_owned(),
        EndOutcome::AlreadyReported { date } => {
            format!("The report for {} was already sent.", date.format("%d.%m.%Y"))
        }
        EndOutcome::Report(report) => report.render_text(),
    }
}

pub fn status(state: &ShiftState, now: DateTime<Utc>) -> String {
    if state.is_idle() {
        return "No shift in progress. Send a voice message or /join to start.".to_owned();
    }

    let mut text = String::new();
    let _ = writeln!(text, "🎙 Shift status, goal {}", state.goal);
    for user in state.users.values() {
        let main = if state.main_user == Some(user.user_id) {
            " ⭐"
        } else {
            ""
        };
        let activity = match user.status() {
            ActivityStatus::Active => "active".to_owned(),
            ActivityStatus::OnBreak => format!(
                "on break {} min",
                user.break_started_at
                    .map(|at| (now - at).num_minutes())
                    .unwrap_or_default()
            ),
            ActivityStatus::OnPause => "on pause".to_owned(),
        };
        let _ = writeln!(
            text,
            "• {} ({}){main}: {}/{}, {activity}",
            user.display_name, user.role, user.count, user.goal
        );
    }
    if let Some(pending) = &state.pending_transfer {
        let _ = writeln!(text, "🔁 Handover to {} pending", pending.to_name);
    }
    text.trim_end().to_owned()
}

pub fn notice(notice: &Notice) -> String {
    match notice {
        Notice::BreakOverrun {
            display_name,
            overdue_minutes,
            ..
        } => format!("⏰ {display_name}, your break is over by {overdue_minutes} min. Time to come back!"),
        Notice::Inactivity {
            display_name,
            idle_minutes,
            ..
        } => format!("🔔 {display_name}, no voice messages for {idle_minutes} min."),
        Notice::PauseExpired {
            display_name,
            elapsed_minutes,
            ..
        } => format!("⏯ {display_name}, your pause ended after {elapsed_minutes} min."),
        Notice::TransferExpired(pending) => transfer_expired(pending),
        Notice::ShiftEnded(report) => report.render_text(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone, Utc};

    use crate::{
        roles::RoleRejection,
        shift::{BreakOutcome, VoiceOutcome, VoiceVerdict},
        types::Role,
    };

    use super::{break_request, voice};

    #[test]
    fn voice_reply_combines_auto_join_and_count() {
        let outcome = VoiceOutcome {
            auto_joined: Some(Role::CoHost),
            pause_ended: None,
            verdict: VoiceVerdict::Counted {
                count: 3,
                goal: 15,
                gap_minutes: None,
            },
        };
        assert_eq!(
            voice(&outcome, "Boris").as_deref(),
            Some("👋 Boris joined as co-host.\n🎤 Boris: 3/15 (20%)")
        );
    }

    #[test]
    fn unassigned_voice_is_silent_but_rejection_is_not() {
        let silent = VoiceOutcome {
            auto_joined: None,
            pause_ended: None,
            verdict: VoiceVerdict::NotAssigned,
        };
        assert_eq!(voice(&silent, "Cleo"), None);

        let rejected = VoiceOutcome {
            verdict: VoiceVerdict::Rejected(RoleRejection::NoneLeft),
            ..silent
        };
        assert!(voice(&rejected, "Cleo").is_some_and(|text| text.contains("All roles")));
    }

    #[test]
    fn break_reply_rounds_minutes_up() {
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 18, 0, 0).unwrap();
        let outcome = BreakOutcome::TooEarly {
            available_at: now + TimeDelta::seconds(61),
        };
        assert!(break_request(&outcome, "Anna", now).contains("in 2 min"));
    }
}
