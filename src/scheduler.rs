use std::{sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    config::ShiftRules,
    persistence::SnapshotFile,
    report::{EndTrigger, ShiftReport},
    service::ShiftService,
    shift::{EndOutcome, expire_pause_if_due, expire_transfer, finish_shift},
    store::ShiftStore,
    types::{ActivityStatus, PendingTransfer, ShiftState, UserId},
};

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Notice {
    BreakOverrun {
        user_id: UserId,
        display_name: String,
        overdue_minutes: i64,
    },
    Inactivity {
        user_id: UserId,
        display_name: String,
        idle_minutes: i64,
    },
    PauseExpired {
        user_id: UserId,
        display_name: String,
        elapsed_minutes: i64,
    },
    TransferExpired(PendingTransfer),
    ShiftEnded(Box<ShiftReport>),
}

pub fn tick(state: &mut ShiftState, now: DateTime<Utc>, rules: &ShiftRules) -> Vec<Notice> {
    let mut notices = Vec::new();
    // Transfer timers do not survive a restart, so overdue requests are swept here.
    let overdue = state
        .pending_transfer
        .as_ref()
        .filter(|pending| pending.expires_at <= now)
        .map(|pending| pending.id);
    if let Some(pending) = overdue.and_then(|id| expire_transfer(state, id, now)) {
        notices.push(Notice::TransferExpired(pending));
    }

    if !state.config.enabled {
        return notices;
    }

    let inactivity_timeout = TimeDelta::minutes(i64::from(state.config.voice_timeout_minutes));
    let user_ids = state.users.keys().copied().collect::<Vec<_>>();

    for user_id in user_ids {
        if let Some(ended) = expire_pause_if_due(state, user_id, now, rules) {
            let display_name = state
                .users
                .get(&user_id)
                .map(|user| user.display_name.clone())
                .unwrap_or_default();
            notices.push(Notice::PauseExpired {
                user_id,
                display_name,
                elapsed_minutes: ended.elapsed_minutes,
            });
        }

        let Some(user) = state.users.get_mut(&user_id) else {
            continue;
        };

        match user.status() {
            ActivityStatus::OnBreak => {
                let Some(started) = user.break_started_at else {
                    continue;
                };
                let elapsed = now - started;
                let reminder_due = user
                    .break_reminder_at
                    .is_none_or(|last| now - last >= rules.break_reminder_interval);
                if elapsed > rules.break_duration && reminder_due {
                    user.break_reminder_at = Some(now);
                    notices.push(Notice::BreakOverrun {
                        user_id,
                        display_name: user.display_name.clone(),
                        overdue_minutes: (elapsed - rules.break_duration).num_minutes(),
                    });
                }
            }
            ActivityStatus::Active => {
                let idle = now - user.last_activity_at();
                if !user.inactivity_reminder_sent && idle > inactivity_timeout {
                    user.inactivity_reminder_sent = true;
                    notices.push(Notice::Inactivity {
                        user_id,
                        display_name: user.display_name.clone(),
                        idle_minutes: idle.num_minutes(),
                    });
                }
            }
            ActivityStatus::OnPause => {}
        }
    }

    if end_time_reached(state, now, rules) {
        if let EndOutcome::Report(report) = finish_shift(state, now, EndTrigger::Scheduled) {
            notices.push(Notice::ShiftEnded(report));
        }
    }

    notices
}

fn end_time_reached(state: &ShiftState, now: DateTime<Utc>, rules: &ShiftRules) -> bool {
    if state.is_idle() {
        return false;
    }
    let local = state.config.local_now(now);
    if state.last_report_date == Some(local.date_naive()) {
        return false;
    }

    let window = i64::try_from(rules.tick_interval.as_secs().saturating_mul(2)).unwrap_or(120);
    let since_end = (local.time() - state.config.end_time)
        .num_seconds()
        .rem_euclid(SECONDS_PER_DAY);
    since_end < window.max(1)
}

pub fn spawn_ticker(service: Arc<ShiftService>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(every_secs = every.as_secs(), "shift scheduler started");
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let delivered = service.tick_all(Utc::now()).await;
            if delivered > 0 {
                debug!(delivered, "scheduler notices delivered");
            }
        }
    })
}

pub fn spawn_snapshots(store: ShiftStore, file: SnapshotFile, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            every_secs = every.as_secs(),
            path = %file.path().display(),
            "snapshot loop started"
        );
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            interval.tick().await;
            save_snapshot(&store, &file).await;
        }
    })
}

pub async fn save_snapshot(store: &ShiftStore, file: &SnapshotFile) {
    let snapshot = store.snapshot(Utc::now()).await;
    let chats = snapshot.chats.len();
    match file.save(&snapshot).await {
        Ok(()) => debug!(chats, "snapshot saved"),
        Err(error) => warn!(?error, chats, "failed to save snapshot"),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveTime, TimeDelta, TimeZone, Utc};

    use crate::{
        config::ShiftRules,
        shift::{join, record_voice, request_break, request_transfer, start_pause},
        types::{ChatConfig, ShiftState},
    };

    use super::{Notice, tick};

    fn wednesday(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, hour, minute, 0).unwrap()
    }

    fn seated(now: DateTime<Utc>, rules: &ShiftRules) -> ShiftState {
        let mut state = ShiftState::new(9, ChatConfig::default());
        join(&mut state, 1, "Anna", None, now, rules);
        state
    }

    #[test]
    fn break_overrun_nags_every_reminder_interval() {
        let rules = ShiftRules::default();
        let start = wednesday(18, 0);
        let mut state = seated(start, &rules);
        request_break(&mut state, 1, start, &rules);

        assert!(tick(&mut state, start + TimeDelta::minutes(15), &rules).is_empty());

        let first = tick(&mut state, start + TimeDelta::minutes(16), &rules);
        assert!(matches!(
            first.as_slice(),
            [Notice::BreakOverrun {
                overdue_minutes: 1,
                ..
            }]
        ));
        assert!(tick(&mut state, start + TimeDelta::minutes(17), &rules).is_empty());
        assert_eq!(tick(&mut state, start + TimeDelta::minutes(18), &rules).len(), 1);
    }

    #[test]
    fn inactivity_reminder_fires_once_until_next_voice() {
        let rules = ShiftRules::default();
        let start = wednesday(18, 0);
        let mut state = seated(start, &rules);

        assert!(tick(&mut state, start + TimeDelta::minutes(30), &rules).is_empty());
        let notices = tick(&mut state, start + TimeDelta::minutes(31), &rules);
        assert!(matches!(
            notices.as_slice(),
            [Notice::Inactivity {
                idle_minutes: 31,
                ..
            }]
        ));
        assert!(tick(&mut state, start + TimeDelta::minutes(45), &rules).is_empty());

        record_voice(&mut state, 1, "Anna", 10, start + TimeDelta::minutes(50), &rules);
        assert!(!state.users[&1].inactivity_reminder_sent);
        assert_eq!(tick(&mut state, start + TimeDelta::minutes(81), &rules).len(), 1);
    }

    #[test]
    fn paused_user_gets_no_inactivity_reminder_and_pause_expires() {
        let rules = ShiftRules::default();
        let start = wednesday(18, 0);
        let mut state = seated(start, &rules);
        start_pause(&mut state, 1, start, &rules);

        assert!(tick(&mut state, start + TimeDelta::minutes(29), &rules).is_empty());
        let notices = tick(&mut state, start + TimeDelta::minutes(30), &rules);
        assert!(matches!(
            notices.as_slice(),
            [Notice::PauseExpired {
                elapsed_minutes: 30,
                ..
            }]
        ));
        assert!(!state.users[&1].is_on_pause());
    }

    #[test]
    fn end_time_triggers_single_report_in_chat_timezone() {
        let rules = ShiftRules::default();
        let config = ChatConfig {
            utc_offset_minutes: 180,
            end_time: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
            ..ChatConfig::default()
        };
        let start = wednesday(17, 0);
        let mut state = ShiftState::new(9, config);
        join(&mut state, 1, "Anna", None, start, &rules);

        // 19:59 UTC is 22:59 local.
        assert!(
            !tick(&mut state, wednesday(19, 59), &rules)
                .iter()
                .any(|notice| matches!(notice, Notice::ShiftEnded(_)))
        );

        let notices = tick(&mut state, wednesday(20, 0), &rules);
        assert!(
            notices
                .iter()
                .any(|notice| matches!(notice, Notice::ShiftEnded(_)))
        );
        assert!(state.is_idle());

        join(&mut state, 1, "Anna", None, wednesday(20, 0), &rules);
        assert!(tick(&mut state, wednesday(20, 1), &rules).is_empty());
    }

    #[test]
    fn overdue_transfer_request_expires_on_tick() {
        let rules = ShiftRules::default();
        let start = wednesday(18, 0);
        let mut state = seated(start, &rules);
        join(&mut state, 2, "Boris", None, start, &rules);
        request_transfer(&mut state, 1, 3, "Vera", start, &rules);

        assert!(tick(&mut state, start + TimeDelta::minutes(4), &rules).is_empty());
        assert!(state.pending_transfer.is_some());

        let notices = tick(&mut state, start + TimeDelta::minutes(5), &rules);
        assert!(matches!(
            notices.as_slice(),
            [Notice::TransferExpired(pending)] if pending.to_user == 3
        ));
        assert!(state.pending_transfer.is_none());
        assert_eq!(state.main_user, Some(1));
    }

    #[test]
    fn idle_or_disabled_chats_are_skipped() {
        let rules = ShiftRules::default();
        let mut idle = ShiftState::new(9, ChatConfig::default());
        assert!(tick(&mut idle, wednesday(23, 0), &rules).is_empty());

        let start = wednesday(18, 0);
        let mut disabled = seated(start, &rules);
        disabled.config.enabled = false;
        assert!(tick(&mut disabled, start + TimeDelta::hours(2), &rules).is_empty());
    }
}
