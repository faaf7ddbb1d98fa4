use std::fmt::Write as _;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ChatId, Role, ShiftState, UserActivity, UserId};

/// Gaps longer than this multiple of the chat's inactivity timeout are flagged.
const LONG_GAP_FACTOR: f64 = 1.5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EndTrigger {
    Scheduled,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserReportLine {
    pub user_id: UserId,
    pub display_name: String,
    pub role: Option<Role>,
    pub count: u32,
    pub goal: u32,
    pub percentage: f64,
    pub breaks: u32,
    pub late_returns: u32,
    pub avg_gap_minutes: Option<f64>,
    pub max_gap_minutes: Option<f64>,
    pub avg_duration_secs: Option<f64>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShiftReport {
    pub chat_id: ChatId,
    pub date: NaiveDate,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: DateTime<Utc>,
    pub trigger: EndTrigger,
    pub main_user: Option<UserId>,
    pub roles: Vec<Role>,
    pub count: u32,
    pub goal: u32,
    pub percentage: f64,
    pub breaks: u32,
    pub late_returns: u32,
    pub avg_gap_minutes: Option<f64>,
    pub max_gap_minutes: Option<f64>,
    pub avg_duration_secs: Option<f64>,
    pub long_gap: bool,
    pub recommendation: String,
    pub tags: Vec<String>,
    pub users: Vec<UserReportLine>,
}

impl ShiftReport {
    pub fn role_tag(&self) -> String {
        self.roles
            .iter()
            .map(|role| role.as_str())
            .collect::<Vec<_>>()
            .join("+")
    }

    pub fn render_text(&self) -> String {
        let mut text = String::new();
        let _ = writeln!(text, "📊 Shift report for {}", self.date.format("%d.%m.%Y"));
        let _ = writeln!(
            text,
            "Voice messages: {} of {} ({:.0}%)",
            self.count, self.goal, self.percentage
        );
        let _ = writeln!(
            text,
            "Breaks: {}, late returns: {}",
            self.breaks, self.late_returns
        );
        if let (Some(avg), Some(max)) = (self.avg_gap_minutes, self.max_gap_minutes) {
            let _ = writeln!(text, "Gap between messages: avg {avg:.1} min, max {max:.1} min");
        }
        if let Some(avg) = self.avg_duration_secs {
            let _ = writeln!(text, "Average message length: {avg:.0} s");
        }

        for line in &self.users {
            let role = line.role.map(Role::as_str).unwrap_or("handed over");
            let _ = writeln!(
                text,
                "• {} ({role}): {}/{} ({:.0}%), breaks {}, late {}",
                line.display_name,
                line.count,
                line.goal,
                line.percentage,
                line.breaks,
                line.late_returns
            );
        }

        if !self.tags.is_empty() {
            let _ = writeln!(text, "Recognised: {}", self.tags.join(", "));
        }
        let _ = write!(text, "💡 {}", self.recommendation);
        text
    }
}

pub fn percentage(count: u32, goal: u32) -> f64 {
    if goal == 0 {
        return 0.0;
    }
    f64::from(count) * 100.0 / f64::from(goal)
}

pub fn recommendation(percentage: f64, late_returns: u32, long_gap: bool) -> String {
    let mut parts = Vec::new();

    parts.push(if percentage >= 100.0 {
        "Plan completed, excellent shift."
    } else if percentage >= 80.0 {
        "Close to the plan, keep the same pace."
    } else if percentage >= 50.0 {
        "Half of the plan done; aim for more regular voice messages."
    } else {
        "Plan is far from done; the pace needs attention."
    });

    if late_returns > 0 {
        parts.push("Watch the break timing: there were late returns.");
    }
    if long_gap {
        parts.push("There were long pauses between messages.");
    }

    parts.join(" ")
}

pub fn build_report(
    state: &ShiftState,
    now: DateTime<Utc>,
    trigger: EndTrigger,
) -> ShiftReport {
    let everyone: Vec<&UserActivity> = state
        .users
        .values()
        .chain(state.retired.iter())
        .collect();

    let users = everyone
        .iter()
        .map(|user| user_line(user, state.users.contains_key(&user.user_id)))
        .collect::<Vec<_>>();

    let count = everyone.iter().map(|user| user.count).sum();
    let goal = state.goal;
    let breaks = everyone.iter().map(|user| user.breaks_taken).sum();
    let late_returns = everyone.iter().map(|user| user.late_returns).sum();

    let gaps: Vec<f64> = everyone
        .iter()
        .flat_map(|user| user.voice_gaps_minutes.iter().copied())
        .collect();
    let durations: Vec<f64> = everyone
        .iter()
        .flat_map(|user| user.voice_durations_secs.iter().map(|d| f64::from(*d)))
        .collect();

    let long_gap_threshold = f64::from(state.config.voice_timeout_minutes) * LONG_GAP_FACTOR;
    let long_gap = gaps.iter().any(|gap| *gap > long_gap_threshold);
    let percentage = percentage(count, goal);

    let mut tags = Vec::new();
    for user in &everyone {
        for tag in &user.content_tags {
            if !tags.contains(tag) {
                tags.push(tag.clone());
            }
        }
    }

    let mut roles: Vec<Role> = state.users.values().map(|user| user.role).collect();
    roles.sort();

    ShiftReport {
        chat_id: state.chat_id,
        date: state.config.local_date(now),
        started_at: state.started_at,
        finished_at: now,
        trigger,
        main_user: state.main_user,
        roles,
        count,
        goal,
        percentage,
        breaks,
        late_returns,
        avg_gap_minutes: mean(&gaps),
        max_gap_minutes: gaps.iter().copied().reduce(f64::max),
        avg_duration_secs: mean(&durations),
        long_gap,
        recommendation: recommendation(percentage, late_returns, long_gap),
        tags,
        users,
    }
}

fn user_line(user: &UserActivity, seated: bool) -> UserReportLine {
    let durations: Vec<f64> = user
        .voice_durations_secs
        .iter()
        .map(|d| f64::from(*d))
        .collect();
    UserReportLine {
        user_id: user.user_id,
        display_name: user.display_name.clone(),
        role: seated.then_some(user.role),
        count: user.count,
        goal: user.goal,
        percentage: percentage(user.count, user.goal),
        breaks: user.breaks_taken,
        late_returns: user.late_returns,
        avg_gap_minutes: mean(&user.voice_gaps_minutes),
        max_gap_minutes: user.voice_gaps_minutes.iter().copied().reduce(f64::max),
        avg_duration_secs: mean(&durations),
        tags: user.content_tags.clone(),
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use crate::types::{ChatConfig, Role, ShiftState, UserActivity};

    use super::{EndTrigger, build_report, percentage, recommendation};

    #[test]
    fn percentage_handles_zero_goal() {
        assert_eq!(percentage(9, 18), 50.0);
        assert_eq!(percentage(3, 0), 0.0);
    }

    #[test]
    fn recommendation_mentions_discipline_and_pacing() {
        let text = recommendation(100.0, 0, false);
        assert_eq!(text, "Plan completed, excellent shift.");

        let text = recommendation(40.0, 2, true);
        assert!(text.contains("far from done"));
        assert!(text.contains("late returns"));
        assert!(text.contains("long pauses"));
    }

    #[test]
    fn report_aggregates_users_and_flags_long_gaps() {
        let now = Utc.with_ymd_and_hms(2026, 3, 7, 22, 0, 0).unwrap();
        let mut state = ShiftState::new(
            5,
            ChatConfig {
                voice_timeout_minutes: 20,
                ..ChatConfig::default()
            },
        );

        let mut host = UserActivity::new(1, "Anna", Role::Host, 15, now);
        host.count = 6;
        host.voice_gaps_minutes = vec![10.0, 31.0];
        host.voice_durations_secs = vec![20, 40];
        host.late_returns = 1;
        host.breaks_taken = 2;
        host.content_tags = vec!["greeting".to_owned()];

        let mut cohost = UserActivity::new(2, "Boris", Role::CoHost, 15, now);
        cohost.count = 9;
        cohost.content_tags = vec!["greeting".to_owned(), "promo".to_owned()];

        state.users.insert(1, host);
        state.users.insert(2, cohost);
        state.main_user = Some(1);
        state.refresh_goal();

        let report = build_report(&state, now, EndTrigger::Manual);
        assert_eq!(report.count, 15);
        assert_eq!(report.goal, 30);
        assert_eq!(report.percentage, 50.0);
        assert_eq!(report.breaks, 2);
        assert_eq!(report.late_returns, 1);
        assert_eq!(report.max_gap_minutes, Some(31.0));
        assert!(report.long_gap);
        assert_eq!(report.tags, vec!["greeting".to_owned(), "promo".to_owned()]);
        assert_eq!(report.role_tag(), "host+co-host");
        assert!(report.render_text().contains("15 of 30 (50%)"));
    }
}
