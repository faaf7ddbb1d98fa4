use std::fmt;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::{
    config::ShiftRules,
    types::{Role, ShiftState},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DayClass {
    Weekday,
    Weekend,
}

impl DayClass {
    pub fn of(day: Weekday) -> Self {
        match day {
            Weekday::Sat | Weekday::Sun => DayClass::Weekend,
            _ => DayClass::Weekday,
        }
    }
}

impl fmt::Display for DayClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DayClass::Weekday => f.write_str("weekday"),
            DayClass::Weekend => f.write_str("weekend"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayRoles {
    pub class: DayClass,
    slots: Vec<(Role, u32)>,
}

impl DayRoles {
    pub fn roles(&self) -> impl Iterator<Item = Role> + '_ {
        self.slots.iter().map(|(role, _)| *role)
    }

    pub fn goal_for(&self, role: Role) -> Option<u32> {
        self.slots
            .iter()
            .find(|(candidate, _)| *candidate == role)
            .map(|(_, goal)| *goal)
    }

    pub fn contains(&self, role: Role) -> bool {
        self.goal_for(role).is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

pub fn roles_for(day: Weekday, rules: &ShiftRules) -> DayRoles {
    let class = DayClass::of(day);
    let slots = match class {
        DayClass::Weekday => vec![(Role::Host, rules.weekday_host_goal)],
        DayClass::Weekend => vec![
            (Role::Host, rules.weekend_host_goal),
            (Role::CoHost, rules.weekend_cohost_goal),
        ],
    };
    DayRoles { class, slots }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RoleRejection {
    Taken { role: Role, holder: String },
    Unavailable { role: Role, day: DayClass },
    NoneLeft,
}

pub fn assign_role(
    day_roles: &DayRoles,
    state: &ShiftState,
    requested: Option<Role>,
) -> Result<Role, RoleRejection> {
    match requested {
        Some(role) => {
            if !day_roles.contains(role) {
                return Err(RoleRejection::Unavailable {
                    role,
                    day: day_roles.class,
                });
            }
            match state.holder_of(role) {
                Some(holder) => Err(RoleRejection::Taken {
                    role,
                    holder: holder.display_name.clone(),
                }),
                None => Ok(role),
            }
        }
        None => day_roles
            .roles()
            .find(|role| state.holder_of(*role).is_none())
            .ok_or(RoleRejection::NoneLeft),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc, Weekday};

    use crate::{
        config::ShiftRules,
        types::{ChatConfig, Role, ShiftState, UserActivity},
    };

    use super::{DayClass, RoleRejection, assign_role, roles_for};

    #[test]
    fn weekday_exposes_single_host_role() {
        let roles = roles_for(Weekday::Wed, &ShiftRules::default());
        assert_eq!(roles.class, DayClass::Weekday);
        assert_eq!(roles.roles().collect::<Vec<_>>(), vec![Role::Host]);
        assert_eq!(roles.goal_for(Role::Host), Some(18));
        assert_eq!(roles.goal_for(Role::CoHost), None);
    }

    #[test]
    fn weekend_exposes_host_then_cohost() {
        let roles = roles_for(Weekday::Sun, &ShiftRules::default());
        assert_eq!(roles.class, DayClass::Weekend);
        assert_eq!(
            roles.roles().collect::<Vec<_>>(),
            vec![Role::Host, Role::CoHost]
        );
    }

    #[test]
    fn unspecified_role_takes_first_free_slot() {
        let now = Utc.with_ymd_and_hms(2026, 3, 7, 18, 0, 0).unwrap();
        let roles = roles_for(Weekday::Sat, &ShiftRules::default());
        let mut state = ShiftState::new(1, ChatConfig::default());

        assert_eq!(assign_role(&roles, &state, None), Ok(Role::Host));

        state
            .users
            .insert(1, UserActivity::new(1, "Anna", Role::Host, 15, now));
        assert_eq!(assign_role(&roles, &state, None), Ok(Role::CoHost));

        state
            .users
            .insert(2, UserActivity::new(2, "Boris", Role::CoHost, 15, now));
        assert_eq!(
            assign_role(&roles, &state, None),
            Err(RoleRejection::NoneLeft)
        );
    }

    #[test]
    fn requested_role_reports_holder_or_wrong_day() {
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 18, 0, 0).unwrap();
        let weekday = roles_for(Weekday::Wed, &ShiftRules::default());
        let mut state = ShiftState::new(1, ChatConfig::default());

        assert_eq!(
            assign_role(&weekday, &state, Some(Role::CoHost)),
            Err(RoleRejection::Unavailable {
                role: Role::CoHost,
                day: DayClass::Weekday
            })
        );

        state
            .users
            .insert(1, UserActivity::new(1, "Anna", Role::Host, 18, now));
        assert_eq!(
            assign_role(&weekday, &state, Some(Role::Host)),
            Err(RoleRejection::Taken {
                role: Role::Host,
                holder: "Anna".to_owned()
            })
        );
    }
}
