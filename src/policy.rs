use std::fmt;

use chrono::{Datelike, Days, NaiveDate, NaiveDateTime, NaiveTime, Weekday};

use crate::engine::BookingError;
use crate::model::{ClosedDay, Identity, ReservationSettings, Role};

/// How the per-tier advance-day settings are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdvanceWindow {
    /// Advance days only bound how far ahead a client lets the user browse.
    #[default]
    Browse,
    /// Advance days also bound how far ahead teachers and VIP students may book.
    Enforced,
}

/// Why a booking attempt for a date was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    Weekend,
    ClosedDay { reason: Option<String> },
    NotYetOpen { opens_at: NaiveTime },
    TooFarAhead,
    OnlyTomorrow,
    PendingApproval,
    BeyondAdvanceWindow { days: u32 },
}

impl DenyReason {
    /// Short stable label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            DenyReason::Weekend => "weekend",
            DenyReason::ClosedDay { .. } => "closed_day",
            DenyReason::NotYetOpen { .. } => "not_yet_open",
            DenyReason::TooFarAhead => "too_far_ahead",
            DenyReason::OnlyTomorrow => "only_tomorrow",
            DenyReason::PendingApproval => "pending_approval",
            DenyReason::BeyondAdvanceWindow { .. } => "beyond_advance_window",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::Weekend => f.write_str("weekend"),
            DenyReason::ClosedDay { reason: Some(r) } => write!(f, "closed day: {r}"),
            DenyReason::ClosedDay { reason: None } => f.write_str("closed day"),
            DenyReason::NotYetOpen { opens_at } => {
                write!(f, "not yet open (opens at {})", opens_at.format("%H:%M"))
            }
            DenyReason::TooFarAhead => f.write_str("too far ahead"),
            DenyReason::OnlyTomorrow => f.write_str("students may only book tomorrow"),
            DenyReason::PendingApproval => f.write_str("pending approval"),
            DenyReason::BeyondAdvanceWindow { days } => {
                write!(f, "beyond advance window of {days} days")
            }
        }
    }
}

/// Outcome of an eligibility check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }

    pub fn into_result(self) -> Result<(), BookingError> {
        match self {
            Decision::Allowed => Ok(()),
            Decision::Denied(reason) => Err(BookingError::EligibilityDenied(reason)),
        }
    }
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Decide whether `role` may book on `target` at wall-clock `now`.
///
/// Rules run in order and the first failure wins: weekend, closed day, then
/// the role's own rule. Room and slot occupancy are not considered here.
pub fn can_reserve(
    role: Role,
    target: NaiveDate,
    now: NaiveDateTime,
    settings: &ReservationSettings,
    closed: Option<&ClosedDay>,
    window: AdvanceWindow,
) -> Decision {
    if is_weekend(target) {
        return Decision::Denied(DenyReason::Weekend);
    }
    if let Some(day) = closed {
        return Decision::Denied(DenyReason::ClosedDay {
            reason: day.reason.clone(),
        });
    }

    let today = now.date();
    match role {
        Role::Admin | Role::Staff => Decision::Allowed,
        Role::Teacher => within_advance(target, today, settings.teacher_advance_days, window),
        Role::StudentVip => within_advance(target, today, settings.vip_advance_days, window),
        Role::Student => {
            let Some(tomorrow) = today.succ_opt() else {
                return Decision::Denied(DenyReason::TooFarAhead);
            };
            if target > tomorrow {
                Decision::Denied(DenyReason::TooFarAhead)
            } else if target < tomorrow {
                Decision::Denied(DenyReason::OnlyTomorrow)
            } else if now.time() < settings.student_open_time {
                Decision::Denied(DenyReason::NotYetOpen {
                    opens_at: settings.student_open_time,
                })
            } else {
                Decision::Allowed
            }
        }
        Role::StudentPending => Decision::Denied(DenyReason::PendingApproval),
    }
}

fn within_advance(target: NaiveDate, today: NaiveDate, days: u32, window: AdvanceWindow) -> Decision {
    match window {
        AdvanceWindow::Browse => Decision::Allowed,
        AdvanceWindow::Enforced => match today.checked_add_days(Days::new(u64::from(days))) {
            Some(limit) if target > limit => {
                Decision::Denied(DenyReason::BeyondAdvanceWindow { days })
            }
            _ => Decision::Allowed,
        },
    }
}

/// Last date `role` may browse, or `None` when unbounded.
pub fn browse_horizon(role: Role, today: NaiveDate, settings: &ReservationSettings) -> Option<NaiveDate> {
    let days = match role {
        Role::Admin | Role::Staff => return None,
        Role::Teacher => settings.teacher_advance_days,
        Role::StudentVip => settings.vip_advance_days,
        Role::Student => 1,
        Role::StudentPending => 0,
    };
    today.checked_add_days(Days::new(u64::from(days)))
}

/// Whether `requester` may book on behalf of `beneficiary`.
/// Booking for yourself passes only when the beneficiary is exactly the
/// requester's identity; a different role or name is someone else, and only
/// admin and staff may name someone else.
pub fn authorize_proxy(requester: &Identity, beneficiary: &Identity) -> bool {
    requester == beneficiary || requester.role.is_staff()
}

pub fn check_proxy(requester: &Identity, beneficiary: &Identity) -> Result<(), BookingError> {
    if authorize_proxy(requester, beneficiary) {
        Ok(())
    } else {
        Err(BookingError::Forbidden("only admin or staff may book for another user"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::parse_hhmm;
    use ulid::Ulid;

    // 2026-03-10 is a Tuesday.
    fn tuesday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    fn at(date: NaiveDate, hhmm: &str) -> NaiveDateTime {
        date.and_time(parse_hhmm(hhmm).unwrap())
    }

    fn closed(date: NaiveDate, reason: Option<&str>) -> ClosedDay {
        ClosedDay {
            id: Ulid::new(),
            date,
            reason: reason.map(Into::into),
            created_at: at(date, "08:00"),
        }
    }

    fn check(role: Role, target: NaiveDate, now: NaiveDateTime) -> Decision {
        can_reserve(
            role,
            target,
            now,
            &ReservationSettings::default(),
            None,
            AdvanceWindow::Browse,
        )
    }

    const ALL_ROLES: [Role; 6] = [
        Role::Admin,
        Role::Staff,
        Role::Teacher,
        Role::StudentVip,
        Role::Student,
        Role::StudentPending,
    ];

    #[test]
    fn weekend_denied_for_every_role() {
        let saturday = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let sunday = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
        let now = at(saturday.pred_opt().unwrap(), "20:00");
        for role in ALL_ROLES {
            assert_eq!(check(role, saturday, now), Decision::Denied(DenyReason::Weekend));
            assert_eq!(check(role, sunday, now), Decision::Denied(DenyReason::Weekend));
        }
    }

    #[test]
    fn closed_day_denied_with_reason() {
        let target = tuesday();
        let day = closed(target, Some("exam week"));
        for role in ALL_ROLES {
            let d = can_reserve(
                role,
                target,
                at(target.pred_opt().unwrap(), "20:00"),
                &ReservationSettings::default(),
                Some(&day),
                AdvanceWindow::Browse,
            );
            let Decision::Denied(reason) = d else {
                panic!("{role} allowed on closed day");
            };
            assert_eq!(reason.to_string(), "closed day: exam week");
        }
    }

    #[test]
    fn weekend_wins_over_closed_day() {
        let saturday = NaiveDate::from_ymd_opt(2026, 3, 14).unwrap();
        let d = can_reserve(
            Role::Admin,
            saturday,
            at(tuesday(), "10:00"),
            &ReservationSettings::default(),
            Some(&closed(saturday, None)),
            AdvanceWindow::Browse,
        );
        assert_eq!(d, Decision::Denied(DenyReason::Weekend));
    }

    #[test]
    fn privileged_roles_book_any_open_weekday() {
        let now = at(tuesday(), "07:00");
        let far = NaiveDate::from_ymd_opt(2026, 9, 1).unwrap(); // Tuesday
        for role in [Role::Admin, Role::Staff, Role::Teacher, Role::StudentVip] {
            assert!(check(role, tuesday(), now).is_allowed());
            assert!(check(role, far, now).is_allowed(), "{role} should book far ahead");
        }
    }

    #[test]
    fn student_window_boundary_is_inclusive() {
        let wednesday = tuesday().succ_opt().unwrap();
        assert_eq!(
            check(Role::Student, wednesday, at(tuesday(), "17:59")),
            Decision::Denied(DenyReason::NotYetOpen {
                opens_at: parse_hhmm("18:00").unwrap()
            })
        );
        assert!(check(Role::Student, wednesday, at(tuesday(), "18:00")).is_allowed());
        assert!(check(Role::Student, wednesday, at(tuesday(), "23:59")).is_allowed());
    }

    #[test]
    fn student_only_tomorrow() {
        let now = at(tuesday(), "19:00");
        let thursday = NaiveDate::from_ymd_opt(2026, 3, 12).unwrap();
        assert_eq!(check(Role::Student, thursday, now), Decision::Denied(DenyReason::TooFarAhead));
        assert_eq!(check(Role::Student, tuesday(), now), Decision::Denied(DenyReason::OnlyTomorrow));
    }

    #[test]
    fn pending_always_denied() {
        let wednesday = tuesday().succ_opt().unwrap();
        let d = check(Role::StudentPending, wednesday, at(tuesday(), "20:00"));
        assert_eq!(d, Decision::Denied(DenyReason::PendingApproval));
        let err = d.into_result().unwrap_err();
        assert_eq!(err.to_string(), "pending approval");
    }

    #[test]
    fn enforced_window_bounds_teacher_and_vip() {
        let settings = ReservationSettings::default(); // vip 7, teacher 14
        let now = at(tuesday(), "10:00");
        let in_eight_days = NaiveDate::from_ymd_opt(2026, 3, 18).unwrap(); // Wednesday
        let in_fifteen_days = NaiveDate::from_ymd_opt(2026, 3, 25).unwrap(); // Wednesday

        let vip = can_reserve(Role::StudentVip, in_eight_days, now, &settings, None, AdvanceWindow::Enforced);
        assert_eq!(vip, Decision::Denied(DenyReason::BeyondAdvanceWindow { days: 7 }));

        let teacher = can_reserve(Role::Teacher, in_eight_days, now, &settings, None, AdvanceWindow::Enforced);
        assert!(teacher.is_allowed());

        let teacher_far = can_reserve(Role::Teacher, in_fifteen_days, now, &settings, None, AdvanceWindow::Enforced);
        assert_eq!(teacher_far, Decision::Denied(DenyReason::BeyondAdvanceWindow { days: 14 }));

        let admin_far = can_reserve(Role::Admin, in_fifteen_days, now, &settings, None, AdvanceWindow::Enforced);
        assert!(admin_far.is_allowed());
    }

    #[test]
    fn horizons_follow_settings() {
        let settings = ReservationSettings::default();
        let today = tuesday();
        assert_eq!(browse_horizon(Role::Admin, today, &settings), None);
        assert_eq!(
            browse_horizon(Role::Teacher, today, &settings),
            NaiveDate::from_ymd_opt(2026, 3, 24)
        );
        assert_eq!(
            browse_horizon(Role::StudentVip, today, &settings),
            NaiveDate::from_ymd_opt(2026, 3, 17)
        );
        assert_eq!(browse_horizon(Role::Student, today, &settings), today.succ_opt());
        assert_eq!(browse_horizon(Role::StudentPending, today, &settings), Some(today));
    }

    #[test]
    fn proxy_rules() {
        let admin = Identity::new("a1", Role::Admin, "Admin");
        let staff = Identity::new("s1", Role::Staff, "Staff");
        let teacher = Identity::new("t1", Role::Teacher, "Teacher");
        let student = Identity::new("u1", Role::Student, "Student");

        assert!(authorize_proxy(&admin, &student));
        assert!(authorize_proxy(&staff, &student));
        assert!(authorize_proxy(&student, &student));
        assert!(!authorize_proxy(&teacher, &student));
        assert!(!authorize_proxy(&student, &teacher));

        let elevated_self = Identity::new("u1", Role::Admin, "Student");
        assert!(!authorize_proxy(&student, &elevated_self));
        let renamed_self = Identity::new("u1", Role::Student, "Someone Else");
        assert!(!authorize_proxy(&student, &renamed_self));
        assert!(matches!(
            check_proxy(&teacher, &student),
            Err(BookingError::Forbidden(_))
        ));
    }
}
