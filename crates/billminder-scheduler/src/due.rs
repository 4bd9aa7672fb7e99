//! Due-item calculator — which obligations need a reminder today.
//!
//! Pure functions of the obligation list and "now".

use billminder_core::{DueReason, Obligation, Reminder};
use chrono::{Datelike, Months, NaiveDate, NaiveDateTime};

/// Number of days in the given month.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|first| first.checked_add_months(Months::new(1)))
        .and_then(|next| next.pred_opt())
        .map_or(31, |last| last.day())
}

/// A due day past the end of the month counts as the month's last day.
fn lands_on(due_day: u32, date: NaiveDate) -> bool {
    if due_day == date.day() {
        return true;
    }
    let last = days_in_month(date.year(), date.month());
    date.day() == last && due_day > last
}

/// Why `obligation` is actionable at `now`, or `None` if it is not.
///
/// Checked in order: settled this month (never actionable), due today, due
/// tomorrow, overdue. Overdue is a plain `due_day < today` comparison within
/// the current month: a bill due on the 28th is no longer flagged on the 2nd
/// of the following month.
pub fn classify(obligation: &Obligation, now: NaiveDateTime) -> Option<DueReason> {
    if obligation.is_settled(now) {
        return None;
    }
    let today = now.date();
    if lands_on(obligation.due_day, today) {
        return Some(DueReason::DueToday);
    }
    if today
        .succ_opt()
        .is_some_and(|tomorrow| lands_on(obligation.due_day, tomorrow))
    {
        return Some(DueReason::DueTomorrow);
    }
    if obligation.due_day < today.day() {
        return Some(DueReason::Overdue);
    }
    None
}

/// Obligations that are due today, due tomorrow or overdue, in input order.
pub fn actionable(obligations: &[Obligation], now: NaiveDateTime) -> Vec<&Obligation> {
    obligations
        .iter()
        .filter(|o| classify(o, now).is_some())
        .collect()
}

/// Like [`actionable`], paired with the reason for each item.
pub fn reminders(obligations: &[Obligation], now: NaiveDateTime) -> Vec<Reminder> {
    obligations
        .iter()
        .filter_map(|o| {
            classify(o, now).map(|reason| Reminder {
                obligation: o.clone(),
                reason,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    fn bill(name: &str, due_day: u32) -> Obligation {
        Obligation::new(name, 10.0, due_day).unwrap()
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(2026, 1), 31);
        assert_eq!(days_in_month(2026, 2), 28);
        assert_eq!(days_in_month(2028, 2), 29);
        assert_eq!(days_in_month(2026, 4), 30);
        assert_eq!(days_in_month(2026, 12), 31);
    }

    #[test]
    fn test_due_today() {
        let now = at(2026, 3, 5);
        assert_eq!(classify(&bill("Netflix", 5), now), Some(DueReason::DueToday));
    }

    #[test]
    fn test_day_after_today_is_due_tomorrow_not_today() {
        let now = at(2026, 1, 15);
        assert_eq!(classify(&bill("Phone", 16), now), Some(DueReason::DueTomorrow));
    }

    #[test]
    fn test_overdue_within_month() {
        let now = at(2026, 3, 15);
        assert_eq!(classify(&bill("Water", 10), now), Some(DueReason::Overdue));
    }

    #[test]
    fn test_future_day_not_actionable() {
        let now = at(2026, 3, 15);
        assert_eq!(classify(&bill("Insurance", 20), now), None);
    }

    #[test]
    fn test_settled_this_month_never_actionable() {
        let now = at(2026, 3, 15);
        for day in 1..=31 {
            let mut ob = bill("Rent", day);
            ob.settle(at(2026, 3, 1));
            assert_eq!(classify(&ob, now), None, "due day {day}");
        }
    }

    #[test]
    fn test_settled_last_month_is_actionable_again() {
        let mut ob = bill("Rent", 15);
        ob.settle(at(2026, 2, 14));
        assert_eq!(classify(&ob, at(2026, 3, 15)), Some(DueReason::DueToday));
    }

    #[test]
    fn test_tomorrow_rolls_into_next_month() {
        // Jan 31 -> Feb 1
        assert_eq!(classify(&bill("Gym", 1), at(2026, 1, 31)), Some(DueReason::DueTomorrow));
    }

    #[test]
    fn test_missing_day_folds_onto_last_day_of_30_day_month() {
        // Apr 29: tomorrow is Apr 30, the last day; day 31 does not exist in April.
        assert_eq!(classify(&bill("Loan", 31), at(2026, 4, 29)), Some(DueReason::DueTomorrow));
        // Apr 30 itself is the folded due date.
        assert_eq!(classify(&bill("Loan", 31), at(2026, 4, 30)), Some(DueReason::DueToday));
        assert_eq!(actionable(&[bill("Loan", 31)], at(2026, 4, 30)).len(), 1);
    }

    #[test]
    fn test_february_folds_29_30_31() {
        let now = at(2026, 2, 27);
        for day in [29, 30, 31] {
            assert_eq!(classify(&bill("Card", day), now), Some(DueReason::DueTomorrow));
        }
        assert_eq!(classify(&bill("Card", 28), now), Some(DueReason::DueTomorrow));
    }

    #[test]
    fn test_overdue_does_not_carry_over_month_boundary() {
        // Documented behavior: unsettled day-28 bill on the 2nd of next month is not flagged.
        assert_eq!(classify(&bill("Streaming", 28), at(2026, 4, 2)), None);
    }

    #[test]
    fn test_actionable_preserves_order_and_is_repeatable() {
        let obligations = vec![bill("A", 20), bill("B", 5), bill("C", 16), bill("D", 15)];
        let now = at(2026, 1, 15);
        let first: Vec<&str> = actionable(&obligations, now)
            .iter()
            .map(|o| o.name.as_str())
            .collect();
        let second: Vec<&str> = actionable(&obligations, now)
            .iter()
            .map(|o| o.name.as_str())
            .collect();
        assert_eq!(first, vec!["B", "C", "D"]);
        assert_eq!(first, second);
    }

    #[test]
    fn test_reminders_carry_reasons() {
        let obligations = vec![bill("Netflix", 5)];
        let reminders = reminders(&obligations, at(2026, 6, 5));
        assert_eq!(reminders.len(), 1);
        assert_eq!(reminders[0].obligation.name, "Netflix");
        assert_eq!(reminders[0].reason, DueReason::DueToday);
    }
}
