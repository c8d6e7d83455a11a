//! Due and escalation dates. Derived on demand, never stored.

use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone, Utc};
use repack_core::types::ReminderInterval;

/// Months between the due date and the stage 2 escalation.
pub const ESCALATION_MONTHS: u32 = 1;

/// Add calendar months, keeping the day of month and time of day.
///
/// A day past the end of the target month rolls over into the following
/// month: Jan 31 + 1 month is Mar 2 in a leap year and Mar 3 otherwise.
/// Dates stored by earlier deployments were computed the same way.
/// Out-of-range results saturate.
pub fn add_months(from: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    let naive = from.naive_utc();
    let total = i64::from(naive.month0()) + i64::from(months);
    let year = i64::from(naive.year()) + total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;

    i32::try_from(year)
        .ok()
        .and_then(|y| NaiveDate::from_ymd_opt(y, month, 1))
        .and_then(|first| first.checked_add_days(Days::new(u64::from(naive.day() - 1))))
        .map(|date| Utc.from_utc_datetime(&date.and_time(naive.time())))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub fn due_date(last_serviced: DateTime<Utc>, interval: ReminderInterval) -> DateTime<Utc> {
    add_months(last_serviced, interval.months())
}

pub fn escalation_date(due: DateTime<Utc>) -> DateTime<Utc> {
    add_months(due, ESCALATION_MONTHS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn six_months_from_mid_january() {
        let due = due_date(at(2024, 1, 15), ReminderInterval::SixMonths);
        assert_eq!(due, at(2024, 7, 15));
        assert_eq!(escalation_date(due), at(2024, 8, 15));
    }

    #[test]
    fn twelve_months_keeps_time_of_day() {
        let packed = Utc.with_ymd_and_hms(2023, 3, 10, 14, 30, 0).unwrap();
        let due = due_date(packed, ReminderInterval::TwelveMonths);
        assert_eq!(due, Utc.with_ymd_and_hms(2024, 3, 10, 14, 30, 0).unwrap());
    }

    #[test]
    fn end_of_month_rolls_over() {
        assert_eq!(add_months(at(2024, 1, 31), 1), at(2024, 3, 2));
        assert_eq!(add_months(at(2023, 1, 31), 1), at(2023, 3, 3));
        assert_eq!(add_months(at(2024, 3, 31), 1), at(2024, 5, 1));
        assert_eq!(due_date(at(2023, 5, 31), ReminderInterval::NineMonths), at(2024, 3, 2));
    }

    #[test]
    fn rolled_over_due_date_shifts_escalation() {
        let packed = Utc.with_ymd_and_hms(2023, 8, 31, 8, 15, 0).unwrap();
        let due = due_date(packed, ReminderInterval::SixMonths);
        assert_eq!(due, Utc.with_ymd_and_hms(2024, 3, 2, 8, 15, 0).unwrap());
        assert_eq!(escalation_date(due), Utc.with_ymd_and_hms(2024, 4, 2, 8, 15, 0).unwrap());
    }

    #[test]
    fn december_crosses_the_year() {
        assert_eq!(add_months(at(2023, 12, 15), 1), at(2024, 1, 15));
        assert_eq!(add_months(at(2023, 11, 30), 12), at(2024, 11, 30));
    }

    #[test]
    fn overflow_saturates() {
        let late = DateTime::<Utc>::MAX_UTC;
        assert_eq!(add_months(late, 6), DateTime::<Utc>::MAX_UTC);
    }
}
