use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

use crate::error::{Result, SchedulerError};

/// Next `HH:MM` UTC strictly after `from`: today if the time has not passed
/// yet, otherwise tomorrow.
pub fn next_daily_run(hour: u8, minute: u8, from: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let candidate = Utc
        .with_ymd_and_hms(
            from.year(),
            from.month(),
            from.day(),
            hour as u32,
            minute as u32,
            0,
        )
        .single()
        .ok_or_else(|| SchedulerError::InvalidSchedule(format!("{hour:02}:{minute:02}")))?;
    if candidate > from {
        Ok(candidate)
    } else {
        Ok(candidate + Duration::days(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 7, 15, h, m, s).unwrap()
    }

    #[test]
    fn later_today() {
        assert_eq!(next_daily_run(9, 0, at(6, 30, 0)).unwrap(), at(9, 0, 0));
    }

    #[test]
    fn passed_today_runs_tomorrow() {
        let next = next_daily_run(9, 0, at(9, 0, 1)).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 7, 16, 9, 0, 0).unwrap());
    }

    #[test]
    fn exactly_at_run_time_moves_on() {
        let next = next_daily_run(9, 0, at(9, 0, 0)).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 7, 16, 9, 0, 0).unwrap());
    }

    #[test]
    fn month_rollover() {
        let from = Utc.with_ymd_and_hms(2024, 1, 31, 23, 0, 0).unwrap();
        let next = next_daily_run(9, 30, from).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 2, 1, 9, 30, 0).unwrap());
    }

    #[test]
    fn impossible_time_is_rejected() {
        assert!(matches!(
            next_daily_run(24, 0, at(1, 0, 0)),
            Err(SchedulerError::InvalidSchedule(_))
        ));
    }
}
