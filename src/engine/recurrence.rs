use chrono::{DateTime, Datelike, NaiveDate};

use crate::limits::MAX_OCCURRENCES_PER_REQUEST;
use crate::model::*;

use super::BookingError;
use super::conflict::validate_span;

/// Expand one booking into the concrete occurrences it would occupy.
///
/// Every occurrence keeps the base duration and UTC time-of-day. An occurrence is
/// included while its start is `<= rule.until`. Monthly recurrence keeps the
/// day-of-month; months without that day (the 31st in April, Feb 29 outside leap
/// years) are skipped rather than clamped to month end.
///
/// A recurring base must lie within the accepted timestamp range; otherwise
/// `LimitExceeded` is returned before anything is expanded.
pub fn expand(base: &Span, rule: &RecurrenceRule) -> Result<Vec<Span>, BookingError> {
    let stride = match rule.pattern {
        RecurrencePattern::None => return Ok(vec![*base]),
        RecurrencePattern::Daily => Some(DAY_MS),
        RecurrencePattern::Weekly => Some(7 * DAY_MS),
        RecurrencePattern::Monthly => None,
    };
    validate_span(base)?;
    if rule.until < base.start() {
        return Err(BookingError::InvalidRecurrence {
            start: base.start(),
            until: rule.until,
        });
    }
    match stride {
        Some(stride) => expand_fixed(base, stride, rule.until),
        None => expand_monthly(base, rule.until),
    }
}

fn expand_fixed(base: &Span, stride: Ms, until: Ms) -> Result<Vec<Span>, BookingError> {
    let mut occurrences = Vec::new();
    let mut current = *base;
    while current.start() <= until {
        push_bounded(&mut occurrences, current)?;
        current = current.shifted_by(stride)?;
    }
    Ok(occurrences)
}

fn expand_monthly(base: &Span, until: Ms) -> Result<Vec<Span>, BookingError> {
    let first = DateTime::from_timestamp_millis(base.start())
        .ok_or(BookingError::LimitExceeded("timestamp out of range"))?
        .naive_utc();
    let day = first.day();
    let time_of_day = first.time();
    let first_month = first.year() * 12 + first.month0() as i32;

    let mut occurrences = Vec::new();
    let mut offset = 0;
    loop {
        let month_index = first_month + offset;
        offset += 1;
        let year = month_index.div_euclid(12);
        let month = month_index.rem_euclid(12) as u32 + 1;

        // Missing day in this month: skip it. Past the last representable year
        // no later month exists either.
        let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
            if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
                break;
            }
            continue;
        };
        let start = date.and_time(time_of_day).and_utc().timestamp_millis();
        if start > until {
            break;
        }
        push_bounded(&mut occurrences, base.shifted_by(start - base.start())?)?;
    }
    Ok(occurrences)
}

fn push_bounded(occurrences: &mut Vec<Span>, span: Span) -> Result<(), BookingError> {
    if occurrences.len() >= MAX_OCCURRENCES_PER_REQUEST {
        return Err(BookingError::LimitExceeded("too many occurrences"));
    }
    occurrences.push(span);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> Ms {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
            .and_utc()
            .timestamp_millis()
    }

    fn starts(spans: &[Span]) -> Vec<Ms> {
        spans.iter().map(Span::start).collect()
    }

    #[test]
    fn none_yields_base_only() {
        let base = Span::new(utc(2025, 1, 5, 9, 0), utc(2025, 1, 5, 10, 0)).unwrap();
        assert_eq!(expand(&base, &RecurrenceRule::none()).unwrap(), vec![base]);
    }

    #[test]
    fn none_ignores_until() {
        let base = Span::new(utc(2025, 1, 5, 9, 0), utc(2025, 1, 5, 10, 0)).unwrap();
        let rule = RecurrenceRule::new(RecurrencePattern::None, utc(2024, 1, 1, 0, 0));
        assert_eq!(expand(&base, &rule).unwrap(), vec![base]);
    }

    #[test]
    fn weekly_until_is_inclusive() {
        let base = Span::new(utc(2025, 1, 5, 9, 0), utc(2025, 1, 5, 10, 0)).unwrap();
        let occurrences = expand(&base, &RecurrenceRule::weekly(utc(2025, 1, 26, 9, 0))).unwrap();
        assert_eq!(
            starts(&occurrences),
            vec![
                utc(2025, 1, 5, 9, 0),
                utc(2025, 1, 12, 9, 0),
                utc(2025, 1, 19, 9, 0),
                utc(2025, 1, 26, 9, 0),
            ]
        );
        assert!(occurrences.iter().all(|s| s.duration_ms() == HOUR_MS));
    }

    #[test]
    fn weekly_until_at_midnight_excludes_that_morning() {
        // `until` given as midnight still bounds starts, so 01-26 09:00 is excluded.
        let base = Span::new(utc(2025, 1, 5, 9, 0), utc(2025, 1, 5, 10, 0)).unwrap();
        let occurrences = expand(&base, &RecurrenceRule::weekly(utc(2025, 1, 26, 0, 0))).unwrap();
        assert_eq!(occurrences.len(), 3);
    }

    #[test]
    fn daily_keeps_time_of_day() {
        let base = Span::new(utc(2025, 2, 27, 14, 30), utc(2025, 2, 27, 15, 0)).unwrap();
        let occurrences = expand(&base, &RecurrenceRule::daily(utc(2025, 3, 2, 23, 59))).unwrap();
        assert_eq!(
            starts(&occurrences),
            vec![
                utc(2025, 2, 27, 14, 30),
                utc(2025, 2, 28, 14, 30),
                utc(2025, 3, 1, 14, 30),
                utc(2025, 3, 2, 14, 30),
            ]
        );
    }

    #[test]
    fn until_equal_to_start_yields_one() {
        let start = utc(2025, 1, 5, 9, 0);
        let base = Span::new(start, start + HOUR_MS).unwrap();
        assert_eq!(expand(&base, &RecurrenceRule::daily(start)).unwrap(), vec![base]);
    }

    #[test]
    fn until_before_start_is_invalid() {
        let start = utc(2025, 1, 5, 9, 0);
        let base = Span::new(start, start + HOUR_MS).unwrap();
        let err = expand(&base, &RecurrenceRule::weekly(start - 1)).unwrap_err();
        assert_eq!(
            err,
            BookingError::InvalidRecurrence {
                start,
                until: start - 1
            }
        );
    }

    #[test]
    fn monthly_same_day_of_month() {
        let base = Span::new(utc(2025, 1, 15, 9, 0), utc(2025, 1, 15, 10, 0)).unwrap();
        let occurrences = expand(&base, &RecurrenceRule::monthly(utc(2025, 4, 15, 9, 0))).unwrap();
        assert_eq!(
            starts(&occurrences),
            vec![
                utc(2025, 1, 15, 9, 0),
                utc(2025, 2, 15, 9, 0),
                utc(2025, 3, 15, 9, 0),
                utc(2025, 4, 15, 9, 0),
            ]
        );
    }

    #[test]
    fn monthly_skips_missing_days() {
        let base = Span::new(utc(2025, 1, 31, 9, 0), utc(2025, 1, 31, 10, 0)).unwrap();
        let occurrences = expand(&base, &RecurrenceRule::monthly(utc(2025, 8, 1, 0, 0))).unwrap();
        assert_eq!(
            starts(&occurrences),
            vec![
                utc(2025, 1, 31, 9, 0),
                utc(2025, 3, 31, 9, 0),
                utc(2025, 5, 31, 9, 0),
                utc(2025, 7, 31, 9, 0),
            ]
        );
    }

    #[test]
    fn monthly_leap_day_skips_february_of_common_year() {
        let base = Span::new(utc(2024, 2, 29, 9, 0), utc(2024, 2, 29, 10, 0)).unwrap();
        let occurrences = expand(&base, &RecurrenceRule::monthly(utc(2025, 3, 1, 0, 0))).unwrap();
        assert_eq!(occurrences.len(), 12);
        assert_eq!(occurrences.last().unwrap().start(), utc(2025, 1, 29, 9, 0));
    }

    #[test]
    fn monthly_crosses_year_boundary() {
        let base = Span::new(utc(2024, 11, 10, 8, 0), utc(2024, 11, 10, 9, 0)).unwrap();
        let occurrences = expand(&base, &RecurrenceRule::monthly(utc(2025, 2, 10, 8, 0))).unwrap();
        assert_eq!(
            starts(&occurrences),
            vec![
                utc(2024, 11, 10, 8, 0),
                utc(2024, 12, 10, 8, 0),
                utc(2025, 1, 10, 8, 0),
                utc(2025, 2, 10, 8, 0),
            ]
        );
    }

    #[test]
    fn recurring_base_outside_timestamp_range_is_rejected() {
        let base = Span::new(Ms::MAX - 10, Ms::MAX - 5).unwrap();
        assert_eq!(
            expand(&base, &RecurrenceRule::daily(Ms::MAX)),
            Err(BookingError::LimitExceeded("timestamp out of range"))
        );

        let far = utc(262_140, 1, 15, 9, 0);
        let base = Span::new(far, far + HOUR_MS).unwrap();
        assert_eq!(
            expand(&base, &RecurrenceRule::monthly(Ms::MAX)),
            Err(BookingError::LimitExceeded("timestamp out of range"))
        );

        // A non-recurring booking is returned as given.
        assert_eq!(expand(&base, &RecurrenceRule::none()).unwrap(), vec![base]);
    }

    #[test]
    fn fixed_stride_stops_at_i64_overflow() {
        let base = Span::new(Ms::MAX - 3 * DAY_MS, Ms::MAX - 3 * DAY_MS + HOUR_MS).unwrap();
        assert_eq!(
            expand_fixed(&base, DAY_MS, Ms::MAX),
            Err(BookingError::LimitExceeded("timestamp out of range"))
        );
    }

    #[test]
    fn monthly_stops_at_last_calendar_year() {
        let far = utc(262_140, 1, 15, 9, 0);
        let base = Span::new(far, far + HOUR_MS).unwrap();
        let occurrences = expand_monthly(&base, Ms::MAX).unwrap();
        // January 262140 through December of chrono's last year, 262142.
        assert_eq!(occurrences.len(), 36);
        assert_eq!(occurrences.last().unwrap().start(), utc(262_142, 12, 15, 9, 0));

        // Day 31 exists in few months; the loop still ends at the last year.
        let far = utc(262_142, 1, 31, 9, 0);
        let base = Span::new(far, far + HOUR_MS).unwrap();
        assert_eq!(expand_monthly(&base, Ms::MAX).unwrap().len(), 7);
    }

    #[test]
    fn too_many_occurrences_rejected() {
        let start = utc(2025, 1, 1, 9, 0);
        let base = Span::new(start, start + HOUR_MS).unwrap();
        let until = start + (MAX_OCCURRENCES_PER_REQUEST as Ms) * DAY_MS;
        assert!(matches!(
            expand(&base, &RecurrenceRule::daily(until)),
            Err(BookingError::LimitExceeded(_))
        ));
        let until = start + (MAX_OCCURRENCES_PER_REQUEST as Ms - 1) * DAY_MS;
        assert_eq!(
            expand(&base, &RecurrenceRule::daily(until)).unwrap().len(),
            MAX_OCCURRENCES_PER_REQUEST
        );
    }
}
