// ABOUTME: Cron expression handling on top of the cron crate
// ABOUTME: Accepts classic 5-field crontab lines as well as second-precision expressions

use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;

use super::error::{Result, SchedulerError};

const WEEKDAYS: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// Convert a 5-field crontab expression to the seconds-first form the
/// `cron` crate expects.
///
/// Standard cron: `min hour day month weekday`
/// Cron crate:    `sec min hour day month weekday [year]`
///
/// Crontab weekdays count from 0 (Sunday, also 7) while the cron crate
/// counts from 1, so numeric weekdays are rewritten to day names.
pub fn normalize_cron_expression(expr: &str) -> String {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    match fields.len() {
        5 => {
            let weekday = crontab_weekdays(fields[4]);
            format!("0 {} {}", fields[..4].join(" "), weekday)
        }
        _ => fields.join(" "),
    }
}

/// Rewrite a crontab day-of-week field into day names. Fields that do not
/// parse are returned as-is so the cron crate reports them.
fn crontab_weekdays(field: &str) -> String {
    if field == "*" || field == "?" {
        return field.to_string();
    }

    let mut days = [false; 7];
    for item in field.split(',') {
        match expand_weekday_item(item) {
            Some(expanded) => {
                for day in expanded {
                    days[day % 7] = true;
                }
            }
            None => return field.to_string(),
        }
    }

    days.iter()
        .enumerate()
        .filter(|(_, set)| **set)
        .map(|(day, _)| WEEKDAYS[day])
        .collect::<Vec<_>>()
        .join(",")
}

/// Expand one list item (`N`, `A-B`, `*/S`, `A-B/S`, `N/S`) into crontab
/// day numbers in `0..=7`.
fn expand_weekday_item(item: &str) -> Option<Vec<usize>> {
    let (range, step) = match item.split_once('/') {
        Some((range, step)) => (range, Some(step.parse::<usize>().ok().filter(|s| *s > 0)?)),
        None => (item, None),
    };

    let (start, end) = if range == "*" {
        (0, 6)
    } else if let Some((a, b)) = range.split_once('-') {
        (weekday_number(a)?, weekday_number(b)?)
    } else {
        let day = weekday_number(range)?;
        // `N/S` runs from N to the end of the week
        (day, if step.is_some() { 6 } else { day })
    };

    if start > end {
        return None;
    }
    Some((start..=end).step_by(step.unwrap_or(1)).collect())
}

fn weekday_number(value: &str) -> Option<usize> {
    if let Ok(n) = value.parse::<usize>() {
        return (n <= 7).then_some(n);
    }
    let upper = value.to_ascii_uppercase();
    WEEKDAYS.iter().position(|name| *name == upper)
}

pub fn parse_cron(expr: &str) -> Result<Schedule> {
    let normalized = normalize_cron_expression(expr);
    if normalized.is_empty() {
        return Err(SchedulerError::InvalidCron {
            expression: expr.to_string(),
            message: "empty expression".to_string(),
        });
    }

    Schedule::from_str(&normalized).map_err(|e| SchedulerError::InvalidCron {
        expression: expr.to_string(),
        message: e.to_string(),
    })
}

/// Preview the next `count` firings of `expr` after `after`.
pub fn next_fire_times_after(
    expr: &str,
    after: DateTime<Utc>,
    count: usize,
) -> Result<Vec<DateTime<Utc>>> {
    let schedule = parse_cron(expr)?;
    Ok(schedule.after(&after).take(count).collect())
}

pub fn next_fire_times(expr: &str, count: usize) -> Result<Vec<DateTime<Utc>>> {
    next_fire_times_after(expr, Utc::now(), count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_normalize_5_field() {
        assert_eq!(normalize_cron_expression("*/5 * * * *"), "0 */5 * * * *");
        assert_eq!(normalize_cron_expression("  0   3 * * * "), "0 0 3 * * *");
    }

    #[test]
    fn test_normalize_crontab_weekdays() {
        assert_eq!(normalize_cron_expression("0 0 * * 0"), "0 0 0 * * SUN");
        assert_eq!(normalize_cron_expression("0 0 * * 7"), "0 0 0 * * SUN");
        assert_eq!(
            normalize_cron_expression("0 9 * * 1-5"),
            "0 0 9 * * MON,TUE,WED,THU,FRI"
        );
        assert_eq!(
            normalize_cron_expression("0 0 * * */2"),
            "0 0 0 * * SUN,TUE,THU,SAT"
        );
        assert_eq!(
            normalize_cron_expression("0 0 * * 5-7"),
            "0 0 0 * * SUN,FRI,SAT"
        );
        assert_eq!(
            normalize_cron_expression("0 0 * * mon,3"),
            "0 0 0 * * MON,WED"
        );
    }

    #[test]
    fn test_unparseable_weekday_left_for_cron_crate() {
        assert_eq!(normalize_cron_expression("0 0 * * 8"), "0 0 0 * * 8");
        assert!(parse_cron("0 0 * * 8").is_err());
    }

    #[test]
    fn test_sunday_as_zero_and_seven() {
        // 2024-01-03 is a Wednesday; the next Sunday is 2024-01-07
        let start = Utc.with_ymd_and_hms(2024, 1, 3, 12, 0, 0).unwrap();
        let sunday = Utc.with_ymd_and_hms(2024, 1, 7, 0, 0, 0).unwrap();

        assert!(parse_cron("0 0 * * 0").is_ok());
        assert_eq!(next_fire_times_after("0 0 * * 0", start, 1).unwrap(), vec![sunday]);
        assert_eq!(next_fire_times_after("0 0 * * 7", start, 1).unwrap(), vec![sunday]);
    }

    #[test]
    fn test_weekday_fires_on_matching_day() {
        let monday = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let times = next_fire_times_after("0 0 * * 1", monday, 1).unwrap();
        assert_eq!(times, vec![Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap()]);

        // Friday 2024-01-05 -> weekdays skip the weekend
        let friday = Utc.with_ymd_and_hms(2024, 1, 5, 10, 0, 0).unwrap();
        let times = next_fire_times_after("0 9 * * 1-5", friday, 2).unwrap();
        assert_eq!(
            times,
            vec![
                Utc.with_ymd_and_hms(2024, 1, 8, 9, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 9, 9, 0, 0).unwrap(),
            ]
        );

        let times = next_fire_times_after("0 0 * * */2", monday, 3).unwrap();
        assert_eq!(
            times,
            vec![
                Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 6, 0, 0, 0).unwrap(),
            ]
        );
    }

    #[test]
    fn test_normalize_seconds_passthrough() {
        let input = "30 */5 * * * * *";
        assert_eq!(normalize_cron_expression(input), input);
    }

    #[test]
    fn test_invalid_expression() {
        let err = parse_cron("not-a-cron").unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("not-a-cron"));

        assert!(parse_cron("").is_err());
        assert!(parse_cron("61 * * * *").is_err());
    }

    #[test]
    fn test_next_fire_times() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 2, 30).unwrap();
        let times = next_fire_times_after("*/5 * * * *", start, 3).unwrap();

        assert_eq!(
            times,
            vec![
                Utc.with_ymd_and_hms(2024, 1, 1, 10, 5, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 1, 10, 10, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 1, 10, 15, 0).unwrap(),
            ]
        );
    }
}
