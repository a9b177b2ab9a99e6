//! Next-run computation for all schedule kinds.

use {
    chatrelay_config::{ScheduleSpec, parse_daily_time, parse_duration_ms, schedule::normalize_cron_expr},
    chrono::{DateTime, Days, TimeDelta, TimeZone, Utc},
    cron::Schedule,
};

use crate::error::{Error, Result};

/// Compute the next run strictly after `now`.
///
/// Runs are always derived from the current time, so a late or missed tick
/// is never replayed.
pub fn compute_next_run(spec: &ScheduleSpec, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    match spec {
        ScheduleSpec::Daily { at, tz } => {
            let (hour, minute) = parse_daily_time(at)?;
            match tz {
                Some(name) => next_daily(&parse_tz(name)?, hour, minute, now),
                None => next_daily(&Utc, hour, minute, now),
            }
        },
        ScheduleSpec::Every { every } => {
            let ms = parse_duration_ms(every)?;
            i64::try_from(ms)
                .ok()
                .and_then(TimeDelta::try_milliseconds)
                .and_then(|step| now.checked_add_signed(step))
                .ok_or_else(|| Error::message(format!("interval too large: {every}")))
        },
        ScheduleSpec::Cron { expr, tz } => {
            let schedule: Schedule = normalize_cron_expr(expr).parse()?;
            let next = match tz {
                Some(name) => {
                    let tz = parse_tz(name)?;
                    schedule
                        .after(&now.with_timezone(&tz))
                        .next()
                        .map(|dt| dt.with_timezone(&Utc))
                },
                None => schedule.after(&now).next(),
            };
            next.ok_or_else(|| Error::message(format!("cron `{expr}` has no upcoming run")))
        },
    }
}

fn parse_tz(name: &str) -> Result<chrono_tz::Tz> {
    name.parse()
        .map_err(|_| Error::unknown_timezone(name))
}

/// Next `hour:minute` wall-clock time in `tz`. A local time skipped by a DST
/// jump rolls over to the following day.
fn next_daily<T: TimeZone>(
    tz: &T,
    hour: u32,
    minute: u32,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let today = now.with_timezone(tz).date_naive();
    for offset in 0..=2 {
        let Some(date) = today.checked_add_days(Days::new(offset)) else {
            break;
        };
        let Some(naive) = date.and_hms_opt(hour, minute, 0) else {
            continue;
        };
        if let Some(candidate) = tz.from_local_datetime(&naive).earliest() {
            let candidate = candidate.with_timezone(&Utc);
            if candidate > now {
                return Ok(candidate);
            }
        }
    }
    Err(Error::message(format!(
        "no upcoming run for {hour:02}:{minute:02}"
    )))
}
