//! Schedule strings for scheduled tasks.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// When a scheduled task fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleSpec {
    /// Once a day at `HH:MM`, in `tz` (IANA name) or UTC.
    Daily {
        at: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tz: Option<String>,
    },
    /// Fixed interval such as `"30m"` or `"2h"`.
    Every { every: String },
    /// Standard 5-field (or 6/7-field) cron expression.
    Cron {
        expr: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tz: Option<String>,
    },
}

impl ScheduleSpec {
    /// Check every string in the spec without computing a run time.
    pub fn check(&self) -> Result<()> {
        match self {
            Self::Daily { at, tz } => {
                parse_daily_time(at)?;
                check_tz(tz.as_deref())
            },
            Self::Every { every } => parse_duration_ms(every).map(|_| ()),
            Self::Cron { expr, tz } => {
                cron::Schedule::from_str(&normalize_cron_expr(expr))
                    .map_err(|e| Error::invalid_schedule(format!("cron `{expr}`: {e}")))?;
                check_tz(tz.as_deref())
            },
        }
    }
}

impl std::fmt::Display for ScheduleSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Daily { at, tz } => match tz {
                Some(tz) => write!(f, "daily at {at} ({tz})"),
                None => write!(f, "daily at {at}"),
            },
            Self::Every { every } => write!(f, "every {every}"),
            Self::Cron { expr, .. } => write!(f, "cron `{expr}`"),
        }
    }
}

/// The `cron` crate expects seconds and an optional year; pad 5-field
/// expressions accordingly.
pub fn normalize_cron_expr(expr: &str) -> String {
    let fields = expr.split_whitespace().count();
    if fields == 5 {
        format!("0 {} *", expr.trim())
    } else {
        expr.trim().to_string()
    }
}

fn check_tz(tz: Option<&str>) -> Result<()> {
    if let Some(name) = tz {
        name.parse::<chrono_tz::Tz>()
            .map_err(|_| Error::invalid_schedule(format!("unknown timezone: {name}")))?;
    }
    Ok(())
}

/// Parse `HH:MM` into `(hour, minute)`.
pub fn parse_daily_time(input: &str) -> Result<(u32, u32)> {
    let (h, m) = input
        .trim()
        .split_once(':')
        .ok_or_else(|| Error::invalid_schedule(format!("expected HH:MM, got `{input}`")))?;
    let hour: u32 = h
        .parse()
        .map_err(|_| Error::invalid_schedule(format!("invalid hour in `{input}`")))?;
    let minute: u32 = m
        .parse()
        .map_err(|_| Error::invalid_schedule(format!("invalid minute in `{input}`")))?;
    if hour > 23 || minute > 59 {
        return Err(Error::invalid_schedule(format!("time out of range: `{input}`")));
    }
    Ok((hour, minute))
}

/// Parse a human-friendly duration string into milliseconds.
///
/// Supported suffixes: `s` (seconds), `m` (minutes), `h` (hours), `d` (days).
pub fn parse_duration_ms(input: &str) -> Result<u64> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::invalid_schedule("empty duration string"));
    }

    let (num_str, suffix) = match input.find(|c: char| c.is_alphabetic()) {
        Some(i) => (&input[..i], &input[i..]),
        None => {
            return Err(Error::invalid_schedule(format!(
                "duration missing unit suffix (s/m/h/d): {input}"
            )));
        },
    };

    let value: u64 = num_str
        .parse()
        .map_err(|_| Error::invalid_schedule(format!("invalid number in duration: {num_str}")))?;
    if value == 0 {
        return Err(Error::invalid_schedule("duration must be > 0"));
    }

    let unit = match suffix {
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        _ => {
            return Err(Error::invalid_schedule(format!(
                "unknown duration suffix: {suffix} (expected s/m/h/d)"
            )));
        },
    };
    value
        .checked_mul(unit)
        .ok_or_else(|| Error::invalid_schedule(format!("duration too large: {input}")))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("30s", 30_000)]
    #[case("5m", 300_000)]
    #[case("2h", 7_200_000)]
    #[case("1d", 86_400_000)]
    #[case(" 10m ", 600_000)]
    fn durations(#[case] input: &str, #[case] ms: u64) {
        assert_eq!(parse_duration_ms(input).unwrap(), ms);
    }

    #[rstest]
    #[case("")]
    #[case("10")]
    #[case("0m")]
    #[case("5w")]
    #[case("xm")]
    #[case("300000000000000d")]
    #[case("18446744073709552s")]
    fn bad_durations(#[case] input: &str) {
        assert!(parse_duration_ms(input).is_err());
    }

    #[test]
    fn largest_representable_duration_is_accepted() {
        let max_seconds = u64::MAX / 1_000;
        assert_eq!(
            parse_duration_ms(&format!("{max_seconds}s")).unwrap(),
            max_seconds * 1_000
        );
        let err = parse_duration_ms("300000000000000d").unwrap_err();
        assert!(err.to_string().contains("duration too large"));
    }

    #[test]
    fn daily_time_bounds() {
        assert_eq!(parse_daily_time("08:05").unwrap(), (8, 5));
        assert_eq!(parse_daily_time("23:59").unwrap(), (23, 59));
        assert!(parse_daily_time("24:00").is_err());
        assert!(parse_daily_time("12:60").is_err());
        assert!(parse_daily_time("noon").is_err());
    }

    #[test]
    fn check_rejects_unknown_timezone() {
        let spec = ScheduleSpec::Daily {
            at: "09:00".into(),
            tz: Some("Mars/Olympus".into()),
        };
        assert!(spec.check().is_err());
    }

    #[test]
    fn check_accepts_five_field_cron() {
        let spec = ScheduleSpec::Cron {
            expr: "*/15 * * * *".into(),
            tz: Some("Europe/Paris".into()),
        };
        spec.check().unwrap();
        let bad = ScheduleSpec::Cron {
            expr: "not a cron".into(),
            tz: None,
        };
        assert!(bad.check().is_err());
    }

    #[test]
    fn normalize_pads_five_fields_only() {
        assert_eq!(normalize_cron_expr("0 9 * * *"), "0 0 9 * * * *");
        assert_eq!(normalize_cron_expr("0 0 9 * * *"), "0 0 9 * * *");
    }
}
