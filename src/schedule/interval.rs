//! Interval-string parsing.
//!
//! Turns the human-written `schedule.interval` setting into a canonical
//! [`ScheduleSpec`]. Pure: malformed input falls back to a safe default and
//! the warning is returned to the caller instead of being logged here.

use crate::utils::errors::ConfigWarning;

/// Canonical schedule descriptor, immutable once parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleSpec {
    /// Automatic backups are off.
    Disabled,
    /// Fire every `minutes` of elapsed time.
    Interval { minutes: u32 },
    /// Fire at each listed local `HH:MM`.
    TimesOfDay { times: Vec<String> },
}

/// Parse an interval setting. Empty input falls back to `default`.
///
/// Grammar, matched in order against the trimmed, lowercased input:
/// - `-1`: disabled
/// - digits: minutes (`0` disables)
/// - digits + one letter: amount times unit (`m`/`h`/`d`/`w`); an unknown
///   letter is read as minutes, with a warning
/// - `ta[t1,t2,...]`: a list of `HH:MM` times, entries used verbatim
/// - anything else: disabled, with a warning
pub fn parse_interval(raw: &str, default: &str) -> (ScheduleSpec, Option<ConfigWarning>) {
    let cleaned = raw.trim().to_lowercase();
    if cleaned.is_empty() {
        return parse_cleaned(default.trim().to_lowercase());
    }
    parse_cleaned(cleaned)
}

fn parse_cleaned(setting: String) -> (ScheduleSpec, Option<ConfigWarning>) {
    if setting == "-1" {
        return (ScheduleSpec::Disabled, None);
    }

    if !setting.is_empty() && setting.bytes().all(|b| b.is_ascii_digit()) {
        return match setting.parse::<u32>() {
            Ok(0) => (ScheduleSpec::Disabled, None),
            Ok(minutes) => (ScheduleSpec::Interval { minutes }, None),
            Err(_) => (
                ScheduleSpec::Disabled,
                Some(ConfigWarning::UnparsableInterval(setting)),
            ),
        };
    }

    if let Some((amount, unit)) = split_amount_and_unit(&setting) {
        let Ok(amount) = amount.parse::<u32>() else {
            return (
                ScheduleSpec::Disabled,
                Some(ConfigWarning::UnparsableInterval(setting)),
            );
        };
        let (per_unit, warning) = match unit {
            'm' => (1, None),
            'h' => (60, None),
            'd' => (1440, None),
            'w' => (10080, None),
            other => (1, Some(ConfigWarning::UnknownTimeUnit(other))),
        };
        let minutes = amount.saturating_mul(per_unit);
        let spec = if minutes == 0 {
            ScheduleSpec::Disabled
        } else {
            ScheduleSpec::Interval { minutes }
        };
        return (spec, warning);
    }

    if let Some(inner) = setting
        .strip_prefix("ta[")
        .and_then(|rest| rest.strip_suffix(']'))
    {
        let times: Vec<String> = inner
            .split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        let spec = if times.is_empty() {
            ScheduleSpec::Disabled
        } else {
            ScheduleSpec::TimesOfDay { times }
        };
        return (spec, None);
    }

    (
        ScheduleSpec::Disabled,
        Some(ConfigWarning::UnparsableInterval(setting)),
    )
}

/// Split `"<digits><letter>"` into its parts; anything else is `None`.
fn split_amount_and_unit(setting: &str) -> Option<(&str, char)> {
    let last = setting.chars().last()?;
    if !last.is_ascii_lowercase() {
        return None;
    }
    let amount = &setting[..setting.len() - 1];
    if amount.is_empty() || !amount.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((amount, last))
}
