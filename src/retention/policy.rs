//! Retention-limit parsing.
//!
//! Turns the `retention.max_backups` setting into a canonical eviction
//! policy: a plain number keeps that many artifacts, a `k`/`m`/`g` suffixed
//! number caps the store's cumulative size in bytes.

use crate::utils::errors::ConfigWarning;

const ONE_KB: u64 = 1024;
const ONE_MB: u64 = ONE_KB * 1024;
const ONE_GB: u64 = ONE_MB * 1024;

/// Canonical eviction policy, immutable per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Keep everything.
    Disabled,
    /// Keep at most this many artifacts.
    ByCount { limit: u64 },
    /// Keep the store's total recursive size within this many bytes.
    BySize { limit_bytes: u64 },
}

/// Parse a retention limit. Empty input falls back to `default`.
pub fn parse_limit(raw: &str, default: &str) -> (RetentionPolicy, Option<ConfigWarning>) {
    let cleaned = raw.trim().to_lowercase();
    if cleaned.is_empty() {
        return parse_cleaned(default.trim().to_lowercase());
    }
    parse_cleaned(cleaned)
}

fn parse_cleaned(setting: String) -> (RetentionPolicy, Option<ConfigWarning>) {
    if setting == "-1" {
        return (RetentionPolicy::Disabled, None);
    }

    if !setting.is_empty() && setting.bytes().all(|b| b.is_ascii_digit()) {
        return match setting.parse::<u64>() {
            Ok(0) => (RetentionPolicy::Disabled, None),
            Ok(limit) => (RetentionPolicy::ByCount { limit }, None),
            Err(_) => (
                RetentionPolicy::Disabled,
                Some(ConfigWarning::UnparsableLimit(setting)),
            ),
        };
    }

    if let Some((amount, unit)) = split_amount_and_unit(&setting) {
        let Ok(amount) = amount.parse::<u64>() else {
            return (
                RetentionPolicy::Disabled,
                Some(ConfigWarning::UnparsableLimit(setting)),
            );
        };
        let (multiplier, warning) = match unit {
            'k' => (ONE_KB, None),
            'm' => (ONE_MB, None),
            'g' => (ONE_GB, None),
            other => (1, Some(ConfigWarning::UnknownSizeUnit(other))),
        };
        let limit_bytes = amount.saturating_mul(multiplier);
        let policy = if limit_bytes == 0 {
            RetentionPolicy::Disabled
        } else {
            RetentionPolicy::BySize { limit_bytes }
        };
        return (policy, warning);
    }

    (
        RetentionPolicy::Disabled,
        Some(ConfigWarning::UnparsableLimit(setting)),
    )
}

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_number_limits_by_count() {
        assert_eq!(
            parse_limit("25", "").0,
            RetentionPolicy::ByCount { limit: 25 }
        );
    }

    #[test]
    fn suffixed_units_limit_by_size() {
        assert_eq!(
            parse_limit("512k", "").0,
            RetentionPolicy::BySize {
                limit_bytes: 512 * 1024
            }
        );
        assert_eq!(
            parse_limit("100m", "").0,
            RetentionPolicy::BySize {
                limit_bytes: 100 * 1024 * 1024
            }
        );
        assert_eq!(
            parse_limit("2g", "").0,
            RetentionPolicy::BySize {
                limit_bytes: 2 * 1024 * 1024 * 1024
            }
        );
    }

    #[test]
    fn minus_one_and_zero_disable_eviction() {
        assert_eq!(parse_limit("-1", "").0, RetentionPolicy::Disabled);
        assert_eq!(parse_limit("0", "").0, RetentionPolicy::Disabled);
    }

    #[test]
    fn unknown_unit_reads_as_bytes_with_warning() {
        let (policy, warning) = parse_limit("500q", "");
        assert_eq!(policy, RetentionPolicy::BySize { limit_bytes: 500 });
        assert_eq!(warning, Some(ConfigWarning::UnknownSizeUnit('q')));
    }

    #[test]
    fn garbage_disables_with_warning() {
        let (policy, warning) = parse_limit("lots", "25");
        assert_eq!(policy, RetentionPolicy::Disabled);
        assert!(matches!(warning, Some(ConfigWarning::UnparsableLimit(_))));
    }

    #[test]
    fn empty_input_uses_the_default() {
        let (policy, warning) = parse_limit("", "25");
        assert_eq!(policy, RetentionPolicy::ByCount { limit: 25 });
        assert!(warning.is_none());
    }
}
