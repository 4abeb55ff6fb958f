//! Cache budget sizes. `cache.max_size_mb` counts 1 MB as 1024 * 1024 bytes and
//! sweep logs report in the same unit.

pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Budget in bytes for `mb` megabytes; `None` on overflow.
pub fn mb_to_bytes(mb: u64) -> Option<u64> {
    mb.checked_mul(BYTES_PER_MB)
}

/// `bytes` in megabytes with one decimal, e.g. `12.5 MB`.
pub fn format_mb(bytes: u64) -> String {
    format!("{:.1} MB", bytes as f64 / BYTES_PER_MB as f64)
}

/// Whole percentage of `budget` taken by `used`, or `None` for a zero budget.
pub fn budget_percent(used: u64, budget: u64) -> Option<u64> {
    if budget == 0 {
        return None;
    }
    let percent = u128::from(used) * 100 / u128::from(budget);
    Some(u64::try_from(percent).unwrap_or(u64::MAX))
}

/// `used` against `budget` for sweep logs, e.g. `812.4 MB / 1000.0 MB (81%)`.
pub fn format_budget_usage(used: u64, budget: u64) -> String {
    match budget_percent(used, budget) {
        Some(percent) => format!("{} / {} ({percent}%)", format_mb(used), format_mb(budget)),
        None => format!("{} / {}", format_mb(used), format_mb(budget)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_megabytes_become_bytes() {
        assert_eq!(mb_to_bytes(1000), Some(1000 * 1024 * 1024));
        assert_eq!(mb_to_bytes(0), Some(0));
        assert_eq!(mb_to_bytes(u64::MAX), None);
    }

    #[test]
    fn usage_is_reported_against_the_budget() {
        let budget = 10 * BYTES_PER_MB;

        assert_eq!(format_mb(0), "0.0 MB");
        assert_eq!(format_mb(BYTES_PER_MB / 2), "0.5 MB");
        assert_eq!(
            format_budget_usage(8 * BYTES_PER_MB, budget),
            "8.0 MB / 10.0 MB (80%)"
        );
        assert_eq!(
            format_budget_usage(12 * BYTES_PER_MB, budget),
            "12.0 MB / 10.0 MB (120%)"
        );
        assert_eq!(format_budget_usage(42, 0), "0.0 MB / 0.0 MB");
    }
}
