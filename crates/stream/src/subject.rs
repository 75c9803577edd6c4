//! Subject name helpers.

/// Joins a subject prefix and a suffix token with a single `.`.
///
/// Leading/trailing dots on either side are dropped so that
/// `join("alerts.climatecore.", "co2")` and `join("alerts.climatecore", ".co2")`
/// both give `alerts.climatecore.co2`. An empty prefix yields the suffix alone.
pub fn join(prefix: &str, suffix: &str) -> String {
    let prefix = prefix.trim_end_matches('.');
    let suffix = suffix.trim_start_matches('.');
    if prefix.is_empty() {
        suffix.to_string()
    } else {
        format!("{prefix}.{suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_plain() {
        assert_eq!(join("alerts.climatecore", "co2"), "alerts.climatecore.co2");
    }

    #[test]
    fn test_join_trims_dots() {
        assert_eq!(join("alerts.", ".humidity"), "alerts.humidity");
    }

    #[test]
    fn test_join_empty_prefix() {
        assert_eq!(join("", "temperature"), "temperature");
    }
}
