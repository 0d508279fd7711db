//! Severity classification from rule heads.

use kanon_core::Severity;

/// Classifies a module by its rule head names.
///
/// Any `violation` head makes it a [`Severity::Violation`]; otherwise any
/// `warn` head makes it a [`Severity::Warning`]. Modules with neither are
/// libraries and get `None`.
///
/// ```rust
/// use kanon_compiler::classifier::classify;
/// use kanon_core::Severity;
///
/// assert_eq!(classify(&["warn", "violation"]), Some(Severity::Violation));
/// assert_eq!(classify(&["is_pod"]), None);
/// ```
#[must_use]
pub fn classify<S: AsRef<str>>(rule_names: &[S]) -> Option<Severity> {
    [Severity::Violation, Severity::Warning]
        .into_iter()
        .find(|severity| rule_names.iter().any(|n| n.as_ref() == severity.rule_name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_wins_over_warn() {
        assert_eq!(classify(&["warn", "helper", "violation"]), Some(Severity::Violation));
    }

    #[test]
    fn test_warn_only() {
        assert_eq!(classify(&["helper", "warn"]), Some(Severity::Warning));
    }

    #[test]
    fn test_library_has_no_severity() {
        let empty: [&str; 0] = [];
        assert_eq!(classify(&empty), None);
        assert_eq!(classify(&["violations", "warning", "deny"]), None);
    }
}
