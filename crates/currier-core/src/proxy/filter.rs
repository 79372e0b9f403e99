//! Host filter policy for the proxy core (component C6, Design Note (b)).
//!
//! Globs are matched label-wise, not path-wise: the host and the pattern are
//! each split on `.`, a `*` matches one whole label, and the label counts
//! must match. `*.example.com` matches `api.example.com` but not
//! `a.b.example.com` or bare `example.com`. This sidesteps regex entirely,
//! the way the teacher's own `predicate/string_matcher.rs` prefers small
//! hand-rolled matchers over pulling in a heavier dependency for a narrow job.

#[derive(Debug, Clone)]
pub struct HostFilter {
    include: Vec<String>,
    exclude: Vec<String>,
    https_enabled: bool,
}

impl Default for HostFilter {
    fn default() -> Self {
        Self { include: Vec::new(), exclude: Vec::new(), https_enabled: true }
    }
}

impl HostFilter {
    pub fn new(include: Vec<String>, exclude: Vec<String>, https_enabled: bool) -> Self {
        Self { include, exclude, https_enabled }
    }

    /// A host should be intercepted (rather than spliced through untouched)
    /// when HTTPS interception is globally enabled, the host matches an
    /// include pattern (or there are none, meaning "include everything"),
    /// and it does not match an exclude pattern.
    pub fn should_intercept(&self, host: &str) -> bool {
        if !self.https_enabled {
            return false;
        }
        let included = self.include.is_empty() || self.include.iter().any(|p| label_glob_match(p, host));
        let excluded = self.exclude.iter().any(|p| label_glob_match(p, host));
        included && !excluded
    }
}

fn label_glob_match(pattern: &str, host: &str) -> bool {
    let pattern_labels: Vec<&str> = pattern.split('.').collect();
    let host_labels: Vec<&str> = host.split('.').collect();
    if pattern_labels.len() != host_labels.len() {
        return false;
    }
    pattern_labels
        .iter()
        .zip(host_labels.iter())
        .all(|(p, h)| *p == "*" || p.eq_ignore_ascii_case(h))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_one_label_only() {
        let filter = HostFilter::new(vec!["*.example.com".to_string()], vec![], true);
        assert!(filter.should_intercept("api.example.com"));
        assert!(!filter.should_intercept("a.b.example.com"));
        assert!(!filter.should_intercept("example.com"));
    }

    #[test]
    fn empty_include_list_means_include_everything() {
        let filter = HostFilter::new(vec![], vec!["internal.example.com".to_string()], true);
        assert!(filter.should_intercept("anything.example.com"));
        assert!(!filter.should_intercept("internal.example.com"));
    }

    #[test]
    fn exclude_wins_over_include() {
        let filter = HostFilter::new(
            vec!["*.example.com".to_string()],
            vec!["api.example.com".to_string()],
            true,
        );
        assert!(!filter.should_intercept("api.example.com"));
        assert!(filter.should_intercept("www.example.com"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let filter = HostFilter::new(vec!["*.Example.com".to_string()], vec![], true);
        assert!(filter.should_intercept("API.EXAMPLE.COM"));
    }

    #[test]
    fn https_disabled_globally_skips_interception_regardless_of_include() {
        let filter = HostFilter::new(vec!["*.example.com".to_string()], vec![], false);
        assert!(!filter.should_intercept("api.example.com"));
    }
}
