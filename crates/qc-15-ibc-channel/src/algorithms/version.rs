//! # Version Negotiation
//!
//! A proposed version may list several candidates, comma separated, in
//! preference order (`"ics20-2,ics20-1"`). The answering side picks the first
//! candidate it supports; the initiator accepts any candidate it listed.
//!
//! A structured version (a JSON object such as a middleware envelope) is one
//! opaque candidate: its commas are not list separators.

/// Is `version` a JSON object rather than a candidate list?
fn is_structured(version: &str) -> bool {
    version.trim_start().starts_with('{')
}

/// Split a version list into its candidates, dropping empty entries.
pub fn split_versions(versions: &str) -> Vec<&str> {
    if is_structured(versions) {
        return vec![versions.trim()];
    }
    versions
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect()
}

/// Candidates present in both lists, in `preferred` order.
pub fn intersect_versions(preferred: &str, other: &str) -> Vec<String> {
    let other = split_versions(other);
    split_versions(preferred)
        .into_iter()
        .filter(|v| other.contains(v))
        .map(str::to_string)
        .collect()
}

/// First candidate of `proposed` that is in `supported`.
pub fn negotiate_version(proposed: &str, supported: &[&str]) -> Option<String> {
    split_versions(proposed)
        .into_iter()
        .find(|v| supported.contains(v))
        .map(str::to_string)
}

/// Is `chosen` a single candidate listed in `proposed`?
pub fn version_supported(proposed: &str, chosen: &str) -> bool {
    let single = is_structured(chosen) || !chosen.contains(',');
    !chosen.is_empty() && single && split_versions(proposed).contains(&chosen)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_versions() {
        assert_eq!(split_versions("a, b,,c"), vec!["a", "b", "c"]);
        assert!(split_versions("").is_empty());
    }

    #[test]
    fn test_intersect_keeps_preference_order() {
        assert_eq!(
            intersect_versions("v3,v2,v1", "v1,v2"),
            vec!["v2".to_string(), "v1".to_string()]
        );
        assert!(intersect_versions("v3", "v1,v2").is_empty());
    }

    #[test]
    fn test_structured_versions_are_not_split() {
        let ours = r#"{"fee_version":"ics29-1","app_version":"mock-v2"}"#;
        let theirs = r#"{"fee_version":"ics29-1","app_version":"mock-v3"}"#;
        assert_eq!(split_versions(ours), vec![ours]);
        assert!(intersect_versions(ours, theirs).is_empty());
        assert_eq!(intersect_versions(ours, ours), vec![ours.to_string()]);
        assert!(version_supported(ours, ours));
    }

    #[test]
    fn test_negotiate_version() {
        assert_eq!(
            negotiate_version("ics20-2,ics20-1", &["ics20-1"]),
            Some("ics20-1".to_string())
        );
        assert_eq!(negotiate_version("ics20-3", &["ics20-1"]), None);
    }

    #[test]
    fn test_version_supported() {
        assert!(version_supported("v2,v1", "v1"));
        assert!(!version_supported("v2,v1", "v3"));
        assert!(!version_supported("v2,v1", "v2,v1"));
        assert!(!version_supported("v2", ""));
    }
}
