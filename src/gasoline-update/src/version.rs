//! Semver comparison.

use crate::{UpdateError, UpdateResult};

/// Result of comparing two versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionComparison {
    /// Current is older than target.
    Older,
    /// Current equals target.
    Equal,
    /// Current is newer than target.
    Newer,
}

fn parse(version: &str) -> UpdateResult<(u64, u64, u64)> {
    let core = version.trim().trim_start_matches('v');
    // Pre-release/build suffixes are ignored for ordering.
    let core = core
        .split_once(['-', '+'])
        .map(|(head, _)| head)
        .unwrap_or(core);

    let mut parts = core.split('.');
    let mut next = || -> UpdateResult<u64> {
        parts
            .next()
            .unwrap_or("0")
            .parse()
            .map_err(|_| UpdateError::InvalidVersion {
                version: version.to_string(),
            })
    };
    Ok((next()?, next()?, next()?))
}

/// Compare two semver strings; pre-release tags are ignored.
pub fn compare_versions(current: &str, target: &str) -> VersionComparison {
    let (Ok(current), Ok(target)) = (parse(current), parse(target)) else {
        return VersionComparison::Equal;
    };
    match current.cmp(&target) {
        std::cmp::Ordering::Less => VersionComparison::Older,
        std::cmp::Ordering::Equal => VersionComparison::Equal,
        std::cmp::Ordering::Greater => VersionComparison::Newer,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_ordering() {
        assert_eq!(compare_versions("0.9.1", "0.9.2"), VersionComparison::Older);
        assert_eq!(compare_versions("0.9.2", "0.9.2"), VersionComparison::Equal);
        assert_eq!(compare_versions("1.0.0", "0.9.9"), VersionComparison::Newer);
    }

    #[test]
    fn test_v_prefix_and_prerelease() {
        assert_eq!(compare_versions("v1.2.3", "1.2.3"), VersionComparison::Equal);
        assert_eq!(
            compare_versions("1.2.3-beta.1", "1.2.3"),
            VersionComparison::Equal
        );
    }

    #[test]
    fn test_unparseable_treated_equal() {
        assert_eq!(
            compare_versions("not-a-version", "1.0.0"),
            VersionComparison::Equal
        );
    }
}
