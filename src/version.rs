/**
 * Semantic version comparison.
 *
 * A strict, totally-ordered (major, minor, patch) triple plus two
 * compatibility predicates used throughout capability discovery and
 * negotiation.
 */
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl Version {
    pub const fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self { major, minor, patch }
    }

    /// Strict compatibility: same major, and at least as new within that
    /// major line (minor ahead, or same minor with patch ahead or equal).
    pub fn compatible_with(&self, required: &Version) -> bool {
        self.major == required.major
            && (self.minor, self.patch) >= (required.minor, required.patch)
    }

    /// Forward-compatible match: a strictly newer major always satisfies,
    /// otherwise falls back to `compatible_with` within the same major line.
    pub fn satisfies(&self, required: &Version) -> bool {
        self.major > required.major || (self.major == required.major && self.compatible_with(required))
    }

    pub fn is_newer_than(&self, other: &Version) -> bool {
        self > other
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_lexicographic() {
        assert!(Version::new(1, 2, 3) < Version::new(1, 2, 4));
        assert!(Version::new(1, 2, 3) < Version::new(1, 3, 0));
        assert!(Version::new(1, 9, 9) < Version::new(2, 0, 0));
    }

    #[test]
    fn compatible_with_requires_same_major_and_at_least_as_new() {
        assert!(Version::new(1, 2, 9).compatible_with(&Version::new(1, 2, 0)));
        assert!(Version::new(1, 3, 0).compatible_with(&Version::new(1, 2, 9)));
        assert!(!Version::new(1, 2, 0).compatible_with(&Version::new(1, 2, 9)));
        assert!(!Version::new(1, 2, 0).compatible_with(&Version::new(1, 3, 0)));
        assert!(!Version::new(2, 2, 0).compatible_with(&Version::new(1, 2, 0)));
    }

    #[test]
    fn satisfies_allows_forward_compatible_minor_patch_and_major() {
        let required = Version::new(1, 2, 0);
        assert!(Version::new(1, 2, 0).satisfies(&required));
        assert!(Version::new(1, 3, 0).satisfies(&required));
        assert!(Version::new(1, 2, 5).satisfies(&required));
        assert!(!Version::new(1, 1, 9).satisfies(&required));
        assert!(Version::new(2, 0, 0).satisfies(&required));
    }

    #[test]
    fn display_matches_dotted_form() {
        assert_eq!(Version::new(1, 2, 3).to_string(), "1.2.3");
    }
}
