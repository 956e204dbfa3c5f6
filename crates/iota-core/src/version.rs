//! Ordering of free-form dotted version strings.
//!
//! Versions are not semver triples. Devices report whatever their build
//! system stamps in (`v1.0`, `2021.03.1-rc2`, `1_4+build7`), so the
//! comparison works on a normalized form:
//!
//! 1. trim surrounding whitespace;
//! 2. drop every character outside `[0-9._+-]`;
//! 3. split on `.` into segments, and each segment on `_`, `+` or `-` into
//!    sub-segments;
//! 4. all-digit sub-segments compare numerically, anything else (only the
//!    empty string survives step 2) compares as a string.
//!
//! When one side runs out first, the **shorter** side is the greater one,
//! both for sub-segments inside a segment and for segments inside a
//! version. So `1.0` is newer than `1.0.1`, and `1-2` is newer than
//! `1-2-3`. Deploy and fetch decisions depend on this inversion.

use std::cmp::Ordering;
use std::fmt;

/// A parsed version string.
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    segments: Vec<Vec<String>>,
}

impl Version {
    pub fn parse(raw: &str) -> Self {
        let normalized: String = raw
            .trim()
            .chars()
            .filter(|c| c.is_ascii_digit() || matches!(c, '.' | '_' | '+' | '-'))
            .collect();

        let segments: Vec<Vec<String>> = normalized
            .split('.')
            .map(|segment| {
                segment
                    .split(['_', '+', '-'])
                    .map(str::to_string)
                    .collect::<Vec<String>>()
            })
            .collect();

        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_runs(&self.segments, &other.segments, |a, b| {
            compare_runs(a, b, |x, y| compare_atoms(x, y))
        })
    }
}

/// Compare two version strings.
pub fn compare(a: &str, b: &str) -> Ordering {
    Version::parse(a).cmp(&Version::parse(b))
}

/// True if `candidate` is strictly newer than `current`.
pub fn is_newer(candidate: &str, current: &str) -> bool {
    compare(current, candidate) == Ordering::Less
}

/// Element-wise comparison where running out first makes a run greater.
fn compare_runs<T>(a: &[T], b: &[T], cmp: impl Fn(&T, &T) -> Ordering) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        match cmp(x, y) {
            Ordering::Equal => continue,
            decided => return decided,
        }
    }
    b.len().cmp(&a.len())
}

fn compare_atoms(a: &str, b: &str) -> Ordering {
    if is_number(a) && is_number(b) {
        compare_numeric(a, b)
    } else {
        a.cmp(b)
    }
}

fn is_number(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

// Arbitrary-length digit strings: no overflow, leading zeros ignored.
fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_equal_versions() {
        assert_eq!(compare("1.0", "1.0"), Ordering::Equal);
        assert_eq!(compare("  v1.0 ", "1.0"), Ordering::Equal);
        assert_eq!(compare("1.01", "1.1"), Ordering::Equal);
    }

    #[test]
    fn test_numeric_segments() {
        assert_eq!(compare("1.10", "1.9"), Ordering::Greater);
        assert_eq!(compare("v0.1", "v1.0"), Ordering::Less);
        assert_eq!(compare("2", "10"), Ordering::Less);
    }

    #[test]
    fn test_non_version_characters_are_dropped() {
        assert_eq!(compare("v1.0", "1.0"), Ordering::Equal);
        assert_eq!(compare("release-1.2", "-1.2"), Ordering::Equal);
        assert_eq!(compare("abc", ""), Ordering::Equal);
    }

    #[test]
    fn test_fewer_segments_is_greater() {
        assert_eq!(compare("1.0", "1.0.1"), Ordering::Greater);
        assert_eq!(compare("1.0.1", "1.0"), Ordering::Less);
        assert_eq!(compare("3", "3.0"), Ordering::Greater);
    }

    #[test]
    fn test_fewer_sub_segments_is_greater() {
        assert_eq!(compare("1.2", "1.2-rc1"), Ordering::Greater);
        assert_eq!(compare("1-2-3", "1-2"), Ordering::Less);
        assert_eq!(compare("1_2", "1+2"), Ordering::Equal);
    }

    #[test]
    fn test_first_difference_decides() {
        assert_eq!(compare("1.2.9", "1.3"), Ordering::Less);
        assert_eq!(compare("1-9.0", "1-10"), Ordering::Less);
    }

    #[test]
    fn test_empty_sub_segment_sorts_below_numbers() {
        assert_eq!(compare("1..2", "1.0.2"), Ordering::Less);
        assert_eq!(compare("", "0"), Ordering::Less);
    }

    #[test]
    fn test_huge_numbers_do_not_overflow() {
        let big = "1".repeat(40);
        let bigger = format!("2{}", "0".repeat(39));
        assert_eq!(compare(&big, &bigger), Ordering::Less);
        assert_eq!(compare(&format!("000{}", big), &big), Ordering::Equal);
    }

    #[test]
    fn test_is_newer() {
        assert!(is_newer("v1.0", "0.0"));
        assert!(!is_newer("v1.0", "v1.0"));
        assert!(!is_newer("0.9", "1.0"));
        assert!(is_newer("2", "1"));
    }

    #[test]
    fn test_version_ord_matches_compare() {
        let mut versions: Vec<Version> = ["1.10", "1.2", "1.2.1", "0.9", "1.2-1"]
            .iter()
            .map(|s| Version::parse(s))
            .collect();
        versions.sort();
        let sorted: Vec<&str> = versions.iter().map(|v| v.as_str()).collect();
        assert_eq!(sorted, vec!["0.9", "1.2-1", "1.2.1", "1.2", "1.10"]);
    }

    fn version_string() -> impl Strategy<Value = String> {
        "[0-9a-c._+-]{0,12}"
    }

    proptest! {
        #[test]
        fn prop_reflexive(a in version_string()) {
            prop_assert_eq!(compare(&a, &a), Ordering::Equal);
        }

        #[test]
        fn prop_antisymmetric(a in version_string(), b in version_string()) {
            prop_assert_eq!(compare(&a, &b), compare(&b, &a).reverse());
        }

        #[test]
        fn prop_transitive(
            a in version_string(),
            b in version_string(),
            c in version_string(),
        ) {
            let mut v = [Version::parse(&a), Version::parse(&b), Version::parse(&c)];
            v.sort();
            prop_assert_ne!(v[0].cmp(&v[2]), Ordering::Greater);
            prop_assert_ne!(v[0].cmp(&v[1]), Ordering::Greater);
            prop_assert_ne!(v[1].cmp(&v[2]), Ordering::Greater);
        }
    }
}
