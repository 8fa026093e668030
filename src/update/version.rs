//! Numeric dot-component version comparison.

use std::cmp::Ordering;

/// Strip surrounding whitespace and a leading `v`/`V`.
#[must_use]
pub fn normalize_version(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed)
}

/// Numeric components of `raw`.
///
/// Each dot-separated component contributes its leading digits; a component
/// without any (e.g. `rc1`) counts as 0. Build metadata after `+` is ignored.
#[must_use]
pub fn parse_components(raw: &str) -> Vec<u64> {
    let version = normalize_version(raw);
    let version = version.split('+').next().unwrap_or_default();
    if version.is_empty() {
        return Vec::new();
    }
    version
        .split('.')
        .map(|part| {
            let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().unwrap_or(0)
        })
        .collect()
}

/// Compare two versions component-wise. Missing components are 0, so
/// `1.2` equals `1.2.0`.
#[must_use]
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = parse_components(a);
    let right = parse_components(b);
    let len = left.len().max(right.len());
    (0..len)
        .map(|i| {
            let l = left.get(i).copied().unwrap_or(0);
            let r = right.get(i).copied().unwrap_or(0);
            l.cmp(&r)
        })
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Returns `true` if `latest` is strictly newer than `current`.
#[must_use]
pub fn is_newer(latest: &str, current: &str) -> bool {
    compare_versions(latest, current) == Ordering::Greater
}
