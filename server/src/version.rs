//! NVR parsing and RPM-style version ordering.
//!
//! Build identifiers are dash-separated name-version-release strings
//! (e.g. `kernel-4.12.5-300.fc26`). Ordering between two builds of the same
//! package follows the classic rpm label-compare rules: epoch first, then
//! version, then release, each segment-wise with digits beating alphas and
//! tilde sorting before everything.

use std::cmp::Ordering;

use crate::error::{Result, UpdateError};

/// Split an NVR string into (name, version, release).
///
/// The release and version are the last two dash-separated fields; everything
/// before them is the package name, which may itself contain dashes.
pub fn parse_nvr(nvr: &str) -> Result<(String, String, String)> {
    let mut it = nvr.rsplitn(3, '-');
    let release = it.next().unwrap_or_default();
    let version = it.next();
    let name = it.next();
    match (name, version) {
        (Some(n), Some(v)) if !n.is_empty() && !v.is_empty() && !release.is_empty() => {
            Ok((n.to_string(), v.to_string(), release.to_string()))
        }
        _ => Err(UpdateError::Validation(format!(
            "malformed NVR: {nvr:?}"
        ))),
    }
}

/// Package name portion of an NVR, or the whole string when malformed.
pub fn package_from_nvr(nvr: &str) -> String {
    parse_nvr(nvr)
        .map(|(n, _, _)| n)
        .unwrap_or_else(|_| nvr.to_string())
}

/// Compare two rpm version strings segment-wise.
pub fn rpm_vercmp(a: &str, b: &str) -> Ordering {
    let mut a = a.as_bytes();
    let mut b = b.as_bytes();

    loop {
        // Strip leading separator junk, but let tilde through: it marks a
        // pre-release and sorts lower than anything, including end-of-string.
        a = skip_separators(a);
        b = skip_separators(b);

        match (a.first(), b.first()) {
            (Some(b'~'), Some(b'~')) => {
                a = &a[1..];
                b = &b[1..];
                continue;
            }
            (Some(b'~'), _) => return Ordering::Less,
            (_, Some(b'~')) => return Ordering::Greater,
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(&ca), Some(&cb)) => {
                let a_digit = ca.is_ascii_digit();
                let b_digit = cb.is_ascii_digit();
                // Numeric segments always beat alphabetic ones.
                if a_digit != b_digit {
                    return if a_digit {
                        Ordering::Greater
                    } else {
                        Ordering::Less
                    };
                }

                let (seg_a, rest_a) = take_segment(a, a_digit);
                let (seg_b, rest_b) = take_segment(b, b_digit);
                a = rest_a;
                b = rest_b;

                let ord = if a_digit {
                    compare_numeric(seg_a, seg_b)
                } else {
                    seg_a.cmp(seg_b)
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Compare two (epoch, version, release) triples.
pub fn compare_evr(a: (&str, &str, &str), b: (&str, &str, &str)) -> Ordering {
    let epoch_a = a.0.parse::<u64>().unwrap_or(0);
    let epoch_b = b.0.parse::<u64>().unwrap_or(0);
    epoch_a
        .cmp(&epoch_b)
        .then_with(|| rpm_vercmp(a.1, b.1))
        .then_with(|| rpm_vercmp(a.2, b.2))
}

/// True when `candidate` is a strictly older build than `new` (same package
/// assumed). Malformed NVRs are never considered older.
pub fn nvr_older(candidate: &str, new: &str, candidate_epoch: i32, new_epoch: i32) -> bool {
    let (Ok((_, cv, cr)), Ok((_, nv, nr))) = (parse_nvr(candidate), parse_nvr(new)) else {
        return false;
    };
    let ce = candidate_epoch.to_string();
    let ne = new_epoch.to_string();
    compare_evr((&ce, &cv, &cr), (&ne, &nv, &nr)) == Ordering::Less
}

fn skip_separators(s: &[u8]) -> &[u8] {
    let mut i = 0;
    while i < s.len() && !s[i].is_ascii_alphanumeric() && s[i] != b'~' {
        i += 1;
    }
    &s[i..]
}

fn take_segment(s: &[u8], digits: bool) -> (&[u8], &[u8]) {
    let mut i = 0;
    while i < s.len()
        && (if digits {
            s[i].is_ascii_digit()
        } else {
            s[i].is_ascii_alphabetic()
        })
    {
        i += 1;
    }
    s.split_at(i)
}

fn compare_numeric(a: &[u8], b: &[u8]) -> Ordering {
    let a = trim_leading_zeros(a);
    let b = trim_leading_zeros(b);
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn trim_leading_zeros(s: &[u8]) -> &[u8] {
    let mut i = 0;
    while i + 1 < s.len() && s[i] == b'0' {
        i += 1;
    }
    &s[i..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_nvr() {
        let (n, v, r) = parse_nvr("tmux-2.5.0-1.fc26").unwrap();
        assert_eq!(n, "tmux");
        assert_eq!(v, "2.5.0");
        assert_eq!(r, "1.fc26");
    }

    #[test]
    fn parses_dashed_package_name() {
        let (n, v, r) = parse_nvr("rust-serde-devel-1.0.2-2.fc26").unwrap();
        assert_eq!(n, "rust-serde-devel");
        assert_eq!(v, "1.0.2");
        assert_eq!(r, "2.fc26");
    }

    #[test]
    fn rejects_malformed_nvr() {
        assert!(parse_nvr("kernel").is_err());
        assert!(parse_nvr("kernel-4.12").is_err());
        assert!(parse_nvr("").is_err());
    }

    #[test]
    fn numeric_segments_compare_numerically() {
        assert_eq!(rpm_vercmp("1.10", "1.9"), Ordering::Greater);
        assert_eq!(rpm_vercmp("1.05", "1.5"), Ordering::Equal);
        assert_eq!(rpm_vercmp("2.0", "2.0"), Ordering::Equal);
    }

    #[test]
    fn digits_beat_alphas() {
        assert_eq!(rpm_vercmp("1.0.1", "1.0.a"), Ordering::Greater);
        assert_eq!(rpm_vercmp("1.a", "1.1"), Ordering::Less);
    }

    #[test]
    fn tilde_sorts_before_release() {
        assert_eq!(rpm_vercmp("1.0~rc1", "1.0"), Ordering::Less);
        assert_eq!(rpm_vercmp("1.0~rc1", "1.0~rc2"), Ordering::Less);
        assert_eq!(rpm_vercmp("1.0~rc1", "1.0~rc1"), Ordering::Equal);
    }

    #[test]
    fn epoch_dominates_version() {
        assert_eq!(
            compare_evr(("1", "1.0", "1"), ("0", "9.9", "9")),
            Ordering::Greater
        );
    }

    #[test]
    fn older_nvr_detected() {
        assert!(nvr_older("kernel-4.12.4-300.fc26", "kernel-4.12.5-300.fc26", 0, 0));
        assert!(!nvr_older("kernel-4.12.5-300.fc26", "kernel-4.12.5-300.fc26", 0, 0));
        assert!(!nvr_older("kernel-4.12.6-300.fc26", "kernel-4.12.5-300.fc26", 0, 0));
    }

    #[test]
    fn release_breaks_version_tie() {
        assert!(nvr_older("tzdata-2017b-1.fc26", "tzdata-2017b-2.fc26", 0, 0));
    }
}
