//! Shell-glob matching shared by baseline version matching (§3 Baseline)
//! and controlled-file path selection (§4.3). Case-sensitive, supports
//! `*`, `?`, and `[...]` character classes — the POSIX subset, nothing more.

use regex::Regex;

use crate::entities::Baseline;

/// Translates a shell glob into an anchored regex. Characters outside the
/// glob metacharacter set are escaped so literal dots, plus signs, etc. in
/// version strings and paths don't leak regex meaning.
fn glob_to_regex(pattern: &str) -> Regex {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '[' => {
                out.push('[');
                if let Some(&next) = chars.peek() {
                    if next == '!' {
                        out.push('^');
                        chars.next();
                    }
                }
                while let Some(&next) = chars.peek() {
                    chars.next();
                    if next == ']' {
                        break;
                    }
                    if next == '\\' {
                        out.push('\\');
                    }
                    out.push(next);
                }
                out.push(']');
            }
            _ => out.push_str(&regex::escape(&c.to_string())),
        }
    }
    out.push('$');
    Regex::new(&out).unwrap_or_else(|_| Regex::new("$^").expect("static fallback regex"))
}

/// True if `text` matches `pattern` under shell-glob rules, case-sensitive.
pub fn shell_glob_match(pattern: &str, text: &str) -> bool {
    glob_to_regex(pattern).is_match(text)
}

/// Normalises backslashes to forward slashes for cross-OS glob comparison,
/// per §4.3 and §9 — device-reported paths are never treated as local
/// filesystem paths, only compared as opaque strings.
pub fn normalize_path_for_match(path: &str) -> String {
    path.replace('\\', "/")
}

/// A device conforms iff its observed main version equals the baseline's
/// expected version, or matches one of the allowed globs. Pure, total,
/// order-independent — the invariant spec.md §8 calls out.
pub fn baseline_allows(baseline: &Baseline, observed: &str) -> bool {
    if observed == baseline.expected_main_version {
        return true;
    }
    baseline
        .allowed_main_globs
        .iter()
        .any(|glob| shell_glob_match(glob, observed))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline(expected: &str, globs: &[&str]) -> Baseline {
        Baseline {
            cluster_id: "c1".into(),
            vendor: "VX".into(),
            model: "M".into(),
            expected_main_version: expected.into(),
            allowed_main_globs: globs.iter().map(|s| s.to_string()).collect(),
            note: None,
            effective_from: None,
        }
    }

    #[test]
    fn exact_match_allows() {
        let b = baseline("1.8.2", &[]);
        assert!(baseline_allows(&b, "1.8.2"));
    }

    #[test]
    fn empty_globs_disallow_other_versions() {
        let b = baseline("1.8.2", &[]);
        assert!(!baseline_allows(&b, "1.8.3"));
    }

    #[test]
    fn glob_matches_within_minor_series_only() {
        let b = baseline("1.8.0", &["1.8.*"]);
        assert!(baseline_allows(&b, "1.8.2"));
        assert!(!baseline_allows(&b, "1.9.0"));
    }

    #[test]
    fn question_mark_matches_single_char() {
        assert!(shell_glob_match("1.8.?", "1.8.2"));
        assert!(!shell_glob_match("1.8.?", "1.8.20"));
    }

    #[test]
    fn character_class_matches() {
        assert!(shell_glob_match("1.[89].0", "1.8.0"));
        assert!(shell_glob_match("1.[89].0", "1.9.0"));
        assert!(!shell_glob_match("1.[89].0", "1.7.0"));
    }

    #[test]
    fn glob_special_chars_in_literal_do_not_leak_as_regex() {
        assert!(shell_glob_match("1.8.2", "1.8.2"));
        assert!(!shell_glob_match("1.8.2", "1x8x2"));
    }

    #[test]
    fn path_normalization_maps_backslashes() {
        assert_eq!(
            normalize_path_for_match("etc\\app\\config.yml"),
            "etc/app/config.yml"
        );
    }
}
