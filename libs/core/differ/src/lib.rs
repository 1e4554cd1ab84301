//! [libs/core/differ/src/lib.rs]
//!
//! Controlled-file drift detection (C3, spec.md §4.3). This crate is the
//! pure decision core: normalization, glob selection, fingerprint
//! comparison, and unified-diff rendering. It does no I/O — the
//! `ensure-observation` procedure's network fetch and observation-cache
//! lookups are modeled as plans the caller (the reconciler, which already
//! owns the store connection and the DVP client) carries out, since this
//! crate has no business depending on either.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use similar::{ChangeTag, TextDiff};
use vm_domain::entities::{ControlledFileObservation, RuleMode};
use vm_domain::glob::{normalize_path_for_match, shell_glob_match};
use vm_domain::wire::DvpFileEntry;

pub const DIFF_CONTEXT_LINES: usize = 3;
pub const DIFF_MAX_CHARS: usize = 50_000;

#[derive(Debug, Clone)]
pub struct NormalizedEntry {
    pub path: String,
    pub fingerprint: String,
    pub content_b64: Option<String>,
    pub encoding: Option<String>,
    pub content_type: Option<String>,
}

/// Normalizes raw DVP file entries per §4.3: trims the path, synthesizes a
/// fingerprint from `checksum` or `size`+`mtime`, and synthesizes
/// `content_b64` from an inline text `content` field when the device sent
/// that instead. Entries with no derivable fingerprint are dropped.
pub fn normalize_entries(files: &[DvpFileEntry]) -> Vec<NormalizedEntry> {
    files
        .iter()
        .filter_map(|entry| {
            let path = entry.path.trim().to_string();
            let fingerprint = derive_fingerprint(entry)?;
            let (content_b64, encoding) = match (&entry.content_b64, &entry.content) {
                (Some(b64), _) => (Some(b64.clone()), entry.encoding.clone()),
                (None, Some(text)) if !text.is_empty() => {
                    (Some(BASE64.encode(text.as_bytes())), Some("utf-8".to_string()))
                }
                _ => (None, entry.encoding.clone()),
            };
            Some(NormalizedEntry {
                path,
                fingerprint,
                content_b64,
                encoding,
                content_type: entry.content_type.clone(),
            })
        })
        .collect()
}

fn derive_fingerprint(entry: &DvpFileEntry) -> Option<String> {
    if let Some(checksum) = entry.checksum.as_ref().filter(|c| !c.is_empty()) {
        return Some(checksum.clone());
    }
    if entry.size.is_some() || entry.mtime.is_some() {
        let size = entry.size.map(|v| v.to_string()).unwrap_or_default();
        let mtime = entry.mtime.clone().unwrap_or_default();
        return Some(format!("size={size}|mtime={mtime}"));
    }
    None
}

/// Selects the entries whose normalized path matches at least one rule
/// glob (§4.3: case-sensitive shell-glob, backslashes mapped to forward
/// slashes on both sides before comparison). Keyed by the normalized,
/// matched-against path so later lookups are O(log n).
pub fn select_controlled(entries: &[NormalizedEntry], rule_paths: &[String]) -> BTreeMap<String, NormalizedEntry> {
    let normalized_globs: Vec<String> = rule_paths.iter().map(|g| normalize_path_for_match(g)).collect();
    entries
        .iter()
        .filter_map(|entry| {
            let match_path = normalize_path_for_match(&entry.path);
            let selected = normalized_globs.iter().any(|glob| shell_glob_match(glob, &match_path));
            selected.then(|| (entry.path.clone(), entry.clone()))
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct PendingChange {
    pub path: String,
    pub old_fingerprint: Option<String>,
    pub new_fingerprint: Option<String>,
}

#[derive(Debug, Clone)]
pub enum DiffOutcome {
    /// Previous successful payload had no `files` array at all — the
    /// device just started reporting. Capture a baseline, emit nothing.
    BaselineCapture { to_capture: Vec<NormalizedEntry> },
    Changes(Vec<PendingChange>),
}

/// Step 1-3 of the §4.3 diff algorithm: compute selections, detect the
/// first-time-reporting special case, and otherwise produce the list of
/// fingerprint changes. Content resolution (step 4-5) is a separate pass
/// since it requires I/O.
pub fn diff_fingerprints(
    rule_paths: &[String],
    curr_files: Option<&[DvpFileEntry]>,
    prev_files: Option<&[DvpFileEntry]>,
) -> DiffOutcome {
    let curr_entries = curr_files.map(normalize_entries).unwrap_or_default();
    let curr_sel = select_controlled(&curr_entries, rule_paths);

    if prev_files.is_none() {
        return DiffOutcome::BaselineCapture {
            to_capture: curr_sel.into_values().collect(),
        };
    }

    let prev_entries = prev_files.map(normalize_entries).unwrap_or_default();
    let prev_sel = select_controlled(&prev_entries, rule_paths);

    let mut paths: Vec<&String> = prev_sel.keys().chain(curr_sel.keys()).collect();
    paths.sort();
    paths.dedup();

    let changes = paths
        .into_iter()
        .filter_map(|path| {
            let old_fp = prev_sel.get(path).map(|e| e.fingerprint.clone());
            let new_fp = curr_sel.get(path).map(|e| e.fingerprint.clone());
            if old_fp == new_fp {
                return None;
            }
            Some(PendingChange {
                path: path.clone(),
                old_fingerprint: old_fp,
                new_fingerprint: new_fp,
            })
        })
        .collect();

    DiffOutcome::Changes(changes)
}

#[derive(Debug, Clone)]
pub enum ObservationPlan {
    /// Already cached under `(device, path, fingerprint)` — reuse it.
    Cached,
    /// Record this inline content now (mode `auto`/`inline`, entry carried
    /// `content_b64`).
    CaptureInline {
        content_b64: String,
        encoding: Option<String>,
        content_type: Option<String>,
        truncated: bool,
    },
    /// Mode `auto`/`fetch` with no usable inline content — caller must
    /// issue the secondary GET.
    NeedsFetch,
    /// `max_bytes == 0`, or no content obtainable by any mode.
    Unobtainable,
}

/// Decides how to satisfy the ensure-observation procedure (§4.3) for one
/// entry, given whether an observation already exists for its fingerprint.
pub fn plan_observation(
    existing: Option<&ControlledFileObservation>,
    entry: &NormalizedEntry,
    mode: RuleMode,
    max_bytes: u32,
) -> ObservationPlan {
    if existing.is_some() {
        return ObservationPlan::Cached;
    }
    if max_bytes == 0 {
        return ObservationPlan::Unobtainable;
    }
    if matches!(mode, RuleMode::Auto | RuleMode::Inline) {
        if let Some(b64) = &entry.content_b64 {
            let (truncated_b64, truncated) = truncate_base64(b64, max_bytes as usize);
            return ObservationPlan::CaptureInline {
                content_b64: truncated_b64,
                encoding: entry.encoding.clone(),
                content_type: entry.content_type.clone(),
                truncated,
            };
        }
    }
    if matches!(mode, RuleMode::Auto | RuleMode::Fetch) {
        return ObservationPlan::NeedsFetch;
    }
    ObservationPlan::Unobtainable
}

/// Truncates base64-encoded content to at most `max_bytes` of *decoded*
/// payload, decode-then-reencode as §4.3 specifies. Malformed base64 is
/// treated as unobtainable content (empty, truncated).
pub fn truncate_base64(content_b64: &str, max_bytes: usize) -> (String, bool) {
    match BASE64.decode(content_b64) {
        Ok(bytes) => {
            if bytes.len() <= max_bytes {
                (content_b64.to_string(), false)
            } else {
                (BASE64.encode(&bytes[..max_bytes]), true)
            }
        }
        Err(_) => (String::new(), true),
    }
}

/// Decodes base64 content to a UTF-8 string for diffing; lossy on invalid
/// UTF-8 since device-reported "controlled files" are not guaranteed text.
pub fn decode_to_text(content_b64: &str) -> Option<String> {
    BASE64
        .decode(content_b64)
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

#[derive(Debug, Clone)]
pub struct UnifiedDiff {
    pub text: String,
    pub truncated: bool,
}

/// Unified diff with `DIFF_CONTEXT_LINES` of context, truncated to
/// `DIFF_MAX_CHARS` characters (§4.3 step 5).
pub fn unified_diff(old_label: &str, new_label: &str, old_content: &str, new_content: &str) -> UnifiedDiff {
    let diff = TextDiff::from_lines(old_content, new_content);
    let mut text = String::new();
    for group in diff.grouped_ops(DIFF_CONTEXT_LINES) {
        text.push_str(&format!("--- {old_label}\n+++ {new_label}\n"));
        for op in &group {
            for change in diff.iter_changes(op) {
                let marker = match change.tag() {
                    ChangeTag::Delete => "-",
                    ChangeTag::Insert => "+",
                    ChangeTag::Equal => " ",
                };
                text.push_str(marker);
                text.push_str(change.value());
                if !change.value().ends_with('\n') {
                    text.push('\n');
                }
            }
        }
    }
    if text.chars().count() > DIFF_MAX_CHARS {
        let truncated: String = text.chars().take(DIFF_MAX_CHARS).collect();
        UnifiedDiff {
            text: truncated,
            truncated: true,
        }
    } else {
        UnifiedDiff {
            text,
            truncated: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, checksum: &str, content: Option<&str>) -> DvpFileEntry {
        DvpFileEntry {
            path: path.to_string(),
            checksum: Some(checksum.to_string()),
            content: content.map(|s| s.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn fingerprint_falls_back_to_size_and_mtime() {
        let e = DvpFileEntry {
            path: "/etc/app/config.yml".into(),
            size: Some(128),
            mtime: Some("2024-01-01T00:00:00Z".into()),
            ..Default::default()
        };
        let normalized = normalize_entries(std::slice::from_ref(&e));
        assert_eq!(normalized[0].fingerprint, "size=128|mtime=2024-01-01T00:00:00Z");
    }

    #[test]
    fn entry_without_any_fingerprint_source_is_dropped() {
        let e = DvpFileEntry {
            path: "/etc/app/config.yml".into(),
            ..Default::default()
        };
        assert!(normalize_entries(std::slice::from_ref(&e)).is_empty());
    }

    #[test]
    fn inline_text_content_synthesizes_content_b64() {
        let e = entry("/etc/app/config.yml", "sha256:aaa", Some("foo\n"));
        let normalized = normalize_entries(std::slice::from_ref(&e));
        let expected = BASE64.encode("foo\n");
        assert_eq!(normalized[0].content_b64.as_deref(), Some(expected.as_str()));
    }

    #[test]
    fn first_time_reporting_yields_baseline_capture() {
        let curr = vec![entry("/etc/app/config.yml", "sha256:aaa", None)];
        let outcome = diff_fingerprints(&["/etc/app/config.yml".to_string()], Some(&curr), None);
        match outcome {
            DiffOutcome::BaselineCapture { to_capture } => assert_eq!(to_capture.len(), 1),
            _ => panic!("expected baseline capture"),
        }
    }

    #[test]
    fn fingerprint_change_detected_between_successive_payloads() {
        let prev = vec![entry("/etc/app/config.yml", "sha256:aaa", None)];
        let curr = vec![entry("/etc/app/config.yml", "sha256:bbb", None)];
        let outcome = diff_fingerprints(&["/etc/app/config.yml".to_string()], Some(&curr), Some(&prev));
        match outcome {
            DiffOutcome::Changes(changes) => {
                assert_eq!(changes.len(), 1);
                assert_eq!(changes[0].old_fingerprint.as_deref(), Some("sha256:aaa"));
                assert_eq!(changes[0].new_fingerprint.as_deref(), Some("sha256:bbb"));
            }
            _ => panic!("expected changes"),
        }
    }

    #[test]
    fn unrelated_path_is_excluded_by_glob() {
        let curr = vec![entry("/var/log/app.log", "sha256:ccc", None)];
        let outcome = diff_fingerprints(&["/etc/app/*.yml".to_string()], Some(&curr), Some(&[]));
        match outcome {
            DiffOutcome::Changes(changes) => assert!(changes.is_empty()),
            _ => panic!("expected changes (possibly empty)"),
        }
    }

    #[test]
    fn max_bytes_zero_is_unobtainable_even_with_cached_miss() {
        let e = entry("/etc/app/config.yml", "sha256:aaa", Some("foo\n"));
        let normalized = &normalize_entries(std::slice::from_ref(&e))[0];
        let plan = plan_observation(None, normalized, RuleMode::Auto, 0);
        assert!(matches!(plan, ObservationPlan::Unobtainable));
    }

    #[test]
    fn inline_mode_captures_content_directly() {
        let e = entry("/etc/app/config.yml", "sha256:aaa", Some("foo\n"));
        let normalized = &normalize_entries(std::slice::from_ref(&e))[0];
        let plan = plan_observation(None, normalized, RuleMode::Inline, 8192);
        assert!(matches!(plan, ObservationPlan::CaptureInline { .. }));
    }

    #[test]
    fn fetch_mode_without_inline_content_needs_fetch() {
        let e = DvpFileEntry {
            path: "/etc/app/config.yml".into(),
            checksum: Some("sha256:aaa".into()),
            ..Default::default()
        };
        let normalized = &normalize_entries(std::slice::from_ref(&e))[0];
        let plan = plan_observation(None, normalized, RuleMode::Fetch, 8192);
        assert!(matches!(plan, ObservationPlan::NeedsFetch));
    }

    #[test]
    fn unified_diff_marks_removed_and_added_lines() {
        let diff = unified_diff("config.yml@aaa", "config.yml@bbb", "foo\n", "bar\n");
        assert!(diff.text.contains("-foo"));
        assert!(diff.text.contains("+bar"));
        assert!(!diff.truncated);
    }

    #[test]
    fn unified_diff_truncates_past_max_chars() {
        let old = "a\n".repeat(1);
        let new = "b\n".repeat(30_000);
        let diff = unified_diff("a", "b", &old, &new);
        assert!(diff.truncated);
        assert!(diff.text.chars().count() <= DIFF_MAX_CHARS);
    }

    #[test]
    fn truncate_base64_decodes_then_truncates_then_reencodes() {
        let content = BASE64.encode("0123456789");
        let (truncated, was_truncated) = truncate_base64(&content, 4);
        assert!(was_truncated);
        assert_eq!(BASE64.decode(truncated).unwrap(), b"0123");
    }
}
