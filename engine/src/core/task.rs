//! Task identity and content checks.

use std::path::Path;

use chrono::{DateTime, Utc};

/// Derive a task id from the submitted file name and its pickup time.
///
/// Identity is the file stem plus a wall-clock timestamp captured at pickup,
/// e.g. `fix-login-20260806_121530`. The stem is sanitized so the id is
/// always usable as a directory name.
pub fn task_id(source_file: &str, picked_at: DateTime<Utc>) -> String {
    let stem = Path::new(source_file)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("task");
    format!(
        "{}-{}",
        sanitize_stem(stem),
        picked_at.format("%Y%m%d_%H%M%S")
    )
}

/// True when the task content carries no instructions after trimming.
pub fn is_blank(content: &str) -> bool {
    content.trim().is_empty()
}

fn sanitize_stem(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '-'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "task".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn pickup() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 6, 12, 15, 30).unwrap()
    }

    #[test]
    fn task_id_joins_stem_and_timestamp() {
        assert_eq!(task_id("fix-login.md", pickup()), "fix-login-20260806_121530");
    }

    #[test]
    fn task_id_sanitizes_awkward_stems() {
        assert_eq!(task_id("a b.md", pickup()), "a-b-20260806_121530");
        assert_eq!(
            task_id("hot fix!.md", pickup()),
            "hot-fix--20260806_121530"
        );
    }

    #[test]
    fn blank_detection_trims_whitespace() {
        assert!(is_blank(""));
        assert!(is_blank("  \n\t  "));
        assert!(!is_blank("  do the thing  "));
    }
}
