//! Utility functions for manga-dl

use crate::types::Chapter;
use regex::Regex;
use std::sync::OnceLock;

#[allow(clippy::expect_used)]
fn invalid_chars_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[<>:"/\\|?*]"#).expect("static pattern"))
}

#[allow(clippy::expect_used)]
fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static pattern"))
}

/// Sanitize a filename for safe filesystem use.
///
/// Replaces characters invalid on common filesystems with underscores,
/// collapses whitespace, trims leading/trailing dots and spaces, and truncates
/// overlong names. Never returns an empty string.
pub fn sanitize_filename(filename: &str) -> String {
    let replaced = invalid_chars_re().replace_all(filename, "_");
    let collapsed = whitespace_re().replace_all(&replaced, " ");
    let mut name = collapsed.trim_matches(|c| c == ' ' || c == '.').to_string();

    if name.is_empty() {
        name = "untitled".to_string();
    }

    if name.len() > 255 {
        // Truncate on a char boundary
        let mut end = 255;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        name.truncate(end);
    }

    name
}

/// Directory/artifact base name for a chapter: `Chapter {n}[ Vol.{v}][ - {title}]`
pub fn chapter_dir_name(chapter: &Chapter) -> String {
    let volume_str = chapter
        .volume
        .as_ref()
        .map(|v| format!(" Vol.{v}"))
        .unwrap_or_default();
    let title_str = if chapter.title.is_empty() {
        String::new()
    } else {
        format!(" - {}", chapter.title)
    };

    sanitize_filename(&format!(
        "Chapter {}{volume_str}{title_str}",
        chapter.chapter_number
    ))
}

/// Extract the host component of a URL, used as the rate-limiter bucket key.
pub fn url_host(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed.host_str().map(|h| h.to_string())
}

/// Parse a chapter range string against an available chapter list.
///
/// Supported forms: `"1-10"`, `"1,3,5"`, `"1-5,10,15-20"`. Numbers are matched
/// against each chapter's numeric value, so `"1.5"` selects chapter 1.5.
/// Unknown single chapters are logged and skipped; a malformed piece is an
/// error. The result is sorted to canonical chapter order.
pub fn parse_chapter_range(
    chapter_range: &str,
    available_chapters: &[Chapter],
) -> Result<Vec<Chapter>, String> {
    if chapter_range.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut selected: Vec<Chapter> = Vec::new();

    for part in chapter_range.split(',').map(str::trim) {
        if let Some((start_str, end_str)) = part.split_once('-') {
            let start: f64 = start_str
                .trim()
                .parse()
                .map_err(|_| format!("invalid range format: {part}"))?;
            let end: f64 = end_str
                .trim()
                .parse()
                .map_err(|_| format!("invalid range format: {part}"))?;

            for chapter in available_chapters {
                let key = chapter.sort_key();
                if key >= start && key <= end && !chapter.is_special() {
                    selected.push(chapter.clone());
                }
            }
        } else {
            let number: f64 = part
                .parse()
                .map_err(|_| format!("invalid chapter number: {part}"))?;

            match available_chapters
                .iter()
                .find(|c| !c.is_special() && c.sort_key() == number)
            {
                Some(chapter) => selected.push(chapter.clone()),
                None => tracing::warn!(chapter = number, "chapter not found, skipping"),
            }
        }
    }

    selected.sort_by(|a, b| {
        a.sort_key()
            .partial_cmp(&b.sort_key())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    selected.dedup_by(|a, b| a.chapter_id == b.chapter_id);

    Ok(selected)
}

/// Filter a chapter list by preferred language and scanlator.
///
/// Language filtering drops non-matching chapters outright. Scanlator
/// preference only narrows when the same chapter number exists in several
/// versions: the preferred group's version wins, otherwise the first version
/// seen is kept. Applied before chapters reach the orchestrator.
pub fn filter_chapters(
    chapters: Vec<Chapter>,
    preferred_language: Option<&str>,
    preferred_scanlator: Option<&str>,
) -> Vec<Chapter> {
    let by_language: Vec<Chapter> = match preferred_language {
        Some(lang) => chapters
            .into_iter()
            .filter(|c| c.language.eq_ignore_ascii_case(lang))
            .collect(),
        None => chapters,
    };

    let mut result: Vec<Chapter> = Vec::new();
    for chapter in by_language {
        match result
            .iter_mut()
            .find(|kept| kept.chapter_number == chapter.chapter_number)
        {
            Some(kept) => {
                // Duplicate chapter number: replace only if the newcomer is
                // from the preferred group and the kept one is not
                if let Some(group) = preferred_scanlator {
                    let kept_preferred =
                        kept.scanlator.as_deref().is_some_and(|s| s.eq_ignore_ascii_case(group));
                    let new_preferred = chapter
                        .scanlator
                        .as_deref()
                        .is_some_and(|s| s.eq_ignore_ascii_case(group));
                    if new_preferred && !kept_preferred {
                        *kept = chapter;
                    }
                }
            }
            None => result.push(chapter),
        }
    }

    result
}

/// Format a byte count into a human readable string (e.g. "1.5 MB")
pub fn format_bytes(bytes: u64) -> String {
    let mut count = bytes as f64;
    for unit in ["B", "KB", "MB", "GB"] {
        if count < 1024.0 {
            return format!("{count:.1} {unit}");
        }
        count /= 1024.0;
    }
    format!("{count:.1} TB")
}
