//! Output filename policy: sanitize the title, fall back to the
//! descriptor id, and resolve the result against the output directory.

use std::path::{Path, PathBuf};

const FORBIDDEN: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];
const MAX_LEN: usize = 200;

/// Replaces forbidden filesystem characters and newlines, trims
/// whitespace/trailing dots, and caps length at 200 characters.
pub fn sanitize(title: &str) -> String {
    let mut out: String = title
        .chars()
        .filter(|c| *c != '\n' && *c != '\r')
        .map(|c| if FORBIDDEN.contains(&c) { '-' } else { c })
        .collect();

    out = out.trim().trim_end_matches('.').to_string();

    if out.chars().count() > MAX_LEN {
        out = out.chars().take(MAX_LEN).collect();
    }

    out
}

/// Resolves the final on-disk path: caller-supplied name wins (joined
/// against `output_dir`); otherwise `sanitize(title).ext`, falling back to
/// `id.ext` when the title sanitizes to empty.
pub fn resolve_output_path(
    output_dir: &Path,
    caller_filename: Option<&str>,
    title: &str,
    id: &str,
    ext: &str,
) -> PathBuf {
    if let Some(name) = caller_filename {
        return output_dir.join(name);
    }

    let sanitized_title = sanitize(title);
    let stem = if sanitized_title.is_empty() { id } else { &sanitized_title };
    output_dir.join(format!("{stem}.{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_forbidden_characters() {
        assert_eq!(sanitize("a/b\\c:d*e?f\"g<h>i|j"), "a-b-c-d-e-f-g-h-i-j");
    }

    #[test]
    fn strips_newlines_and_trims_trailing_dots() {
        assert_eq!(sanitize("  Title line.\n "), "Title line");
    }

    #[test]
    fn caps_length_at_200() {
        let long = "x".repeat(500);
        assert_eq!(sanitize(&long).chars().count(), 200);
    }

    #[test]
    fn falls_back_to_id_when_title_is_empty() {
        let dir = Path::new("/out");
        let path = resolve_output_path(dir, None, "", "abcd1234", "mp4");
        assert_eq!(path, Path::new("/out/abcd1234.mp4"));
    }

    #[test]
    fn caller_filename_wins() {
        let dir = Path::new("/out");
        let path = resolve_output_path(dir, Some("custom.mp4"), "ignored", "id", "mp4");
        assert_eq!(path, Path::new("/out/custom.mp4"));
    }
}
