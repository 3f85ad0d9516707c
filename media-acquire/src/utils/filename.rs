//! Filename sanitization for library paths.
//!
//! Titles come from external metadata and may contain characters that are
//! invalid on Windows, Linux, or macOS. Valid Unicode text is preserved.

/// Characters that are invalid in Windows filenames
const WINDOWS_INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Windows reserved filenames (case-insensitive)
const WINDOWS_RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Sanitize a title for use as a single path component.
///
/// Invalid and control characters become `_` (runs collapse to one),
/// leading/trailing spaces and dots are trimmed, reserved Windows names get a
/// `_` prefix, and an empty result becomes `unnamed`.
///
/// ```
/// use media_acquire::utils::filename::sanitize_filename;
///
/// assert_eq!(sanitize_filename("Who?"), "Who_");
/// assert_eq!(sanitize_filename("AC/DC: Live"), "AC_DC_ Live");
/// assert_eq!(sanitize_filename(""), "unnamed");
/// ```
pub fn sanitize_filename(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut last_was_replacement = false;

    for c in input.chars() {
        if c.is_control() || WINDOWS_INVALID_CHARS.contains(&c) {
            if !last_was_replacement {
                result.push('_');
                last_was_replacement = true;
            }
        } else {
            result.push(c);
            last_was_replacement = false;
        }
    }

    let trimmed = result.trim_matches(|c| c == ' ' || c == '.');
    if trimmed.is_empty() {
        return "unnamed".to_string();
    }

    let upper = trimmed.to_uppercase();
    let stem = upper.split('.').next().unwrap_or(&upper);
    if WINDOWS_RESERVED_NAMES.contains(&stem) {
        return format!("_{}", trimmed);
    }

    trimmed.to_string()
}

/// `S01E02` style episode code.
pub fn episode_code(season: u32, episode: u32) -> String {
    format!("S{:02}E{:02}", season, episode)
}

/// `Season 01` style directory name.
pub fn season_dir(season: u32) -> String {
    format!("Season {:02}", season)
}

/// File extension of `name`, lowercased, without the dot.
pub fn extension_lower(name: &str) -> Option<String> {
    std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("", "unnamed")]
    #[case("???", "_")]
    #[case("The Office (US)", "The Office (US)")]
    #[case("Marvel's Agents of S.H.I.E.L.D.", "Marvel's Agents of S.H.I.E.L.D")]
    #[case("Face/Off", "Face_Off")]
    #[case("hello???world", "hello_world")]
    #[case("CON", "_CON")]
    #[case("nul.mkv", "_nul.mkv")]
    #[case("  spaced  ", "spaced")]
    #[case("進撃の巨人", "進撃の巨人")]
    fn test_sanitize_filename(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(sanitize_filename(input), expected);
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        for input in ["Face/Off", "CON", "  test  ", "what?.."] {
            let once = sanitize_filename(input);
            assert_eq!(once, sanitize_filename(&once), "input: {}", input);
        }
    }

    #[test]
    fn test_episode_naming_helpers() {
        assert_eq!(episode_code(1, 2), "S01E02");
        assert_eq!(episode_code(12, 105), "S12E105");
        assert_eq!(season_dir(3), "Season 03");
        assert_eq!(extension_lower("Movie.MKV").as_deref(), Some("mkv"));
        assert_eq!(extension_lower("README"), None);
    }
}
