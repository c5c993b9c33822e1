pub mod logger;

use std::path::PathBuf;

/// Utility functions for the application
pub struct Utils;

impl Utils {
    /// Sanitize a folder or file name by replacing path-unsafe characters
    pub fn sanitize_filename(filename: &str) -> String {
        filename
            .chars()
            .map(|c| match c {
                '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
                c if c.is_control() => '_',
                _ => c,
            })
            .collect::<String>()
            .replace("..", "_")
            .trim()
            .to_string()
    }

    /// Format duration in human readable format
    pub fn format_duration(seconds: u64) -> String {
        let hours = seconds / 3600;
        let minutes = (seconds % 3600) / 60;
        let secs = seconds % 60;

        if hours > 0 {
            format!("{}:{:02}:{:02}", hours, minutes, secs)
        } else {
            format!("{}:{:02}", minutes, secs)
        }
    }

    /// Format duration in milliseconds
    pub fn format_duration_ms(milliseconds: u64) -> String {
        Self::format_duration(milliseconds / 1000)
    }

    /// Expand a leading `~` to the user's home directory
    pub fn expand_home(path: &str) -> PathBuf {
        match path.strip_prefix('~') {
            Some(rest) if rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\') => {
                match dirs::home_dir() {
                    Some(home) => home.join(rest.trim_start_matches(['/', '\\'])),
                    None => PathBuf::from(path),
                }
            }
            _ => PathBuf::from(path),
        }
    }

    /// First `len` characters of an identifier, used for short folder suffixes
    pub fn short_id(id: &str, len: usize) -> String {
        id.chars().take(len).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(Utils::sanitize_filename("AC/DC: Live?"), "AC_DC_ Live_");
        assert_eq!(Utils::sanitize_filename("../etc/passwd"), "__etc_passwd");
        assert_eq!(Utils::sanitize_filename("  plain name  "), "plain name");
        assert_eq!(Utils::sanitize_filename("a\tb"), "a_b");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(Utils::format_duration_ms(0), "0:00");
        assert_eq!(Utils::format_duration_ms(59_999), "0:59");
        assert_eq!(Utils::format_duration_ms(185_000), "3:05");
        assert_eq!(Utils::format_duration_ms(3_723_000), "1:02:03");
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(Utils::expand_home("/srv/music"), PathBuf::from("/srv/music"));
        assert_eq!(Utils::expand_home("~user/x"), PathBuf::from("~user/x"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(Utils::expand_home("~/Music"), home.join("Music"));
        }
    }

    #[test]
    fn test_short_id() {
        assert_eq!(Utils::short_id("0123456789abcdef", 8), "01234567");
        assert_eq!(Utils::short_id("abc", 8), "abc");
    }
}
