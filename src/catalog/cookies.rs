//! Netscape-format cookie files, as exported by browser extensions.

use crate::errors::{GamdlWebError, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

/// Single cookie line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub expires: i64,
    pub name: String,
    pub value: String,
}

impl Cookie {
    /// Whether the cookie applies to `host`
    pub fn matches_domain(&self, host: &str) -> bool {
        let domain = self.domain.trim_start_matches('.');
        host == domain || host.ends_with(&format!(".{}", domain))
    }
}

/// Parse the contents of a Netscape cookie file, skipping comments and malformed lines
pub fn parse_netscape(content: &str) -> Vec<Cookie> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim_end_matches(['\r', '\n']);
            let line = match line.strip_prefix(HTTP_ONLY_PREFIX) {
                Some(rest) => rest,
                None if line.starts_with('#') || line.trim().is_empty() => return None,
                None => line,
            };

            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 7 {
                return None;
            }

            Some(Cookie {
                domain: fields[0].to_string(),
                path: fields[2].to_string(),
                secure: fields[3].eq_ignore_ascii_case("TRUE"),
                expires: fields[4].parse().unwrap_or(0),
                name: fields[5].to_string(),
                value: fields[6..].join("\t"),
            })
        })
        .collect()
}

/// Read and parse a cookie file
pub fn load_netscape(path: &Path) -> Result<Vec<Cookie>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| GamdlWebError::Cookies(format!("Failed to read {}: {}", path.display(), e)))?;
    let cookies = parse_netscape(&content);
    if cookies.is_empty() {
        return Err(GamdlWebError::Cookies(format!("No cookies found in {}", path.display())));
    }
    Ok(cookies)
}

/// Value of the first cookie called `name` that applies to `host`
pub fn find_cookie<'a>(cookies: &'a [Cookie], host: &str, name: &str) -> Option<&'a str> {
    cookies
        .iter()
        .find(|cookie| cookie.name == name && cookie.matches_domain(host))
        .map(|cookie| cookie.value.as_str())
}

/// `Cookie` request header value for `host`
pub fn cookie_header(cookies: &[Cookie], host: &str) -> String {
    cookies
        .iter()
        .filter(|cookie| cookie.matches_domain(host))
        .map(|cookie| format!("{}={}", cookie.name, cookie.value))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Report on the configured cookie file
#[derive(Debug, Clone, Serialize)]
pub struct CookiesStatus {
    pub current_directory: Option<PathBuf>,
    pub cookies_path: PathBuf,
    pub cookies_exists: bool,
    pub cookies_size: u64,
    pub cookies_readable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookies_lines: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apple_cookies: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Inspect a cookie file without failing
pub fn inspect(path: &Path) -> CookiesStatus {
    let mut status = CookiesStatus {
        current_directory: std::env::current_dir().ok(),
        cookies_path: path.to_path_buf(),
        cookies_exists: path.is_file(),
        cookies_size: 0,
        cookies_readable: false,
        cookies_lines: None,
        apple_cookies: None,
        error: None,
    };

    if !status.cookies_exists {
        return status;
    }

    status.cookies_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let content = content.trim();
            status.cookies_readable = !content.is_empty();
            status.cookies_lines = Some(if content.is_empty() { 0 } else { content.lines().count() });
            let apple = parse_netscape(content)
                .iter()
                .filter(|cookie| cookie.matches_domain("music.apple.com"))
                .count();
            status.apple_cookies = Some(apple);
        }
        Err(e) => status.error = Some(format!("Error reading cookies file: {}", e)),
    }

    status
}
