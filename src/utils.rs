//! Utility functions for names, slugs and URLs

use crate::error::Result;
use regex::Regex;
use std::sync::LazyLock;

/// Runs of characters that are not allowed in a directory slug
#[allow(clippy::expect_used)]
static SLUG_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("slug pattern is valid"));

/// Slug used when a label has no usable characters
const DEFAULT_SLUG: &str = "default";

/// Turn a manufacturer or console label into a directory name
///
/// Lowercases the label and collapses every run of non-alphanumeric
/// characters into a single `_`, trimming leading and trailing separators.
///
/// # Examples
///
/// ```
/// use romfetch::utils::slugify;
///
/// assert_eq!(slugify("Sega"), "sega");
/// assert_eq!(slugify("Mega Drive / Genesis"), "mega_drive_genesis");
/// assert_eq!(slugify("???"), "default");
/// ```
pub fn slugify(label: &str) -> String {
    let lowered = label.to_lowercase();
    let slug = SLUG_SEPARATORS.replace_all(&lowered, "_");
    let slug = slug.trim_matches('_');
    if slug.is_empty() {
        DEFAULT_SLUG.to_string()
    } else {
        slug.to_string()
    }
}

/// Last path component of a name, accepting both `/` and `\` separators
pub fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Split a filename into stem and extension (extension without the dot)
///
/// A leading dot does not start an extension, matching how dotfiles are named.
pub fn split_extension(file_name: &str) -> (&str, Option<&str>) {
    match file_name.rfind('.') {
        Some(pos) if pos > 0 => (&file_name[..pos], Some(&file_name[pos + 1..])),
        _ => (file_name, None),
    }
}

/// Filename of the container a locator points at
///
/// The locator may be a URL (`https://host/files/sonic.torrent?x=1`) or a
/// plain path. When no final component exists the whole locator is used with
/// separators replaced, so the result is always a single path component.
pub fn container_file_name(locator: &str) -> String {
    let path = match url::Url::parse(locator) {
        Ok(url) if url.scheme() != "file" && url.has_host() => url.path().to_string(),
        Ok(url) if url.scheme() == "file" => url.path().to_string(),
        _ => locator.to_string(),
    };
    let name = base_name(path.trim_end_matches(['/', '\\']));
    if name.is_empty() {
        locator.replace(['/', '\\'], "_")
    } else {
        urlencoding::decode(name)
            .map(|n| n.into_owned())
            .unwrap_or_else(|_| name.to_string())
    }
}

/// Percent-encode the path of a URL so it can be sent as-is
///
/// Each path segment is decoded and re-encoded, so already-encoded URLs are
/// left unchanged and characters such as spaces, brackets and `#` become
/// `%XX` escapes. Query and fragment are preserved.
///
/// # Examples
///
/// ```
/// use romfetch::utils::normalize_url;
///
/// let url = normalize_url("https://example.com/roms/Sonic (USA).zip").unwrap();
/// assert_eq!(url, "https://example.com/roms/Sonic%20%28USA%29.zip");
/// ```
pub fn normalize_url(raw: &str) -> Result<String> {
    let mut url = url::Url::parse(raw)?;
    let encoded: Vec<String> = url
        .path()
        .split('/')
        .map(|segment| {
            let decoded = urlencoding::decode(segment)
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| segment.to_string());
            urlencoding::encode(&decoded).into_owned()
        })
        .collect();
    url.set_path(&encoded.join("/"));
    Ok(url.to_string())
}

/// Round to two decimals, the precision progress and speed are reported in
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
