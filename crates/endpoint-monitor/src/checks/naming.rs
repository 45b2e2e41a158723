//! Best effort file naming for downloaded content.

use percent_encoding::percent_decode_str;
use url::Url;

/// Used when neither the headers nor the URL give a usable name.
pub const FALLBACK_FILE_NAME: &str = "download";

const RECOGNIZED_EXTENSIONS: [&str; 3] = ["gml", "xml", "zip"];

/// Resolve a file name: `Content-Disposition` first, then the URL's last path
/// segment if it has a recognised extension and no query, then the fallback.
pub fn resolve_file_name(content_disposition: Option<&str>, url: &Url) -> String {
    content_disposition
        .and_then(file_name_from_disposition)
        .or_else(|| file_name_from_url(url))
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_owned())
}

/// Extract the file name of a `Content-Disposition` header value.
/// The RFC 5987 `filename*` form wins over plain `filename`.
pub fn file_name_from_disposition(header: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for part in split_parameters(header) {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => extended = decode_extended_value(value),
            "filename" => plain = Some(value.trim_matches('"').to_owned()),
            _ => {}
        }
    }

    extended.or(plain).and_then(|name| sanitize(&name))
}

/// Split on `;` outside quoted strings.
fn split_parameters(header: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;

    for (index, ch) in header.char_indices() {
        match ch {
            '"' => quoted = !quoted,
            ';' if !quoted => {
                parts.push(&header[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(&header[start..]);
    parts
}

fn file_name_from_url(url: &Url) -> Option<String> {
    if url.query().is_some() {
        return None;
    }

    let last = url.path_segments()?.last()?;
    if last.contains('&') {
        return None;
    }

    let (_, extension) = last.rsplit_once('.')?;
    RECOGNIZED_EXTENSIONS
        .iter()
        .any(|known| extension.eq_ignore_ascii_case(known))
        .then(|| sanitize(last))
        .flatten()
}

/// Whether the URL's last path segment names a zip archive.
pub fn has_archive_extension(url: &Url) -> bool {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .is_some_and(|last| last.to_ascii_lowercase().ends_with(".zip"))
}

/// Strip directory components so a name can never leave its snapshot directory.
pub fn sanitize(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next()?.trim();
    match base {
        "" | "." | ".." => None,
        _ => Some(base.to_owned()),
    }
}

/// `charset'language'percent-encoded`
fn decode_extended_value(value: &str) -> Option<String> {
    let mut parts = value.splitn(3, '\'');
    let _charset = parts.next()?;
    let _language = parts.next()?;
    percent_decode_str(parts.next()?)
        .decode_utf8()
        .ok()
        .map(|name| name.into_owned())
}
