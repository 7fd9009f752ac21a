//! Request validation
//!
//! Media URL classification and normalisation, plus search query checks.
//! These run before anything is written to the store or spawned.

use url::Url;

/// Length of a provider video id
const VIDEO_ID_LEN: usize = 11;

/// Upper bound on search query length
pub const MAX_SEARCH_QUERY_LEN: usize = 200;

/// Hosts serving watch/shorts/embed paths
const FULL_HOSTS: &[&str] = &["youtube.com", "m.youtube.com", "music.youtube.com"];

/// Short-link host
const SHORT_HOST: &str = "youtu.be";

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn is_video_id(s: &str) -> bool {
    s.len() == VIDEO_ID_LEN && s.chars().all(is_id_char)
}

/// Trailing query after `&` on a watch URL: word chars, `=`, `&`, `-`
fn is_extra_query(s: &str) -> bool {
    s.chars().all(|c| is_id_char(c) || c == '=' || c == '&')
}

/// Accepted-provider rule for playable URLs.
///
/// Accepts single-video links only:
/// - `youtube.com/watch?v=ID` (optionally followed by `&...` parameters)
/// - `youtube.com/shorts/ID`, `youtube.com/embed/ID`
/// - `youtu.be/ID`
///
/// with an optional `http://`/`https://` scheme, optional `www.`, and the
/// `m.`/`music.` subdomains. `ID` is exactly 11 of `[A-Za-z0-9_-]`.
/// Playlists, other schemes and look-alike domains are rejected.
pub fn is_accepted_media_url(input: &str) -> bool {
    let input = input.trim();

    let rest = input
        .strip_prefix("https://")
        .or_else(|| input.strip_prefix("http://"))
        .unwrap_or(input);
    let rest = rest.strip_prefix("www.").unwrap_or(rest);

    let Some((host, path)) = rest.split_once('/') else {
        return false;
    };

    if host == SHORT_HOST {
        return is_video_id(path);
    }

    if !FULL_HOSTS.contains(&host) {
        return false;
    }

    if let Some(id) = path.strip_prefix("shorts/") {
        return is_video_id(id);
    }
    if let Some(id) = path.strip_prefix("embed/") {
        return is_video_id(id);
    }
    if let Some(query) = path.strip_prefix("watch?v=") {
        let (id, extra) = match query.split_once('&') {
            Some((id, extra)) => (id, Some(extra)),
            None => (query, None),
        };
        return is_video_id(id) && extra.map_or(true, is_extra_query);
    }

    false
}

/// Canonical `https://www.youtube.com/watch?v=ID` form and the extracted id.
///
/// Short links keep only the path segment; watch links (including the
/// `music.` host) use the `v` parameter. Returns `None` for any other shape.
pub fn normalize_media_url(input: &str) -> Option<(String, String)> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let with_scheme = if input.contains("://") {
        input.to_string()
    } else {
        format!("https://{}", input)
    };
    let parsed = Url::parse(&with_scheme).ok()?;
    let host = parsed.host_str()?.trim_start_matches("www.");

    let id = if host == SHORT_HOST {
        parsed.path_segments()?.next()?.to_string()
    } else if FULL_HOSTS.contains(&host) && parsed.path() == "/watch" {
        parsed
            .query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.into_owned())?
    } else {
        return None;
    };

    if !is_video_id(&id) {
        return None;
    }

    Some((format!("https://www.youtube.com/watch?v={}", id), id))
}

/// Canonical form of an accepted URL, or the URL unchanged when it has no
/// watch-link equivalent (shorts and embeds)
pub fn canonical_media_url(url: &str) -> String {
    normalize_media_url(url)
        .map(|(canonical, _)| canonical)
        .unwrap_or_else(|| url.to_string())
}

/// Search queries are ASCII letters, digits and whitespace, 1 to 200 bytes
pub fn is_valid_search_query(query: &str) -> bool {
    !query.is_empty()
        && query.len() <= MAX_SEARCH_QUERY_LEN
        && query
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c.is_ascii_whitespace())
}

/// Strip disallowed characters, trim, and collapse whitespace runs.
///
/// Returns `None` when nothing valid remains.
pub fn sanitise_search_query(query: &str) -> Option<String> {
    let kept: String = query
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_ascii_whitespace())
        .collect();

    let collapsed = kept.split_ascii_whitespace().collect::<Vec<_>>().join(" ");

    if is_valid_search_query(&collapsed) {
        Some(collapsed)
    } else {
        None
    }
}

/// Validated query: used as-is when already clean, sanitised otherwise.
///
/// The flag reports whether sanitising changed the input.
pub fn prepare_search_query(query: &str) -> Option<(String, bool)> {
    let trimmed = query.trim();
    if is_valid_search_query(trimmed) {
        return Some((trimmed.to_string(), false));
    }
    sanitise_search_query(trimmed).map(|q| (q, true))
}
