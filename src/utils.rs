/// Maximum length of a game description before it is cut.
pub const GAME_DESCRIPTION_LIMIT: usize = 500;

/// Marker appended to a truncated description.
pub const ELLIPSIS: &str = "...";

/// Trims each fragment, drops empty ones and joins the rest with single spaces.
pub fn join_fragments<'a>(fragments: impl IntoIterator<Item = &'a str>) -> String {
    fragments
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Cuts `text` to `limit` characters and appends [`ELLIPSIS`] when it was longer.
pub fn truncate_with_ellipsis(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_idx, _)) => format!("{}{}", &text[..byte_idx], ELLIPSIS),
        None => text.to_string(),
    }
}

/// Removes every occurrence of `token` and collapses the leftover whitespace.
/// Text on either side of an embedded token is joined, not split.
pub fn strip_token(text: &str, token: &str) -> String {
    text.replace(token, "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
