//! Deep-link helper: the page URL's `game_id` query parameter selects the
//! viewed game on load; its absence means "show lobby".

/// Extract the `game_id` parameter from a URL query string.
///
/// Accepts the query with or without the leading `?`. Returns `None` for a
/// missing or empty parameter.
///
/// ```
/// use crowdchess_client::deeplink::game_id_from_query;
///
/// assert_eq!(game_id_from_query("?game_id=G1&tab=votes"), Some("G1".to_string()));
/// assert_eq!(game_id_from_query(""), None);
/// ```
pub fn game_id_from_query(query: &str) -> Option<String> {
    query
        .trim_start_matches('?')
        .split('&')
        .find_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            (key == "game_id" && !value.is_empty()).then(|| value.to_string())
        })
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn extracts_game_id_wherever_it_sits() {
        assert_eq!(game_id_from_query("game_id=G1"), Some("G1".into()));
        assert_eq!(game_id_from_query("?game_id=G1"), Some("G1".into()));
        assert_eq!(
            game_id_from_query("?tab=votes&game_id=abc-123"),
            Some("abc-123".into())
        );
    }

    #[test]
    fn absent_or_empty_means_lobby() {
        assert_eq!(game_id_from_query(""), None);
        assert_eq!(game_id_from_query("?tab=votes"), None);
        assert_eq!(game_id_from_query("?game_id="), None);
        assert_eq!(game_id_from_query("?game_idx=G1"), None);
    }
}
