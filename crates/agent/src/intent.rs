use copilot_core::Intent;

/// Maps a routing agent's raw reply onto the intent vocabulary. The first
/// recognised token wins; anything else degrades to [`Intent::General`].
pub fn classify(raw: &str) -> Intent {
    let normalized = raw.trim().to_ascii_lowercase();

    normalized
        .split(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
        .filter(|token| !token.is_empty())
        .find_map(intent_for_token)
        .unwrap_or(Intent::General)
}

fn intent_for_token(token: &str) -> Option<Intent> {
    Intent::VOCABULARY.into_iter().find(|intent| intent.as_str() == token)
}
