//! Token estimation.

use crate::types::char_len;

/// Default characters per token for English prose.
pub const DEFAULT_CHARS_PER_TOKEN: f32 = 4.0;

/// `ceil(chars / chars_per_token)`, at least 1 for non-empty text.
///
/// A non-positive or non-finite ratio falls back to the default.
#[must_use]
pub fn estimate_tokens(text: &str, chars_per_token: f32) -> usize {
    let chars = char_len(text);
    if chars == 0 {
        return 0;
    }
    let ratio = if chars_per_token.is_finite() && chars_per_token > 0.0 {
        f64::from(chars_per_token)
    } else {
        f64::from(DEFAULT_CHARS_PER_TOKEN)
    };
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let tokens = (chars as f64 / ratio).ceil() as usize;
    tokens.max(1)
}
