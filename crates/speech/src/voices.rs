//! Voice identifier mapping
//!
//! Callers sometimes hand us OpenAI-style voice names; the TTS provider has
//! its own roster. This table maps the aliases we have seen in the wild to
//! provider voices. Unknown identifiers fall back to the configured default
//! with a logged warning.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Alias → provider voice
static VOICE_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut map = HashMap::new();
    map.insert("alloy", "anushka");
    map.insert("echo", "abhilash");
    map.insert("fable", "karun");
    map.insert("onyx", "arvind");
    map.insert("nova", "meera");
    map.insert("shimmer", "vidya");
    map
});

/// Provider voices accepted verbatim
static PROVIDER_VOICES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "anushka", "abhilash", "karun", "arvind", "meera", "vidya", "manisha", "hitesh",
    ]
});

/// Resolve a requested voice to a provider identifier.
///
/// Resolution order: exact provider voice, known alias, configured default.
pub fn resolve_voice<'a>(requested: Option<&'a str>, default: &'a str) -> &'a str {
    let Some(requested) = requested.map(str::trim).filter(|v| !v.is_empty()) else {
        return default;
    };

    if PROVIDER_VOICES.contains(&requested) {
        return requested;
    }
    if let Some(mapped) = VOICE_ALIASES.get(requested) {
        return mapped;
    }

    tracing::warn!(voice = %requested, fallback = %default, "Unknown voice identifier");
    default
}
