//! Internationalization (i18n) module.
//!
//! User-visible strings live in embedded JSON files, keyed by dot paths.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde_json::Value;

pub const DEFAULT_LOCALE: &str = "en";

/// Global translation store: LangCode -> Key -> Text
static TRANSLATIONS: OnceLock<HashMap<String, Value>> = OnceLock::new();

/// Load the embedded translations. Safe to call more than once.
pub fn init() {
    TRANSLATIONS.get_or_init(|| {
        let mut map = HashMap::new();

        let en_json = include_str!("en.json");
        if let Ok(val) = serde_json::from_str(en_json) {
            map.insert("en".to_string(), val);
        }

        map
    });
}

/// Get text for a key in a specific language.
/// Supports nested keys via dot notation, e.g., "moderation.warn_link".
pub fn get_text(lang: &str, key: &str) -> String {
    let Some(store) = TRANSLATIONS.get() else {
        return key.to_string(); // Fallback if not init
    };

    if let Some(text) = store.get(lang).and_then(|val| resolve_key(val, key)) {
        return text;
    }

    // Fallback to the default locale
    if lang != DEFAULT_LOCALE
        && let Some(text) = store.get(DEFAULT_LOCALE).and_then(|val| resolve_key(val, key))
    {
        return text;
    }

    // Key not found
    key.to_string()
}

fn resolve_key(val: &Value, key: &str) -> Option<String> {
    let mut current = val;
    for part in key.split('.') {
        current = current.get(part)?;
    }
    current.as_str().map(|s| s.to_string())
}
