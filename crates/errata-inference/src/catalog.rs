//! Selectable models and tier resolution.
//!
//! Users who stored their own OpenRouter key may pick from the full chat or
//! vision catalog. Everyone else shares the server key and is limited to the
//! cheap tier.

use errata_core::{ModelKind, ModelOption};

/// `(id, display name)` pairs for vision-capable models.
pub const VISION_MODELS: &[(&str, &str)] = &[
    ("google/gemini-3-flash-preview", "Gemini 3 Flash"),
    ("qwen/qwen3.5-397b-a17b", "Qwen 3.5 397B (Default)"),
];

/// `(id, display name)` pairs for chat models.
pub const CHAT_MODELS: &[(&str, &str)] = &[
    ("qwen/qwen3.5-397b-a17b", "Qwen 3.5 397B (Default)"),
    ("qwen/qwen3-235b-a22b-2507", "Qwen 3 235B"),
    ("openai/gpt-5-nano", "GPT-5 Nano"),
    ("openai/gpt-oss-120b:nitro", "GPT OSS 120B Nitro"),
    ("google/gemini-3-flash-preview", "Gemini 3 Flash"),
];

/// Models available on the server-wide key.
pub const LIMITED_MODELS: &[(&str, &str)] = &[
    ("openai/gpt-5-nano", "GPT-5 Nano"),
    ("google/gemini-3-flash-preview", "Gemini 3 Flash"),
];

fn catalog(kind: ModelKind, has_own_key: bool) -> &'static [(&'static str, &'static str)] {
    match (has_own_key, kind) {
        (true, ModelKind::Vision) => VISION_MODELS,
        (true, ModelKind::Chat) => CHAT_MODELS,
        (false, _) => LIMITED_MODELS,
    }
}

/// Models the caller may select for `kind`.
pub fn available_models(kind: ModelKind, has_own_key: bool) -> Vec<ModelOption> {
    catalog(kind, has_own_key)
        .iter()
        .map(|(id, name)| ModelOption {
            id: (*id).to_string(),
            name: (*name).to_string(),
        })
        .collect()
}

/// The requested model if the caller may use it, otherwise the tier's first entry.
pub fn resolve_model(kind: ModelKind, has_own_key: bool, requested: Option<&str>) -> String {
    let models = catalog(kind, has_own_key);
    requested
        .filter(|r| models.iter().any(|(id, _)| id == r))
        .or_else(|| models.first().map(|(id, _)| *id))
        .unwrap_or(match kind {
            ModelKind::Chat => errata_core::defaults::DEFAULT_CHAT_MODEL,
            ModelKind::Vision => errata_core::defaults::DEFAULT_VISION_MODEL,
        })
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_key_gets_full_catalogs() {
        assert_eq!(available_models(ModelKind::Vision, true).len(), 2);
        assert_eq!(available_models(ModelKind::Chat, true).len(), 5);
    }

    #[test]
    fn test_server_key_gets_limited_catalog_for_both_kinds() {
        let chat = available_models(ModelKind::Chat, false);
        let vision = available_models(ModelKind::Vision, false);
        assert_eq!(chat, vision);
        assert_eq!(chat[0].id, "openai/gpt-5-nano");
        assert_eq!(chat[0].name, "GPT-5 Nano");
    }

    #[test]
    fn test_resolve_keeps_allowed_model() {
        assert_eq!(
            resolve_model(ModelKind::Chat, true, Some("qwen/qwen3-235b-a22b-2507")),
            "qwen/qwen3-235b-a22b-2507"
        );
    }

    #[test]
    fn test_resolve_falls_back_to_first_entry() {
        assert_eq!(
            resolve_model(ModelKind::Chat, false, Some("qwen/qwen3.5-397b-a17b")),
            "openai/gpt-5-nano"
        );
        assert_eq!(
            resolve_model(ModelKind::Vision, true, None),
            "google/gemini-3-flash-preview"
        );
    }

    #[test]
    fn test_default_models_are_in_full_catalogs() {
        let d = errata_core::defaults::DEFAULT_CHAT_MODEL;
        assert!(CHAT_MODELS.iter().any(|(id, _)| *id == d));
        let v = errata_core::defaults::DEFAULT_VISION_MODEL;
        assert!(VISION_MODELS.iter().any(|(id, _)| *id == v));
    }
}
