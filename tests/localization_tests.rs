//! # Localization Tests
//!
//! Message lookup and formatting for cook notifications.

use fridge_recipes::localization::LocalizationManager;
use std::collections::HashMap;

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_localization() -> LocalizationManager {
        LocalizationManager::new().expect("Failed to create localization manager")
    }

    #[test]
    fn test_get_message_existing_key() {
        let manager = setup_localization();

        let message = manager.get_message_in_language("recipe-cooked-title", "en", None);
        assert_eq!(message, "Recipe cooked");
    }

    #[test]
    fn test_get_message_nonexistent_key() {
        let manager = setup_localization();

        let message = manager.get_message_in_language("nonexistent-key", "en", None);
        assert_eq!(message, "Missing translation: nonexistent-key");
    }

    #[test]
    fn test_get_message_unsupported_language() {
        let manager = setup_localization();

        // Falls back to English
        let message = manager.get_message_in_language("recipe-cooked-title", "unsupported", None);
        assert_eq!(message, "Recipe cooked");
    }

    #[test]
    fn test_get_message_with_args() {
        let manager = setup_localization();

        let mut args = HashMap::new();
        args.insert("actor", "Lan");
        args.insert("recipe", "Pho bo");

        let message = manager.get_message_in_language("recipe-cooked-family-message", "en", Some(&args));
        assert_eq!(message, "Lan cooked Pho bo");
    }

    #[test]
    fn test_get_message_missing_args() {
        let manager = setup_localization();

        let message = manager.get_message_in_language("recipe-cooked-personal-message", "en", None);
        assert!(!message.is_empty());
        assert!(message.starts_with("You cooked"));
    }

    #[test]
    fn test_vietnamese_localization() {
        let manager = setup_localization();

        let message = manager.get_message_with_args("recipe-cooked-family-title", "vi", &[("family", "Nguyen")]);
        assert_eq!(message, "Đã nấu cho Nguyen");

        let english = manager.get_message_with_args("recipe-cooked-family-title", "en", &[("family", "Nguyen")]);
        assert_ne!(message, english);
    }

    #[test]
    fn test_every_key_exists_in_every_language() {
        let manager = setup_localization();

        for key in [
            "recipe-cooked-title",
            "recipe-cooked-family-title",
            "recipe-cooked-family-message",
            "recipe-cooked-personal-message",
            "actor-fallback",
            "family-fallback",
        ] {
            for language in ["en", "vi"] {
                let message = manager.get_message_in_language(key, language, None);
                assert!(!message.starts_with("Missing translation"), "{key} missing in {language}");
            }
        }
    }

    #[test]
    fn test_language_resolution() {
        let manager = setup_localization();

        assert_eq!(manager.resolve_language(Some("en")), "en");
        assert_eq!(manager.resolve_language(Some("en-US")), "en");
        assert_eq!(manager.resolve_language(Some("vi")), "vi");
        assert_eq!(manager.resolve_language(Some("vi-VN")), "vi");
        assert_eq!(manager.resolve_language(Some("vi_VN")), "vi");
        assert_eq!(manager.resolve_language(None), "en");
        assert_eq!(manager.resolve_language(Some("fr")), "en");
        assert!(manager.is_language_supported("vi"));
        assert!(!manager.is_language_supported("fr"));
    }
}
