/// Trim and turn blank strings into `None`
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Lowercase snake_case identifier: starts with a letter, then letters, digits or `_`
pub fn is_snake_case_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("  web team ".to_string())), Some("web team".to_string()));
        assert_eq!(non_blank(Some("   ".to_string())), None);
        assert_eq!(non_blank(None), None);
    }

    #[test]
    fn test_snake_case_identifier() {
        assert!(is_snake_case_identifier("checkout_completed"));
        assert!(is_snake_case_identifier("step2_viewed"));
        assert!(!is_snake_case_identifier("CheckoutCompleted"));
        assert!(!is_snake_case_identifier("2fa_enabled"));
        assert!(!is_snake_case_identifier("add-to-cart"));
        assert!(!is_snake_case_identifier(""));
    }
}
