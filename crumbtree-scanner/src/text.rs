use scraper::ElementRef;

/// Collapse every run of whitespace (including NBSP and narrow NBSP) into a
/// single space and trim the ends.
pub fn squash_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Visible text of an element, whitespace-normalized.
pub fn element_text(element: &ElementRef<'_>) -> String {
    squash_whitespace(&element.text().collect::<String>())
}

pub fn decode_entities(s: &str) -> String {
    html_escape::decode_html_entities(s).into_owned()
}

/// Labels made only of digits and separators are pagination noise.
pub fn is_numeric_label(s: &str) -> bool {
    let mut has_digit = false;
    for c in s.chars() {
        if c.is_ascii_digit() {
            has_digit = true;
        } else if !(c.is_whitespace() || matches!(c, '.' | ',' | '-' | '/')) {
            return false;
        }
    }
    has_digit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_squash_whitespace() {
        assert_eq!(squash_whitespace("  Дрели \n\t и\u{00A0}шуруповёрты  "), "Дрели и шуруповёрты");
        assert_eq!(squash_whitespace("\n \t"), "");
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("&quot;Bosch&quot; &amp; Co&nbsp;"), "\"Bosch\" & Co\u{00A0}");
        assert_eq!(decode_entities("&#1044;"), "Д");
    }

    #[test]
    fn test_numeric_label() {
        assert!(is_numeric_label("2"));
        assert!(is_numeric_label(" 10 "));
        assert!(is_numeric_label("1-20"));
        assert!(!is_numeric_label(""));
        assert!(!is_numeric_label("Tools 2"));
    }
}
