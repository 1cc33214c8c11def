use unicode_segmentation::UnicodeSegmentation;

/// Trims and collapses runs of inner whitespace to a single space.
pub fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Dedup key: collapsed and case-folded.
pub fn normalize_key(raw: &str) -> String {
    collapse_whitespace(raw).to_lowercase()
}

/// Display form: collapsed, with the first letter of every word upper-cased.
/// The rest of each word is left as typed so that "AC/DC" or "McCartney" survive.
pub fn display_form(raw: &str) -> String {
    raw.split_whitespace()
        .map(capitalize_word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize_word(word: &str) -> String {
    let mut graphemes = word.graphemes(true);
    match graphemes.next() {
        Some(first) => {
            let mut out = first.to_uppercase();
            out.push_str(graphemes.as_str());
            out
        }
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_ignore_case_and_spacing() {
        assert_eq!(normalize_key("  Come   Together "), "come together");
        assert_eq!(normalize_key("The Beatles"), normalize_key("the beatles"));
        assert_eq!(normalize_key("\tÉTÉ\n"), "été");
    }

    #[test]
    fn display_form_capitalizes_words() {
        assert_eq!(display_form("  the   beatles "), "The Beatles");
        assert_eq!(display_form("AC/DC"), "AC/DC");
        assert_eq!(display_form("élan vital"), "Élan Vital");
        assert_eq!(display_form("   "), "");
    }
}
