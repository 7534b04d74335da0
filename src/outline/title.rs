use crate::translate::language::is_cjk;

/// Title used when a span has no usable text
pub const UNTITLED_SECTION: &str = "Untitled Section";

/// Root title when the media reported no title of its own
pub const ROOT_PLACEHOLDER: &str = "Untitled Mind Map";

fn is_clause_delimiter(c: char) -> bool {
    matches!(
        c,
        ',' | '.' | ';' | ':' | '!' | '?' | '，' | '。' | '；' | '：' | '！' | '？' | '、'
    )
}

/// Leading clause of `text`, whitespace-collapsed and cut to `max_chars` characters
///
/// A cut that would split a word backs up to the preceding space; text without spaces, such as
/// Chinese, is cut at the character limit.
pub fn leading_clause(text: &str, max_chars: usize) -> Option<String> {
    let clause = text
        .split(is_clause_delimiter)
        .map(|part| part.split_whitespace().collect::<Vec<_>>().join(" "))
        .find(|part| !part.is_empty())?;

    let Some((cut, next)) = clause.char_indices().nth(max_chars) else {
        return Some(clause);
    };

    let mut head = &clause[..cut];
    let splits_word = !next.is_whitespace() && head.chars().last().is_some_and(|c| !is_cjk(c));
    if splits_word {
        if let Some(space) = head.rfind(char::is_whitespace) {
            head = &head[..space];
        }
    }

    Some(head.trim_end().to_string())
}

/// Section title for a span starting with `first_text`
pub fn section_title(first_text: &str, max_chars: usize) -> String {
    leading_clause(first_text, max_chars).unwrap_or_else(|| UNTITLED_SECTION.to_string())
}

/// Root title from the media title, if it has any visible text
pub fn root_title(topic: Option<&str>) -> String {
    topic
        .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| ROOT_PLACEHOLDER.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leading_clause() {
        assert_eq!(leading_clause("Intro to X, and more", 24).as_deref(), Some("Intro to X"));
        assert_eq!(leading_clause("今天我们聊一聊，人工智能", 24).as_deref(), Some("今天我们聊一聊"));
        assert_eq!(leading_clause("...  well then", 24).as_deref(), Some("well then"));
        assert_eq!(leading_clause("abcdefghij", 4).as_deref(), Some("abcd"));
        assert_eq!(leading_clause(" ,.。 ", 24), None);
    }

    #[test]
    fn test_long_clause_is_cut_between_words() {
        assert_eq!(
            leading_clause("Today I want to talk about the borrow checker", 24).as_deref(),
            Some("Today I want to talk")
        );
        assert_eq!(
            leading_clause("Today I want to talk about it", 20).as_deref(),
            Some("Today I want to talk")
        );
        assert_eq!(
            leading_clause("今天我们来聊一聊人工智能的发展历史以及未来趋势和挑战还有机遇", 10).as_deref(),
            Some("今天我们来聊一聊人工")
        );
        assert_eq!(leading_clause("Supercalifragilistic", 5).as_deref(), Some("Super"));
    }

    #[test]
    fn test_fallbacks() {
        assert_eq!(section_title("!!!", 24), UNTITLED_SECTION);
        assert_eq!(root_title(None), ROOT_PLACEHOLDER);
        assert_eq!(root_title(Some("   ")), ROOT_PLACEHOLDER);
        assert_eq!(root_title(Some(" My  Talk ")), "My Talk");
    }
}
