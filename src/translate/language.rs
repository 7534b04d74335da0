//! Language code helpers shared by the transcription and translation stages.

use crate::transcribe::UNKNOWN_LANGUAGE;

/// The only language mind maps are produced in
pub const TARGET_LANGUAGE: &str = "zh";

/// Reduce a language tag or name to its primary subtag ("zh-CN" -> "zh", "English" -> "en")
pub fn normalize(code: &str) -> String {
    let lowered = code.trim().to_lowercase();
    let primary = lowered
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_string();

    let mapped = match primary.as_str() {
        "" => UNKNOWN_LANGUAGE,
        "chinese" | "mandarin" | "cmn" | "yue" | "cantonese" => "zh",
        "english" => "en",
        "japanese" => "ja",
        "korean" => "ko",
        "french" => "fr",
        "german" => "de",
        "spanish" => "es",
        "russian" => "ru",
        other => other,
    };

    mapped.to_string()
}

/// Compare two language codes by primary subtag; unknown never matches anything
pub fn same_language(a: &str, b: &str) -> bool {
    let a = normalize(a);
    let b = normalize(b);
    a != UNKNOWN_LANGUAGE && a == b
}

/// CJK unified ideographs, including extension A
pub fn is_cjk(c: char) -> bool {
    matches!(c, '\u{4e00}'..='\u{9fff}' | '\u{3400}'..='\u{4dbf}')
}

/// Share of non-whitespace characters that are CJK ideographs
pub fn cjk_ratio(text: &str) -> f64 {
    let mut total = 0usize;
    let mut cjk = 0usize;

    for c in text.chars().filter(|c| !c.is_whitespace()) {
        total += 1;
        if is_cjk(c) {
            cjk += 1;
        }
    }

    if total == 0 {
        0.0
    } else {
        cjk as f64 / total as f64
    }
}

/// Guess the language from the text itself when the transcriber could not tell
pub fn infer_language(text: &str) -> Option<&'static str> {
    if cjk_ratio(text) > 0.5 {
        Some(TARGET_LANGUAGE)
    } else {
        None
    }
}

/// Human-readable name used in translation prompts
pub fn display_name(code: &str) -> String {
    match normalize(code).as_str() {
        "zh" => "Simplified Chinese".to_string(),
        "en" => "English".to_string(),
        "ja" => "Japanese".to_string(),
        "ko" => "Korean".to_string(),
        "fr" => "French".to_string(),
        "de" => "German".to_string(),
        "es" => "Spanish".to_string(),
        "ru" => "Russian".to_string(),
        other => other.to_string(),
    }
}
