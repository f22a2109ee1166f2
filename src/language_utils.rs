use anyhow::{Result, anyhow};
use isolang::Language;

/// Language utilities for ISO language code handling
///
/// Jobs are configured with ISO 639-1 (2-letter) or ISO 639-2 (3-letter)
/// codes, while every prompt names the target language in English
/// ("Korean"), so this module maps between the two.

/// ISO 639-2/B codes that differ from their ISO 639-2/T form
const BIBLIOGRAPHIC_CODES: &[(&str, &str)] = &[
    ("fre", "fra"),
    ("ger", "deu"),
    ("dut", "nld"),
    ("gre", "ell"),
    ("chi", "zho"),
    ("cze", "ces"),
    ("ice", "isl"),
    ("alb", "sqi"),
    ("arm", "hye"),
    ("baq", "eus"),
    ("bur", "mya"),
    ("per", "fas"),
    ("geo", "kat"),
    ("may", "msa"),
    ("mac", "mkd"),
    ("rum", "ron"),
    ("slo", "slk"),
    ("wel", "cym"),
];

fn lookup(code: &str) -> Option<Language> {
    let code = code.trim().to_lowercase();
    match code.len() {
        2 => Language::from_639_1(&code),
        3 => {
            let terminological = BIBLIOGRAPHIC_CODES
                .iter()
                .find(|(bibliographic, _)| *bibliographic == code)
                .map(|(_, terminological)| *terminological)
                .unwrap_or(code.as_str());
            Language::from_639_3(terminological)
        }
        _ => None,
    }
}

/// Validate a language code, returning its ISO 639-2/T form
pub fn normalize_to_part2t(code: &str) -> Result<String> {
    lookup(code)
        .map(|lang| lang.to_639_3().to_string())
        .ok_or_else(|| anyhow!("Invalid language code: {}", code))
}

/// ISO 639-1 code when one exists, else the ISO 639-2/T code
pub fn normalize_to_part1_or_part2t(code: &str) -> Result<String> {
    let lang = lookup(code).ok_or_else(|| anyhow!("Invalid language code: {}", code))?;
    Ok(lang
        .to_639_1()
        .map(str::to_string)
        .unwrap_or_else(|| lang.to_639_3().to_string()))
}

/// Check if two language codes represent the same language
pub fn language_codes_match(code1: &str, code2: &str) -> bool {
    match (lookup(code1), lookup(code2)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// English name of the language a code stands for
pub fn get_language_name(code: &str) -> Result<String> {
    let lang = lookup(code).ok_or_else(|| anyhow!("Invalid language code: {}", code))?;
    Ok(lang.to_name().to_string())
}

/// Name to put in prompts: codes are resolved, English names pass through
pub fn prompt_language_name(language: &str) -> Result<String> {
    if let Ok(name) = get_language_name(language) {
        return Ok(name);
    }

    Language::from_name(language.trim())
        .map(|lang| lang.to_name().to_string())
        .ok_or_else(|| anyhow!("Unknown language: {}", language))
}
