/*!
 * Tests for ISO language code utilities
 */

use litrans::language_utils::{get_language_name, language_codes_match, normalize_to_part2t, prompt_language_name};

#[test]
fn test_getLanguageName_withThreeLetterCode_shouldReturnEnglishName() {
    assert_eq!(get_language_name("jpn").unwrap(), "Japanese");
    assert_eq!(get_language_name("fre").unwrap(), "French");
}

#[test]
fn test_languageCodesMatch_sameLanguageDifferentForms_shouldMatch() {
    assert!(language_codes_match("de", "ger"));
    assert!(language_codes_match("deu", "ger"));
    assert!(!language_codes_match("de", "nl"));
}

#[test]
fn test_normalizeToPart2t_invalidLength_shouldFail() {
    assert!(normalize_to_part2t("").is_err());
    assert!(normalize_to_part2t("korean").is_err());
}

#[test]
fn test_promptLanguageName_shouldResolveCodes() {
    assert_eq!(prompt_language_name("ja").unwrap(), "Japanese");
    assert_eq!(prompt_language_name(" kor ").unwrap(), "Korean");
}
