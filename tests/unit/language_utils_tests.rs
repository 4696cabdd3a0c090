/*!
 * Tests for language utility functions
 */

use textwai::language_utils::{
    LanguageCodeType, get_language_name, normalize_to_part2t, resolve_language, validate_language_code,
};

/// Test validation of the three code families
#[test]
fn test_validate_language_code_withValidCodes_shouldReturnCodeType() {
    assert_eq!(validate_language_code("en").unwrap(), LanguageCodeType::Part1);
    assert_eq!(validate_language_code("ces").unwrap(), LanguageCodeType::Part2T);
    assert_eq!(validate_language_code("cze").unwrap(), LanguageCodeType::Part2B);
    assert_eq!(validate_language_code(" FR ").unwrap(), LanguageCodeType::Part1);
}

#[test]
fn test_validate_language_code_withInvalidCodes_shouldFail() {
    assert!(validate_language_code("").is_err());
    assert!(validate_language_code("xx").is_err());
    assert!(validate_language_code("english").is_err());
}

#[test]
fn test_normalize_to_part2t_shouldMapAllFamilies() {
    assert_eq!(normalize_to_part2t("de").unwrap(), "deu");
    assert_eq!(normalize_to_part2t("ger").unwrap(), "deu");
    assert_eq!(normalize_to_part2t("deu").unwrap(), "deu");
    assert!(normalize_to_part2t("zz").is_err());
}

#[test]
fn test_get_language_name_shouldReturnEnglishName() {
    assert_eq!(get_language_name("cs").unwrap(), "Czech");
    assert_eq!(get_language_name("fre").unwrap(), "French");
    assert_eq!(get_language_name("ja").unwrap(), "Japanese");
}

#[test]
fn test_resolve_language_withCodesAndNames_shouldReturnName() {
    assert_eq!(resolve_language("en").unwrap(), "English");
    assert_eq!(resolve_language("German").unwrap(), "German");
    assert_eq!(resolve_language("  Czech ").unwrap(), "Czech");
}

#[test]
fn test_resolve_language_withUnknownName_shouldPassItThrough() {
    assert_eq!(resolve_language("Old Bohemian").unwrap(), "Old Bohemian");
}

#[test]
fn test_resolve_language_withGarbage_shouldFail() {
    assert!(resolve_language("").is_err());
    assert!(resolve_language("   ").is_err());
    assert!(resolve_language("12$").is_err());
}
