/*!
 * Tests for prompt softening
 */

use std::collections::BTreeMap;
use std::sync::Arc;

use litrans::translation::prompts::{PromptCatalog, PromptSanitizer};

fn sanitizer_with(pairs: &[(&str, &str)]) -> PromptSanitizer {
    let table: BTreeMap<String, String> = pairs
        .iter()
        .map(|(term, euphemism)| (term.to_string(), euphemism.to_string()))
        .collect();
    PromptSanitizer::with_euphemisms(Arc::new(PromptCatalog::default()), table)
}

#[test]
fn test_substituteTerms_customTable_shouldReplaceWholeWordsOnly() {
    let sanitizer = sanitizer_with(&[("gun", "tool")]);

    let softened = sanitizer.substitute_terms("The gun was by the gunwale.");

    assert_eq!(softened, "The tool was by the gunwale.");
    assert_eq!(sanitizer.term_count(), 1);
}

#[test]
fn test_soften_attemptZero_shouldReturnPromptUnchanged() {
    let sanitizer = sanitizer_with(&[("gun", "tool")]);

    assert_eq!(sanitizer.soften("A gun.", 0), "A gun.");
}

#[test]
fn test_minimalPrompt_shouldNameLanguageAndCarrySource() {
    let sanitizer = sanitizer_with(&[]);

    let prompt = sanitizer.minimal_prompt("Phoebe laughed.", "Korean").unwrap();

    assert!(prompt.contains("Korean"));
    assert!(prompt.ends_with("Phoebe laughed."));
}
