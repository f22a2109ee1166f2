/*!
 * End-to-end tests of document translation through the controller
 */

use std::fs;

use litrans::app_controller::TranslateRequest;
use litrans::database::JobStatus;
use litrans::errors::{ProviderError, TranslationError};
use litrans::providers::mock::MockProvider;
use litrans::session::JobManager;
use litrans::translation::Glossary;

use crate::common::{self, THREE_PARAGRAPHS, TWO_CHAPTERS};

fn request(path: &std::path::Path) -> TranslateRequest {
    let mut request = TranslateRequest::new(path);
    request.target_segment_size = Some(25);
    request
}

fn translation_prompts_containing(provider: &MockProvider, needle: &str) -> usize {
    provider
        .calls()
        .iter()
        .filter(|call| common::source_of(&call.prompt).is_some() && call.prompt.contains(needle))
        .count()
}

#[tokio::test]
async fn test_translate_plainText_shouldWriteEverySegmentInOrder() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::create_test_file(dir.path(), "catcher.txt", THREE_PARAGRAPHS).unwrap();
    let jobs = JobManager::new_in_memory().unwrap();
    let provider = common::literary_provider();
    let controller = common::controller(&provider, &jobs);

    let output = controller.translate(request(&input)).await.unwrap();

    assert_eq!(output, dir.path().join("catcher.ko.txt"));
    let text = fs::read_to_string(&output).unwrap();
    assert_eq!(
        text,
        "[ko] Phoebe laughed at me.\n\n[ko] Allie wrote poems on his mitt.\n\n[ko] The end came quickly.\n"
    );

    let listed = jobs.list_jobs(Some(JobStatus::Completed)).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].total_segments, 3);
    assert_eq!(listed[0].completed_segments, 3);
    let expected_path = output.to_string_lossy().to_string();
    assert_eq!(listed[0].output_path.as_deref(), Some(expected_path.as_str()));
}

#[tokio::test]
async fn test_translate_glossaryTerm_shouldReachLaterPrompts() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::create_test_file(
        dir.path(),
        "book.txt",
        "Phoebe laughed at me.\n\nThen Phoebe left.",
    )
    .unwrap();
    let jobs = JobManager::new_in_memory().unwrap();
    let provider = common::literary_provider();
    let controller = common::controller(&provider, &jobs);

    controller.translate(request(&input)).await.unwrap();

    let translation_prompts: Vec<_> = provider
        .calls()
        .into_iter()
        .filter(|call| common::source_of(&call.prompt).is_some())
        .collect();
    assert_eq!(translation_prompts.len(), 2);
    assert!(translation_prompts[1].prompt.contains("- Phoebe: 피비"));
}

#[tokio::test]
async fn test_translate_glossarySeed_shouldBeUsedFromFirstSegment() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::create_test_file(dir.path(), "book.txt", "I left Pencey that night.").unwrap();
    let jobs = JobManager::new_in_memory().unwrap();
    let provider = common::literary_provider();
    let controller = common::controller(&provider, &jobs);

    let mut request = request(&input);
    request.glossary_seed = Some(Glossary::from_pairs([("Pencey", "펜시")]));
    controller.translate(request).await.unwrap();

    let seeded = translation_prompts_containing(&provider, "- Pencey: 펜시");
    assert_eq!(seeded, 1);
}

#[tokio::test]
async fn test_translate_styleOverride_shouldSkipStyleDefinition() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::create_test_file(dir.path(), "book.txt", THREE_PARAGRAPHS).unwrap();
    let jobs = JobManager::new_in_memory().unwrap();
    let provider = common::literary_provider();
    let controller = common::controller(&provider, &jobs);

    let mut request = request(&input);
    request.style_override = Some("Hardboiled and terse.".to_string());
    controller.translate(request).await.unwrap();

    assert_eq!(provider.count_prompts_containing("Task: narrative style definition"), 0);
    assert_eq!(translation_prompts_containing(&provider, "Hardboiled and terse."), 3);
}

#[tokio::test]
async fn test_translate_markdownChapters_shouldKeepHeadings() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::create_test_file(dir.path(), "book.md", TWO_CHAPTERS).unwrap();
    let jobs = JobManager::new_in_memory().unwrap();
    let provider = common::literary_provider();
    let controller = common::controller(&provider, &jobs);

    let output = controller.translate(TranslateRequest::new(&input)).await.unwrap();

    assert_eq!(output, dir.path().join("book.ko.md"));
    let text = fs::read_to_string(&output).unwrap();
    assert_eq!(
        text,
        "# Chapter One\n\n[ko] Phoebe laughed at me.\n\n# Chapter Two\n\n[ko] Allie wrote poems.\n"
    );
}

#[tokio::test]
async fn test_translate_unsupportedFormat_shouldFailWithoutCallingModel() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::create_test_file(dir.path(), "book.epub", "not a zip").unwrap();
    let jobs = JobManager::new_in_memory().unwrap();
    let provider = MockProvider::working();
    let controller = common::controller(&provider, &jobs);

    let error = controller.translate(TranslateRequest::new(&input)).await.unwrap_err();

    assert!(matches!(error, TranslationError::Configuration(_)));
    assert_eq!(provider.request_count(), 0);
    assert!(jobs.list_jobs(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_translate_providerFailure_shouldMarkJobFailed() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::create_test_file(dir.path(), "book.txt", THREE_PARAGRAPHS).unwrap();
    let jobs = JobManager::new_in_memory().unwrap();
    let provider = MockProvider::with_responder(|call| {
        if common::source_of(&call.prompt).is_some_and(|source| source.contains("Allie")) {
            Err(ProviderError::AuthenticationError("key revoked".to_string()))
        } else {
            common::literary_model(call)
        }
    });
    let controller = common::controller(&provider, &jobs);

    let error = controller.translate(request(&input)).await.unwrap_err();

    assert!(matches!(error, TranslationError::Provider(ProviderError::AuthenticationError(_))));
    let failed = jobs.list_jobs(Some(JobStatus::Failed)).await.unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].completed_segments, 1);
    assert!(failed[0].last_error.as_deref().is_some_and(|e| e.contains("key revoked")));
}

#[tokio::test]
async fn test_translate_cancelledBeforeStart_shouldMarkJobCancelled() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::create_test_file(dir.path(), "book.txt", THREE_PARAGRAPHS).unwrap();
    let jobs = JobManager::new_in_memory().unwrap();
    let provider = common::literary_provider();
    let controller = common::controller(&provider, &jobs);
    controller.cancellation().cancel();

    let error = controller.translate(request(&input)).await.unwrap_err();

    assert!(matches!(error, TranslationError::Cancelled { last_completed: None }));
    assert!(common::translated_sources(&provider).is_empty());
    let cancelled = jobs.list_jobs(Some(JobStatus::Cancelled)).await.unwrap();
    assert_eq!(cancelled.len(), 1);
}
