/*!
 * Tests for resuming interrupted jobs and skipping finished documents
 */

use std::fs;

use litrans::app_controller::TranslateRequest;
use litrans::database::JobStatus;
use litrans::errors::{ProviderError, TranslationError};
use litrans::providers::mock::MockProvider;
use litrans::session::JobManager;

use crate::common::{self, THREE_PARAGRAPHS};

fn request(path: &std::path::Path) -> TranslateRequest {
    let mut request = TranslateRequest::new(path);
    request.target_segment_size = Some(25);
    request
}

/// Model that refuses the credential for the segment mentioning Allie
fn failing_on_allie() -> MockProvider {
    MockProvider::with_responder(|call| {
        if common::source_of(&call.prompt).is_some_and(|source| source.contains("Allie")) {
            Err(ProviderError::AuthenticationError("key revoked".to_string()))
        } else {
            common::literary_model(call)
        }
    })
}

#[tokio::test]
async fn test_translate_afterFailure_shouldResumeFromCheckpoint() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::create_test_file(dir.path(), "book.txt", THREE_PARAGRAPHS).unwrap();
    let jobs = JobManager::new_in_memory().unwrap();

    let failing = failing_on_allie();
    common::controller(&failing, &jobs)
        .translate(request(&input))
        .await
        .unwrap_err();
    let failed_job = jobs.list_jobs(Some(JobStatus::Failed)).await.unwrap().remove(0);

    let provider = common::literary_provider();
    let output = common::controller(&provider, &jobs)
        .translate(request(&input))
        .await
        .unwrap();

    let sources = common::translated_sources(&provider);
    assert_eq!(sources, vec!["Allie wrote poems on his mitt.", "The end came quickly."]);
    assert_eq!(provider.count_prompts_containing("Task: narrative style definition"), 0);
    assert_eq!(
        fs::read_to_string(&output).unwrap(),
        "[ko] Phoebe laughed at me.\n\n[ko] Allie wrote poems on his mitt.\n\n[ko] The end came quickly.\n"
    );

    let resumed = jobs.get_job(&failed_job.id).await.unwrap().unwrap();
    assert_eq!(resumed.status, JobStatus::Completed);
    assert_eq!(jobs.list_jobs(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_translate_resumeById_shouldContinueNamedJob() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::create_test_file(dir.path(), "book.txt", THREE_PARAGRAPHS).unwrap();
    let jobs = JobManager::new_in_memory().unwrap();

    let failing = failing_on_allie();
    common::controller(&failing, &jobs)
        .translate(request(&input))
        .await
        .unwrap_err();
    let failed_job = jobs.list_jobs(Some(JobStatus::Failed)).await.unwrap().remove(0);

    let provider = common::literary_provider();
    let mut resume = request(&input);
    resume.resume_job_id = Some(failed_job.id.clone());
    common::controller(&provider, &jobs).translate(resume).await.unwrap();

    assert_eq!(common::translated_sources(&provider).len(), 2);
    let finished = jobs.get_job(&failed_job.id).await.unwrap().unwrap();
    assert_eq!(finished.status, JobStatus::Completed);
}

#[tokio::test]
async fn test_translate_unknownJobId_shouldReturnJobNotFound() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::create_test_file(dir.path(), "book.txt", THREE_PARAGRAPHS).unwrap();
    let jobs = JobManager::new_in_memory().unwrap();
    let provider = common::literary_provider();

    let mut resume = request(&input);
    resume.resume_job_id = Some("no-such-job".to_string());
    let error = common::controller(&provider, &jobs).translate(resume).await.unwrap_err();

    assert!(matches!(error, TranslationError::JobNotFound(id) if id == "no-such-job"));
    assert_eq!(provider.request_count(), 0);
}

#[tokio::test]
async fn test_translate_fresh_shouldIgnoreUnfinishedJob() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::create_test_file(dir.path(), "book.txt", THREE_PARAGRAPHS).unwrap();
    let jobs = JobManager::new_in_memory().unwrap();

    let failing = failing_on_allie();
    common::controller(&failing, &jobs)
        .translate(request(&input))
        .await
        .unwrap_err();

    let provider = common::literary_provider();
    let mut fresh = request(&input);
    fresh.fresh = true;
    common::controller(&provider, &jobs).translate(fresh).await.unwrap();

    assert_eq!(common::translated_sources(&provider).len(), 3);
    assert_eq!(jobs.list_jobs(None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_run_existingOutput_shouldSkipDocument() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::create_test_file(dir.path(), "book.txt", THREE_PARAGRAPHS).unwrap();
    common::create_test_file(dir.path(), "book.ko.txt", "이미 번역됨").unwrap();
    let jobs = JobManager::new_in_memory().unwrap();
    let provider = common::literary_provider();

    common::controller(&provider, &jobs)
        .run(request(&input), false)
        .await
        .unwrap();

    assert_eq!(provider.request_count(), 0);
    assert_eq!(fs::read_to_string(dir.path().join("book.ko.txt")).unwrap(), "이미 번역됨");
}

#[tokio::test]
async fn test_run_partialOutputOfUnfinishedJob_shouldResume() {
    let dir = tempfile::tempdir().unwrap();
    let input = common::create_test_file(dir.path(), "book.txt", THREE_PARAGRAPHS).unwrap();
    let jobs = JobManager::new_in_memory().unwrap();

    let failing = failing_on_allie();
    common::controller(&failing, &jobs)
        .translate(request(&input))
        .await
        .unwrap_err();
    assert!(dir.path().join("book.ko.txt").exists());

    let provider = common::literary_provider();
    common::controller(&provider, &jobs)
        .run(request(&input), false)
        .await
        .unwrap();

    assert_eq!(common::translated_sources(&provider).len(), 2);
    assert_eq!(jobs.list_jobs(Some(JobStatus::Completed)).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_runFolder_shouldTranslateEachDocumentOnce() {
    let dir = tempfile::tempdir().unwrap();
    common::create_test_file(dir.path(), "a.txt", "Phoebe laughed at me.").unwrap();
    common::create_test_file(dir.path(), "b.txt", "The end came quickly.").unwrap();
    common::create_test_file(dir.path(), "notes.pdf", "ignored").unwrap();
    let jobs = JobManager::new_in_memory().unwrap();
    let provider = common::literary_provider();
    let controller = common::controller(&provider, &jobs);

    controller.run_folder(dir.path().to_path_buf(), false).await.unwrap();
    controller.run_folder(dir.path().to_path_buf(), false).await.unwrap();

    assert!(dir.path().join("a.ko.txt").exists());
    assert!(dir.path().join("b.ko.txt").exists());
    assert_eq!(common::translated_sources(&provider).len(), 2);
}

#[test]
fn test_runFolder_missingDirectory_shouldFail() {
    let dir = tempfile::tempdir().unwrap();
    let jobs = JobManager::new_in_memory().unwrap();
    let provider = common::literary_provider();
    let controller = common::controller(&provider, &jobs);

    let result = tokio_test::block_on(controller.run_folder(dir.path().join("missing"), false));

    assert!(result.is_err());
    assert_eq!(provider.request_count(), 0);
}
