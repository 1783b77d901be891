mod common;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use common::*;
use folio::cache::{ClassificationCache, LOCAL_SCOPE};
use folio::extract::DocumentParser;
use folio::progress::{NoProgress, ProgressEvent};
use folio::remote::RemoteError;
use folio::{
    ClassificationMethod, FolioError, OrchestratorOptions, OrganizePlan, RunRequest, Settings,
    FALLBACK_CATEGORY, UNPROCESSABLE_CATEGORY,
};

struct Dirs {
    folder: TempDir,
    data: TempDir,
}

fn dirs() -> Dirs {
    Dirs {
        folder: TempDir::new().unwrap(),
        data: TempDir::new().unwrap(),
    }
}

async fn run_local(h: &Harness, dirs: &Dirs) -> OrganizePlan {
    let categories = categories();
    h.orchestrator
        .run(
            RunRequest::new(dirs.folder.path(), &categories, LOCAL_SCOPE),
            &NoProgress,
        )
        .await
        .unwrap()
}

async fn run_remote(h: &Harness, dirs: &Dirs, budget: u32) -> OrganizePlan {
    let categories = categories();
    h.orchestrator
        .run(
            RunRequest::new(dirs.folder.path(), &categories, LOCAL_SCOPE).with_remote(budget),
            &NoProgress,
        )
        .await
        .unwrap()
}

fn method_of(plan: &OrganizePlan, filename: &str) -> ClassificationMethod {
    plan.records
        .iter()
        .find(|r| r.filename == filename)
        .map(|r| r.method)
        .unwrap()
}

fn category_of<'a>(plan: &'a OrganizePlan, filename: &str) -> &'a str {
    plan.records
        .iter()
        .find(|r| r.filename == filename)
        .map(|r| r.category.as_str())
        .unwrap()
}

#[tokio::test]
async fn test_cache_makes_second_run_free() {
    let dirs = dirs();
    write(dirs.folder.path(), "notes.txt", b"Results of the blood exam from last week");

    let remote = ScriptedRemote::answering("Health");
    let h = harness(dirs.data.path(), Some(remote.clone()));

    let first = run_remote(&h, &dirs, 5).await;
    assert_eq!(first.remote_calls_used, 1);
    assert_eq!(method_of(&first, "notes.txt"), ClassificationMethod::RemoteText);
    assert_eq!(category_of(&first, "notes.txt"), "Health");

    let second = run_remote(&h, &dirs, 5).await;
    assert_eq!(second.remote_calls_used, 0);
    assert_eq!(method_of(&second, "notes.txt"), ClassificationMethod::Cache);
    assert_eq!(category_of(&second, "notes.txt"), "Health");

    assert_eq!(remote.call_count(), 1);
}

#[tokio::test]
async fn test_identical_bytes_share_a_cache_entry() {
    let dirs = dirs();
    let content = b"Signed contract between the parties, see court filing";
    write(dirs.folder.path(), "a_original.txt", content);
    write(dirs.folder.path(), "b_copy.txt", content);

    let remote = ScriptedRemote::answering("Legal");
    let h = harness(dirs.data.path(), Some(remote.clone()));

    let plan = run_remote(&h, &dirs, 5).await;
    assert_eq!(method_of(&plan, "a_original.txt"), ClassificationMethod::RemoteText);
    assert_eq!(method_of(&plan, "b_copy.txt"), ClassificationMethod::Cache);
    assert_eq!(plan.remote_calls_used, 1);

    // Renaming keeps the cache key
    std::fs::rename(
        dirs.folder.path().join("a_original.txt"),
        dirs.folder.path().join("renamed.txt"),
    )
    .unwrap();
    let plan = run_remote(&h, &dirs, 5).await;
    assert_eq!(method_of(&plan, "renamed.txt"), ClassificationMethod::Cache);
    assert_eq!(category_of(&plan, "renamed.txt"), "Legal");

    assert_eq!(remote.call_count(), 1);
    let cache = ClassificationCache::new(dirs.data.path()).load(LOCAL_SCOPE);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn test_budget_ceiling_is_respected() {
    let dirs = dirs();
    for i in 0..5 {
        let content = format!("bank payment number {} for the invoice", i);
        write(dirs.folder.path(), &format!("doc{}.txt", i), content.as_bytes());
    }

    let remote = ScriptedRemote::answering("Financial");
    let h = harness(dirs.data.path(), Some(remote.clone()));

    let plan = run_remote(&h, &dirs, 2).await;

    assert_eq!(plan.remote_calls_used, 2);
    assert_eq!(remote.call_count(), 2);

    let remote_records = plan.records.iter().filter(|r| r.method.is_remote()).count();
    assert_eq!(remote_records, 2);
    let local_records = plan
        .records
        .iter()
        .filter(|r| {
            matches!(
                r.method,
                ClassificationMethod::FilenameKeyword | ClassificationMethod::LocalEmbedding
            )
        })
        .count();
    assert_eq!(local_records, 3);
    // Local embeddings still land these in Financial
    assert!(plan.records.iter().all(|r| r.category == "Financial"));
}

#[tokio::test]
async fn test_results_stay_inside_the_category_set() {
    let dirs = dirs();
    write(dirs.folder.path(), "letter.txt", b"Dear customer, please find attached");
    write(dirs.folder.path(), "scan.pdf", b"not really a pdf");
    write(dirs.folder.path(), "data.bin", b"\x00\x01\x02");

    let remote = ScriptedRemote::answering("Taxes");
    let h = harness(dirs.data.path(), Some(remote.clone()));

    let plan = run_remote(&h, &dirs, 10).await;

    let allowed: HashSet<String> = categories()
        .names()
        .map(str::to_string)
        .chain([FALLBACK_CATEGORY.to_string(), UNPROCESSABLE_CATEGORY.to_string()])
        .collect();
    for record in &plan.records {
        assert!(allowed.contains(&record.category), "{:?}", record);
    }
    assert_eq!(category_of(&plan, "letter.txt"), FALLBACK_CATEGORY);

    // Unknown categories are never cached
    let cache = ClassificationCache::new(dirs.data.path()).load(LOCAL_SCOPE);
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_stale_cache_entry_falls_back() {
    let dirs = dirs();
    write(dirs.folder.path(), "old.txt", b"something that was once classified");

    let fingerprint =
        folio::fingerprint::fingerprint_file(&dirs.folder.path().join("old.txt")).unwrap();
    let cache = ClassificationCache::new(dirs.data.path());
    let mut map = folio::cache::CacheMap::new();
    map.insert(fingerprint, "Deleted Category".to_string());
    cache.save(LOCAL_SCOPE, &map).unwrap();

    let h = harness(dirs.data.path(), None);
    let plan = run_local(&h, &dirs).await;

    assert_eq!(method_of(&plan, "old.txt"), ClassificationMethod::Cache);
    assert_eq!(category_of(&plan, "old.txt"), FALLBACK_CATEGORY);
}

#[tokio::test]
async fn test_unmatched_image_goes_to_images() {
    let dirs = dirs();
    write(dirs.folder.path(), "beach_day.jpg", b"\xFF\xD8\xFF");
    write(dirs.folder.path(), "corrupt.png", b"\x89PNG");

    let h = harness_with(
        dirs.data.path(),
        None,
        OrchestratorOptions::default(),
        DocumentParser::with_ocr(Arc::new(BeachOcr)),
    );
    let plan = run_local(&h, &dirs).await;

    let beach = plan.records.iter().find(|r| r.filename == "beach_day.jpg").unwrap();
    assert_eq!(beach.category, "Images");
    assert_eq!(beach.method, ClassificationMethod::LocalEmbedding);
    assert!(beach.extension_redirect);

    // Unprocessable is never redirected
    let corrupt = plan.records.iter().find(|r| r.filename == "corrupt.png").unwrap();
    assert_eq!(corrupt.category, UNPROCESSABLE_CATEGORY);
    assert_eq!(corrupt.method, ClassificationMethod::Unprocessable);
    assert!(!corrupt.extension_redirect);
}

#[tokio::test]
async fn test_category_named_file_uses_keyword() {
    let dirs = dirs();
    // Content says money, name says health
    write(dirs.folder.path(), "health.pdf", b"bank invoice payment");

    let h = harness(dirs.data.path(), None);
    let plan = run_local(&h, &dirs).await;

    let record = &plan.records[0];
    assert_eq!(record.category, "Health");
    assert_eq!(record.method, ClassificationMethod::FilenameKeyword);
    assert!((record.confidence - 0.98).abs() < f32::EPSILON);
}

#[tokio::test]
async fn test_highest_keyword_threshold_still_accepts_name_matches() {
    let dirs = dirs();
    write(dirs.folder.path(), "health.pdf", b"bank invoice payment");
    write(dirs.folder.path(), "invoice_march.txt", b"doctor notes after the blood exam");

    let settings = Settings::from_lookup(|key| {
        (key == "FOLIO_KEYWORD_THRESHOLD").then(|| "1.0".to_string())
    })
    .unwrap();
    let h = harness_with(
        dirs.data.path(),
        None,
        OrchestratorOptions::from_settings(&settings),
        DocumentParser::new(),
    );
    let plan = run_local(&h, &dirs).await;

    assert_eq!(method_of(&plan, "health.pdf"), ClassificationMethod::FilenameKeyword);
    assert_eq!(category_of(&plan, "health.pdf"), "Health");
    // Plain keyword hits (0.90) are below the threshold and go to embeddings
    assert_eq!(
        method_of(&plan, "invoice_march.txt"),
        ClassificationMethod::LocalEmbedding
    );
}

#[tokio::test]
async fn test_empty_folder_lists_every_category() {
    let dirs = dirs();
    let h = harness(dirs.data.path(), Some(ScriptedRemote::answering("Health")));

    let plan = run_remote(&h, &dirs, 3).await;

    assert!(plan.records.is_empty());
    assert_eq!(plan.remote_calls_used, 0);
    assert_eq!(plan.grouping.len(), categories().len());
    assert!(plan.grouping.values().all(|files| files.is_empty()));
    let keys: Vec<&str> = plan.grouping.keys().map(String::as_str).collect();
    assert_eq!(keys, categories().names().collect::<Vec<_>>());
    // Nothing to classify, nothing embedded
    assert_eq!(h.model.calls(), 0);
}

#[tokio::test]
async fn test_corrupt_cache_is_replaced() {
    let dirs = dirs();
    write(dirs.folder.path(), "visit.txt", b"doctor visit and blood exam");

    let cache = ClassificationCache::new(dirs.data.path());
    std::fs::write(cache.path_for(LOCAL_SCOPE), "{{{ definitely not json").unwrap();

    let h = harness(dirs.data.path(), Some(ScriptedRemote::answering("Health")));
    let plan = run_remote(&h, &dirs, 1).await;

    assert_eq!(method_of(&plan, "visit.txt"), ClassificationMethod::RemoteText);
    let reloaded = cache.load(LOCAL_SCOPE);
    assert_eq!(reloaded.len(), 1);
    assert_eq!(reloaded.values().next().map(String::as_str), Some("Health"));
}

#[tokio::test]
async fn test_missing_folder_fails_the_run() {
    let dirs = dirs();
    let missing = dirs.folder.path().join("gone");
    let h = harness(dirs.data.path(), None);
    let categories = categories();

    let result = h
        .orchestrator
        .run(RunRequest::new(&missing, &categories, LOCAL_SCOPE), &NoProgress)
        .await;
    assert!(matches!(result, Err(FolioError::FolderNotFound(_))));
}

#[tokio::test]
async fn test_native_file_tries_upload_then_text() {
    let dirs = dirs();
    write(dirs.folder.path(), "receipt.png", b"\x89PNG");
    write(dirs.folder.path(), "statement.txt", b"Monthly bank statement with payment list");

    // Upload answers "Other", which is not accepted; text answers Financial
    let remote = ScriptedRemote::new(|call| match call {
        RemoteCall::File { .. } => Ok(verdict("Other")),
        RemoteCall::Text { .. } => Ok(verdict("Financial")),
    });
    let h = harness(dirs.data.path(), Some(remote.clone()));

    let plan = run_remote(&h, &dirs, 10).await;

    // No OCR: the image has no text, so it is unprocessable but was still charged once
    assert_eq!(category_of(&plan, "receipt.png"), UNPROCESSABLE_CATEGORY);
    assert_eq!(method_of(&plan, "statement.txt"), ClassificationMethod::RemoteText);
    assert_eq!(plan.remote_calls_used, 2);

    let calls = remote.calls.lock().unwrap().clone();
    assert_eq!(
        calls[0],
        RemoteCall::File {
            mime_type: "image/png".to_string()
        }
    );
    assert!(matches!(calls[1], RemoteCall::Text { .. }));
    assert_eq!(calls.len(), 2);
}

#[tokio::test]
async fn test_native_upload_accepted() {
    let dirs = dirs();
    write(dirs.folder.path(), "scan.pdf", b"%PDF-1.4 fake");

    let remote = ScriptedRemote::answering("Legal");
    let h = harness(dirs.data.path(), Some(remote.clone()));
    let plan = run_remote(&h, &dirs, 1).await;

    assert_eq!(method_of(&plan, "scan.pdf"), ClassificationMethod::RemoteFile);
    assert_eq!(category_of(&plan, "scan.pdf"), "Legal");
    assert_eq!(remote.call_count(), 1);
}

#[tokio::test]
async fn test_unprocessable_charge_is_configurable() {
    for (charge, expected) in [(true, 1), (false, 0)] {
        let dirs = dirs();
        write(dirs.folder.path(), "blob.bin", b"\x00\x01\x02\x03");

        let remote = ScriptedRemote::answering("Health");
        let h = harness_with(
            dirs.data.path(),
            Some(remote.clone()),
            OrchestratorOptions {
                charge_unprocessable: charge,
                ..OrchestratorOptions::default()
            },
            DocumentParser::new(),
        );

        let plan = run_remote(&h, &dirs, 3).await;
        assert_eq!(category_of(&plan, "blob.bin"), UNPROCESSABLE_CATEGORY);
        assert_eq!(method_of(&plan, "blob.bin"), ClassificationMethod::Unprocessable);
        assert_eq!(plan.remote_calls_used, expected, "charge_unprocessable={}", charge);
        assert_eq!(remote.call_count(), 0);
    }
}

#[tokio::test]
async fn test_remote_failure_falls_back_to_local() {
    let dirs = dirs();
    write(dirs.folder.path(), "report.txt", b"doctor notes after the blood exam");

    let remote = ScriptedRemote::new(|_| Err(RemoteError::Unauthorized { status: 401 }));
    let h = harness(dirs.data.path(), Some(remote.clone()));

    let plan = run_remote(&h, &dirs, 2).await;

    assert_eq!(method_of(&plan, "report.txt"), ClassificationMethod::LocalEmbedding);
    assert_eq!(category_of(&plan, "report.txt"), "Health");
    // The call completed, so it is charged, and it was not retried
    assert_eq!(plan.remote_calls_used, 1);
    assert_eq!(remote.call_count(), 1);
}

#[tokio::test]
async fn test_exhausted_retries_fall_back_to_local() {
    let dirs = dirs();
    write(dirs.folder.path(), "papers.txt", b"contract for the court");

    let remote = ScriptedRemote::new(|_| Err(RemoteError::RateLimited));
    let h = harness(dirs.data.path(), Some(remote.clone()));

    let plan = run_remote(&h, &dirs, 1).await;

    assert_eq!(method_of(&plan, "papers.txt"), ClassificationMethod::LocalEmbedding);
    assert_eq!(category_of(&plan, "papers.txt"), "Legal");
    assert_eq!(plan.remote_calls_used, 1);
    assert_eq!(remote.call_count(), 3);
}

#[tokio::test]
async fn test_remote_disabled_without_budget() {
    let dirs = dirs();
    write(dirs.folder.path(), "exam.txt", b"blood exam");

    let remote = ScriptedRemote::answering("Legal");
    let h = harness(dirs.data.path(), Some(remote.clone()));

    let plan = run_remote(&h, &dirs, 0).await;
    assert_eq!(plan.remote_calls_used, 0);
    assert_eq!(remote.call_count(), 0);
    assert_eq!(category_of(&plan, "exam.txt"), "Health");
}

#[tokio::test]
async fn test_progress_reported_for_every_file() {
    let dirs = dirs();
    write(dirs.folder.path(), "a.txt", b"bank invoice");
    write(dirs.folder.path(), "b.bin", b"\x00");
    write(dirs.folder.path(), "c.txt", b"court contract");

    let h = harness(dirs.data.path(), None);
    let categories = categories();
    let events: Mutex<Vec<ProgressEvent>> = Mutex::new(Vec::new());
    let sink = |e: ProgressEvent| events.lock().unwrap().push(e);

    let plan = h
        .orchestrator
        .run(
            RunRequest::new(dirs.folder.path(), &categories, LOCAL_SCOPE),
            &sink,
        )
        .await
        .unwrap();

    let events = events.into_inner().unwrap();
    let positions: Vec<(usize, usize)> = events.iter().map(|e| (e.current, e.total)).collect();
    assert_eq!(positions, vec![(1, 3), (2, 3), (3, 3)]);

    let indices: Vec<usize> = plan.records.iter().map(|r| r.sequence_index).collect();
    assert_eq!(indices, vec![0, 1, 2]);
    assert_eq!(plan.grouping[UNPROCESSABLE_CATEGORY], vec!["b.bin"]);
}

#[tokio::test]
async fn test_local_results_are_not_cached() {
    let dirs = dirs();
    write(dirs.folder.path(), "invoice.txt", b"bank payment");

    let h = harness(dirs.data.path(), None);
    let plan = run_local(&h, &dirs).await;
    assert_eq!(category_of(&plan, "invoice.txt"), "Financial");

    let cache = ClassificationCache::new(dirs.data.path());
    assert!(!cache.path_for(LOCAL_SCOPE).exists());
}

#[tokio::test]
async fn test_override_then_apply_moves_files() {
    let dirs = dirs();
    write(dirs.folder.path(), "bill.txt", b"bank invoice payment");
    write(dirs.folder.path(), "misc.txt", b"court contract");
    write(dirs.folder.path(), "raw.bin", b"\x00\x01");

    let h = harness(dirs.data.path(), None);
    let categories = categories();
    let mut plan = run_local(&h, &dirs).await;

    let misc = plan
        .records
        .iter()
        .position(|r| r.filename == "misc.txt")
        .unwrap();
    plan.override_category(misc, "health", &categories).unwrap();
    assert_eq!(plan.records[misc].method, ClassificationMethod::ManualOverride);
    assert_eq!(plan.grouping["Health"], vec!["misc.txt"]);

    let report = folio::mover::apply_plan(
        dirs.folder.path(),
        &plan,
        &folio::mover::FsMover,
        &NoProgress,
    );
    assert_eq!(report.moved, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, 0);

    let root = dirs.folder.path();
    assert!(root.join("Financial").join("bill.txt").exists());
    assert!(root.join("Health").join("misc.txt").exists());
    assert!(root.join("raw.bin").exists());
}
