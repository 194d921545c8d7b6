//! Paginated listing over the job index

use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use taskmill_core::application::DEFAULT_LIMIT;
use taskmill_core::domain::keys;
use taskmill_core::domain::{JobConf, JobInfo, JobInfoUpdate, JobStatus};
use taskmill_core::port::{Command, KeyValueStore};
use taskmill_core::JobBackend;
use taskmill_infra_sqlite::{SqliteStore, StoreConfig};

async fn setup_backend_with_jobs(count: usize) -> JobBackend {
    let store = SqliteStore::connect(&StoreConfig::in_memory())
        .await
        .unwrap();
    let backend = JobBackend::new(Arc::new(store));

    for i in 0..count {
        backend
            .create_job(
                &format!("job-{:03}", i),
                &JobConf::new("noop", json!({ "i": i })),
                &JobInfo::waiting(None),
            )
            .await
            .unwrap();
    }
    backend
}

#[tokio::test]
async fn test_pages_walk_the_index_without_repeats() {
    let backend = setup_backend_with_jobs(25).await;

    let mut seen = Vec::new();
    let mut marker: Option<String> = None;
    loop {
        let page = backend.list_jobs(marker.as_deref(), Some(10)).await.unwrap();
        seen.extend(page.iter().map(|job| job.job_id.clone()));
        if page.len() < 10 {
            break;
        }
        marker = page.last().map(|job| job.job_id.clone());
    }

    assert_eq!(seen.len(), 25);
    assert!(seen.windows(2).all(|w| w[0] > w[1]), "strictly descending");
    assert_eq!(seen.iter().collect::<HashSet<_>>().len(), 25);
    assert_eq!(seen.first().map(String::as_str), Some("job-024"));
    assert_eq!(seen.last().map(String::as_str), Some("job-000"));
}

#[tokio::test]
async fn test_marker_is_exclusive() {
    let backend = setup_backend_with_jobs(5).await;

    let page = backend.list_jobs(Some("job-003"), None).await.unwrap();
    let ids: Vec<_> = page.iter().map(|job| job.job_id.as_str()).collect();
    assert_eq!(ids, vec!["job-002", "job-001", "job-000"]);

    // A marker that is not itself indexed still bounds the range
    let page = backend.list_jobs(Some("job-0025"), None).await.unwrap();
    assert_eq!(page[0].job_id, "job-002");
}

#[tokio::test]
async fn test_zero_limit_means_default_page() {
    let backend = setup_backend_with_jobs(3).await;
    assert!(DEFAULT_LIMIT >= 3);

    let all = backend.list_jobs(None, Some(0)).await.unwrap();
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn test_full_page_despite_dangling_index_entries() {
    let store = Arc::new(
        SqliteStore::connect(&StoreConfig::in_memory())
            .await
            .unwrap(),
    );
    let backend = JobBackend::new(store.clone());
    for i in 0..8 {
        backend
            .create_job(
                &format!("job-{:03}", i),
                &JobConf::new("noop", json!(null)),
                &JobInfo::waiting(None),
            )
            .await
            .unwrap();
    }
    // Indexed ids whose info record is gone
    for job_id in ["job-007", "job-006", "job-004"] {
        store
            .execute(Command::Delete {
                key: keys::job_info(job_id),
            })
            .await
            .unwrap();
    }

    let page = backend.list_jobs(None, Some(4)).await.unwrap();
    let ids: Vec<_> = page.iter().map(|job| job.job_id.as_str()).collect();
    assert_eq!(ids, vec!["job-005", "job-003", "job-002", "job-001"]);

    let rest = backend.list_jobs(Some("job-001"), Some(4)).await.unwrap();
    assert_eq!(rest.len(), 1, "short page only once the index is exhausted");
}

#[tokio::test]
async fn test_summaries_carry_info() {
    let backend = setup_backend_with_jobs(1).await;
    backend
        .update_job_info("job-000", &JobInfoUpdate::default().with_total(9))
        .await
        .unwrap();

    let page = backend.list_jobs(None, Some(1)).await.unwrap();
    assert_eq!(page[0].info.total, Some(9));
    assert_eq!(page[0].info.status, JobStatus::Waiting);
}
