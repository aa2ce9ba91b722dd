use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use workq_persist::{SqliteConfig, SqliteJobStore};
use workq_queue::{
    Dispatcher, Job, JobStatus, JobStore, NewJob, QueueConfig, StoreError, WorkError, Worker,
};

async fn memory_store() -> SqliteJobStore {
    SqliteJobStore::connect(&SqliteConfig::memory())
        .await
        .expect("in-memory database should migrate")
}

#[tokio::test]
async fn test_create_and_get_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let store = memory_store().await;
    let parent = store.create(NewJob::new("graph", b"parent".to_vec())).await?;

    let new = NewJob::with_json_payload("graph", &json!({"swidtag": "P1", "scope": "FR"}))?
        .with_metadata(b"authorization=bearer".to_vec())
        .with_parent(parent);
    let id = store.create(new).await?;

    let job = store.get(id).await?;
    assert_eq!(job.id, id);
    assert_eq!(job.worker_type, "graph");
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.retry_count, 0);
    assert_eq!(job.metadata, b"authorization=bearer");
    assert_eq!(job.parent_id, Some(parent));
    assert!(job.started_at.is_none());
    let payload: serde_json::Value = job.payload_json()?;
    assert_eq!(payload["swidtag"], "P1");

    let all = store.get_all().await?;
    assert_eq!(all.iter().map(|j| j.id).collect::<Vec<_>>(), vec![parent, id]);
    Ok(())
}

#[tokio::test]
async fn test_status_transitions() -> Result<(), Box<dyn std::error::Error>> {
    let store = memory_store().await;
    let id = store.create(NewJob::new("graph", vec![])).await?;

    store.set_running(id).await?;
    store.set_retry(id, Some("dgraph unavailable".into())).await?;
    let job = store.get(id).await?;
    assert_eq!(job.status, JobStatus::Retry);
    assert_eq!(job.retry_count, 1);
    assert_eq!(job.last_error.as_deref(), Some("dgraph unavailable"));
    assert!(job.started_at.is_some());

    store.set_running(id).await?;
    store.set_failed(id, None).await?;
    let job = store.get(id).await?;
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.ended_at.is_some());
    assert_eq!(job.last_error.as_deref(), Some("dgraph unavailable"));

    let err = store.set_running(id).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::InvalidTransition {
            from: JobStatus::Failed,
            to: JobStatus::Running,
            ..
        }
    ));
    Ok(())
}

#[tokio::test]
async fn test_missing_job_is_not_found() {
    let store = memory_store().await;
    let id = uuid::Uuid::new_v4();
    assert!(matches!(store.get(id).await, Err(StoreError::NotFound(_))));
    assert!(matches!(
        store.set_completed(id).await,
        Err(StoreError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_corrupt_retry_count_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let store = memory_store().await;
    let id = store.create(NewJob::new("graph", vec![])).await?;
    sqlx::query("UPDATE jobs SET retry_count = -1 WHERE id = ?")
        .bind(id.to_string())
        .execute(store.pool())
        .await?;

    assert!(matches!(
        store.get(id).await,
        Err(StoreError::Serialization(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_list_unfinished_skips_terminal_jobs() -> Result<(), Box<dyn std::error::Error>> {
    let store = memory_store().await;
    let pending = store.create(NewJob::new("graph", vec![])).await?;
    let running = store.create(NewJob::new("graph", vec![])).await?;
    let completed = store.create(NewJob::new("graph", vec![])).await?;
    store.set_running(running).await?;
    store.set_running(completed).await?;
    store.set_completed(completed).await?;

    let unfinished: Vec<_> = store.list_unfinished().await?.into_iter().map(|j| j.id).collect();
    assert_eq!(unfinished, vec![pending, running]);
    Ok(())
}

struct EchoWorker;

#[async_trait::async_trait]
impl Worker for EchoWorker {
    fn id(&self) -> &str {
        "echo"
    }

    async fn do_work(&self, _ctx: CancellationToken, job: &Job) -> Result<(), WorkError> {
        let _: serde_json::Value = job.payload_json()?;
        Ok(())
    }
}

#[tokio::test]
async fn test_dispatcher_recovers_from_sqlite() -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(memory_store().await);
    let config = QueueConfig {
        poll_interval: Duration::from_millis(10),
        ..Default::default()
    };

    // Left behind by a previous run that died mid-job
    let interrupted = store.create(NewJob::new("echo", b"{}".to_vec())).await?;
    store.set_running(interrupted).await?;
    let garbage = store.create(NewJob::new("echo", b"not json".to_vec())).await?;

    let dispatcher = Dispatcher::new("sqlite-test", store.clone(), config);
    dispatcher
        .register_worker(CancellationToken::new(), Arc::new(EchoWorker))
        .await;
    assert_eq!(dispatcher.resume_pending_jobs().await?, 2);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let a = store.get(interrupted).await?.status;
        let b = store.get(garbage).await?.status;
        if a.is_terminal() && b.is_terminal() {
            assert_eq!(a, JobStatus::Completed);
            assert_eq!(b, JobStatus::Failed);
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "jobs did not finish");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    dispatcher.close(CancellationToken::new()).await?;
    Ok(())
}
