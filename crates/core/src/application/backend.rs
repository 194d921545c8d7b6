// Job Backend - orchestration-facing operations

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::scripts::{AtomicScript, CreateJob, DeleteJob, IncrProcessed, TakeJob};
use crate::application::sentinel;
use crate::domain::keys::{self, fields};
use crate::domain::marshal::{marshal_conf, marshal_info, unmarshal_conf, unmarshal_info};
use crate::domain::{JobConf, JobConfUpdate, JobInfo, JobInfoUpdate, JobRecord};
use crate::error::{AppError, Result};
use crate::port::{Command, KeyValueStore};

/// Backend-wide counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    pub job_count: u64,
}

/// Job backend
///
/// Stateless apart from the injected store; any number of instances may run
/// against the same store. Cross-record consistency comes only from the
/// atomic scripts, everything else is plain or batched writes.
pub struct JobBackend {
    store: Arc<dyn KeyValueStore>,
}

impl JobBackend {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub(crate) fn store(&self) -> &dyn KeyValueStore {
        self.store.as_ref()
    }

    /// Check that the store answers
    pub async fn health_check(&self) -> Result<()> {
        self.store.ping().await
    }

    pub async fn status(&self) -> Result<BackendStatus> {
        let job_count = self
            .store
            .execute(Command::SortedCard {
                key: keys::JOB_IDS.to_string(),
            })
            .await?
            .into_int()?;

        Ok(BackendStatus {
            job_count: job_count.max(0) as u64,
        })
    }

    /// Queue a new job
    ///
    /// Records, index entry and queue push land in one atomic scope; a
    /// colliding id never touches the existing job's records.
    pub async fn create_job(&self, job_id: &str, conf: &JobConf, info: &JobInfo) -> Result<()> {
        self.eval(&CreateJob {
            job_id,
            conf: marshal_conf(&JobConfUpdate::from(conf))?,
            info: marshal_info(&JobInfoUpdate::from(info))?,
        })
        .await?;

        info!(job_id = %job_id, job_type = %conf.job_type, "Job created");
        Ok(())
    }

    /// Overwrite conf and info of an existing job
    pub async fn start_job(&self, job_id: &str, conf: &JobConf, info: &JobInfo) -> Result<()> {
        let mut batch = Vec::with_capacity(2);
        batch.extend(info_update(job_id, &JobInfoUpdate::from(info))?);
        batch.extend(conf_update(job_id, &JobConfUpdate::from(conf))?);
        self.store.execute_batch(batch).await?;

        debug!(job_id = %job_id, status = %info.status, "Job started");
        Ok(())
    }

    /// Claim the oldest queued job, `None` when the queue is empty
    pub async fn take_job(&self, orchestrator_id: &str) -> Result<Option<JobRecord>> {
        let Some(taken) = self.eval(&TakeJob { orchestrator_id }).await? else {
            return Ok(None);
        };

        info!(
            orchestrator_id = %orchestrator_id,
            job_id = %taken.job_id,
            "Job claimed"
        );

        Ok(Some(JobRecord {
            conf: unmarshal_conf(&taken.conf)?,
            info: unmarshal_info(&taken.info)?,
            job_id: taken.job_id,
        }))
    }

    /// Record one dispatched task
    pub async fn incr_sent(
        &self,
        job_id: &str,
        task_id: &str,
        updates: &JobInfoUpdate,
    ) -> Result<()> {
        let mut batch = vec![
            Command::HashIncrBy {
                key: keys::job_info(job_id),
                field: fields::info::SENT.to_string(),
                delta: 1,
            },
            Command::SetAdd {
                key: keys::job_tasks(job_id),
                member: task_id.to_string(),
            },
        ];
        batch.extend(info_update(job_id, updates)?);
        self.store.execute_batch(batch).await?;

        debug!(job_id = %job_id, task_id = %task_id, "Task sent");
        Ok(())
    }

    /// Record that the producer will send no more tasks
    ///
    /// `is_finished` releases the job from the orchestrator when the producer
    /// already knows nothing is left to process (e.g. zero tasks).
    pub async fn all_sent(
        &self,
        orchestrator_id: &str,
        job_id: &str,
        updates: &JobInfoUpdate,
        is_finished: bool,
    ) -> Result<()> {
        let mut batch = Vec::with_capacity(2);
        batch.extend(info_update(job_id, updates)?);
        if is_finished {
            batch.push(Command::SetRemove {
                key: keys::orchestrator_jobs(orchestrator_id),
                member: job_id.to_string(),
            });
        }
        self.store.execute_batch(batch).await?;

        debug!(
            orchestrator_id = %orchestrator_id,
            job_id = %job_id,
            is_finished,
            "All tasks sent"
        );
        Ok(())
    }

    /// Record one acknowledged task, successful or not
    ///
    /// Returns `true` on the single call that completes the job; that call
    /// also moves the job to FINISHED and releases it from the orchestrator.
    pub async fn incr_processed(
        &self,
        orchestrator_id: &str,
        job_id: &str,
        task_id: &str,
        error: bool,
        updates: &JobInfoUpdate,
    ) -> Result<bool> {
        let finished = self
            .eval(&IncrProcessed {
                orchestrator_id,
                job_id,
                error_increment: i64::from(error),
            })
            .await?;

        let mut batch = vec![Command::SetRemove {
            key: keys::job_tasks(job_id),
            member: task_id.to_string(),
        }];
        batch.extend(info_update(job_id, updates)?);
        self.store.execute_batch(batch).await?;

        if finished {
            info!(orchestrator_id = %orchestrator_id, job_id = %job_id, "Job finished");
        } else {
            debug!(job_id = %job_id, task_id = %task_id, error, "Task processed");
        }
        Ok(finished)
    }

    /// Detach a job from an orchestrator that gives up on it
    ///
    /// The job is not re-queued and its status only changes if `updates`
    /// says so.
    pub async fn fail_job(
        &self,
        orchestrator_id: &str,
        job_id: &str,
        updates: &JobInfoUpdate,
    ) -> Result<()> {
        let mut batch = vec![Command::SetRemove {
            key: keys::orchestrator_jobs(orchestrator_id),
            member: job_id.to_string(),
        }];
        batch.extend(info_update(job_id, updates)?);
        self.store.execute_batch(batch).await?;

        warn!(
            orchestrator_id = %orchestrator_id,
            job_id = %job_id,
            status = ?updates.status,
            "Job released by orchestrator"
        );
        Ok(())
    }

    pub async fn get_job_conf(&self, job_id: &str) -> Result<JobConf> {
        let record = self
            .store
            .execute(Command::HashGetAll {
                key: keys::job_conf(job_id),
            })
            .await?
            .into_record()?;
        if record.is_empty() {
            return Err(job_not_found(job_id));
        }

        Ok(unmarshal_conf(&record)?)
    }

    pub async fn get_job_info(&self, job_id: &str) -> Result<JobInfo> {
        let record = self
            .store
            .execute(Command::HashGetAll {
                key: keys::job_info(job_id),
            })
            .await?
            .into_record()?;
        if record.is_empty() {
            return Err(job_not_found(job_id));
        }

        Ok(unmarshal_info(&record)?)
    }

    /// Job type (from the conf record) and result (from the info record)
    pub async fn get_job_type_and_result(
        &self,
        job_id: &str,
    ) -> Result<(String, serde_json::Value)> {
        let replies = self
            .store
            .execute_batch(vec![
                Command::HashGet {
                    key: keys::job_conf(job_id),
                    field: fields::conf::JOB_TYPE.to_string(),
                },
                Command::HashGetAll {
                    key: keys::job_info(job_id),
                },
            ])
            .await?;
        let mut replies = replies.into_iter();
        let job_type = next_reply(&mut replies)?.into_value()?;
        let info = next_reply(&mut replies)?.into_record()?;

        match job_type {
            Some(job_type) if !info.is_empty() => Ok((job_type, unmarshal_info(&info)?.result)),
            _ => Err(job_not_found(job_id)),
        }
    }

    pub async fn update_job_conf(&self, job_id: &str, updates: &JobConfUpdate) -> Result<()> {
        if let Some(command) = conf_update(job_id, updates)? {
            self.store.execute(command).await?;
        }
        Ok(())
    }

    pub async fn update_job_info(&self, job_id: &str, updates: &JobInfoUpdate) -> Result<()> {
        if let Some(command) = info_update(job_id, updates)? {
            self.store.execute(command).await?;
        }
        Ok(())
    }

    /// Destroy a WAITING, PAUSED or FINISHED job
    pub async fn delete_job(&self, job_id: &str) -> Result<()> {
        self.eval(&DeleteJob { job_id }).await?;

        info!(job_id = %job_id, "Job deleted");
        Ok(())
    }

    /// Run a script in its own atomic scope, translating failure replies
    async fn eval<S: AtomicScript>(&self, script: &S) -> Result<S::Output> {
        let mut tx = self.store.begin_atomic().await?;
        let outcome = script.run(tx.as_mut()).await;

        match outcome {
            Ok(Ok(output)) => {
                tx.commit().await?;
                Ok(output)
            }
            Ok(Err(abort)) => {
                tx.rollback().await?;
                debug!(script = script.name(), reply = %abort.0, "Script aborted");
                Err(sentinel::translate(abort))
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(
                        script = script.name(),
                        error = %rollback_err,
                        "Rollback after script failure failed"
                    );
                }
                Err(e)
            }
        }
    }
}

/// Merge-write of an info update, `None` when there is nothing to write
fn info_update(job_id: &str, updates: &JobInfoUpdate) -> Result<Option<Command>> {
    let fields = marshal_info(updates)?;
    Ok((!fields.is_empty()).then(|| Command::HashSet {
        key: keys::job_info(job_id),
        fields,
    }))
}

fn conf_update(job_id: &str, updates: &JobConfUpdate) -> Result<Option<Command>> {
    let fields = marshal_conf(updates)?;
    Ok((!fields.is_empty()).then(|| Command::HashSet {
        key: keys::job_conf(job_id),
        fields,
    }))
}

pub(crate) fn next_reply(
    replies: &mut impl Iterator<Item = crate::port::Reply>,
) -> Result<crate::port::Reply> {
    replies
        .next()
        .ok_or_else(|| AppError::Store("batch returned fewer replies than commands".to_string()))
}

fn job_not_found(job_id: &str) -> AppError {
    AppError::NotFound(format!("Job {} not found", job_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Record;
    use crate::port::{MockKeyValueStore, Reply, StoreTransaction, Transaction};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Transaction answering from a fixed list of replies
    struct ScriptedTx {
        replies: VecDeque<Reply>,
        committed: Arc<AtomicBool>,
        rolled_back: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transaction for ScriptedTx {
        async fn commit(self: Box<Self>) -> Result<()> {
            self.committed.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<()> {
            self.rolled_back.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl StoreTransaction for ScriptedTx {
        async fn execute(&mut self, _command: Command) -> Result<Reply> {
            self.replies
                .pop_front()
                .ok_or_else(|| AppError::Store("no scripted reply".to_string()))
        }
    }

    fn scripted_store(
        replies: Vec<Reply>,
    ) -> (MockKeyValueStore, Arc<AtomicBool>, Arc<AtomicBool>) {
        let committed = Arc::new(AtomicBool::new(false));
        let rolled_back = Arc::new(AtomicBool::new(false));
        let replies = Mutex::new(Some(replies));

        let mut store = MockKeyValueStore::new();
        let (c, r) = (committed.clone(), rolled_back.clone());
        store.expect_begin_atomic().times(1).returning(move || {
            let replies = replies.lock().unwrap().take().unwrap_or_default();
            Ok(Box::new(ScriptedTx {
                replies: replies.into(),
                committed: c.clone(),
                rolled_back: r.clone(),
            }) as Box<dyn StoreTransaction>)
        });
        (store, committed, rolled_back)
    }

    #[tokio::test]
    async fn test_get_job_info_on_missing_record_is_not_found() {
        let mut store = MockKeyValueStore::new();
        store
            .expect_execute()
            .withf(|cmd| matches!(cmd, Command::HashGetAll { key } if key == "taskmill:job:info:ghost"))
            .returning(|_| Ok(Reply::Record(Record::new())));

        let backend = JobBackend::new(Arc::new(store));
        let err = backend.get_job_info("ghost").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_status_reports_index_cardinality() {
        let mut store = MockKeyValueStore::new();
        store
            .expect_execute()
            .withf(|cmd| matches!(cmd, Command::SortedCard { .. }))
            .returning(|_| Ok(Reply::Int(7)));

        let backend = JobBackend::new(Arc::new(store));
        assert_eq!(backend.status().await.unwrap(), BackendStatus { job_count: 7 });
    }

    #[tokio::test]
    async fn test_store_failure_propagates_unmodified() {
        let mut store = MockKeyValueStore::new();
        store
            .expect_ping()
            .returning(|| Err(AppError::Store("connection refused".to_string())));

        let backend = JobBackend::new(Arc::new(store));
        match backend.health_check().await {
            Err(AppError::Store(msg)) => assert_eq!(msg, "connection refused"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_update_skips_the_write() {
        // No expectations: any store call would panic.
        let backend = JobBackend::new(Arc::new(MockKeyValueStore::new()));
        backend
            .update_job_info("job-1", &JobInfoUpdate::default())
            .await
            .unwrap();
        backend
            .update_job_conf("job-1", &JobConfUpdate::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_collision_rolls_back_and_writes_nothing() {
        // Exists -> 1; no execute_batch expectation, so record writes would panic.
        let (store, committed, rolled_back) = scripted_store(vec![Reply::Int(1)]);
        let backend = JobBackend::new(Arc::new(store));

        let err = backend
            .create_job(
                "job-1",
                &JobConf::new("noop", serde_json::json!({})),
                &JobInfo::waiting(None),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::AlreadyExists(_)));
        assert!(rolled_back.load(Ordering::SeqCst));
        assert!(!committed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_create_writes_everything_inside_the_scope() {
        // Exists -> 0, then info, conf, index and queue writes. No execute_batch
        // expectation, so any write outside the scope would panic.
        let (store, committed, rolled_back) = scripted_store(vec![
            Reply::Int(0),
            Reply::Ok,
            Reply::Ok,
            Reply::Int(1),
            Reply::Int(1),
        ]);
        let backend = JobBackend::new(Arc::new(store));

        backend
            .create_job(
                "job-1",
                &JobConf::new("noop", serde_json::json!({})),
                &JobInfo::waiting(Some(3)),
            )
            .await
            .unwrap();

        assert!(committed.load(Ordering::SeqCst));
        assert!(!rolled_back.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_take_job_on_empty_queue_commits_and_returns_none() {
        let (store, committed, _) = scripted_store(vec![Reply::Value(None)]);
        let backend = JobBackend::new(Arc::new(store));

        assert!(backend.take_job("orc-1").await.unwrap().is_none());
        assert!(committed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_store_error_inside_script_rolls_back() {
        // The scripted transaction runs dry on the first command.
        let (store, committed, rolled_back) = scripted_store(vec![]);
        let backend = JobBackend::new(Arc::new(store));

        let err = backend.delete_job("job-1").await.unwrap_err();
        assert!(matches!(err, AppError::Store(_)));
        assert!(rolled_back.load(Ordering::SeqCst));
        assert!(!committed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_delete_running_job_is_invalid_state() {
        let (store, _, rolled_back) =
            scripted_store(vec![Reply::Value(Some("RUNNING".to_string()))]);
        let backend = JobBackend::new(Arc::new(store));

        let err = backend.delete_job("job-1").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidState(_)));
        assert!(rolled_back.load(Ordering::SeqCst));
    }
}
