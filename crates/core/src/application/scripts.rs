// Atomic scripts
//
// Each script combines a conditional check with mutations across several
// records. They only ever run inside a StoreTransaction, so concurrent
// instances of any script observe each other as fully applied or not at all.

use async_trait::async_trait;

use crate::application::sentinel::{ScriptResult, Sentinel};
use crate::domain::keys::{self, fields};
use crate::domain::marshal::decode_bool;
use crate::domain::{Fields, JobStatus, Record};
use crate::error::Result;
use crate::port::{Command, StoreTransaction};

/// A server-side procedure run inside one exclusive store scope
///
/// The outer `Result` carries store failures, the inner one the script's own
/// failure reply. Either kind of failure rolls the scope back.
#[async_trait]
pub trait AtomicScript: Send + Sync {
    type Output: Send;

    /// Name used in logs
    fn name(&self) -> &'static str;

    async fn run(&self, tx: &mut dyn StoreTransaction) -> Result<ScriptResult<Self::Output>>;
}

/// Write the records of a new job, then index and enqueue its id
///
/// Nothing is written when a job with the same id already exists.
pub struct CreateJob<'a> {
    pub job_id: &'a str,
    pub conf: Fields,
    pub info: Fields,
}

#[async_trait]
impl<'a> AtomicScript for CreateJob<'a> {
    type Output = ();

    fn name(&self) -> &'static str {
        "create_job"
    }

    async fn run(&self, tx: &mut dyn StoreTransaction) -> Result<ScriptResult<()>> {
        let exists = tx
            .execute(Command::Exists {
                key: keys::job_info(self.job_id),
            })
            .await?
            .into_int()?;
        if exists == 1 {
            return Ok(Err(Sentinel::JobExists.abort()));
        }

        tx.execute(Command::HashSet {
            key: keys::job_info(self.job_id),
            fields: self.info.clone(),
        })
        .await?;
        tx.execute(Command::HashSet {
            key: keys::job_conf(self.job_id),
            fields: self.conf.clone(),
        })
        .await?;
        tx.execute(Command::SortedAdd {
            key: keys::JOB_IDS.to_string(),
            member: self.job_id.to_string(),
        })
        .await?;
        tx.execute(Command::ListPushFront {
            key: keys::JOB_QUEUE.to_string(),
            value: self.job_id.to_string(),
        })
        .await?;

        Ok(Ok(()))
    }
}

/// Raw records of a job claimed by [`TakeJob`]
#[derive(Debug)]
pub struct TakenJob {
    pub job_id: String,
    pub conf: Record,
    pub info: Record,
}

/// Claim the oldest queued job for an orchestrator
pub struct TakeJob<'a> {
    pub orchestrator_id: &'a str,
}

#[async_trait]
impl<'a> AtomicScript for TakeJob<'a> {
    type Output = Option<TakenJob>;

    fn name(&self) -> &'static str {
        "take_job"
    }

    async fn run(&self, tx: &mut dyn StoreTransaction) -> Result<ScriptResult<Option<TakenJob>>> {
        let popped = tx
            .execute(Command::ListPopBack {
                key: keys::JOB_QUEUE.to_string(),
            })
            .await?
            .into_value()?;
        let Some(job_id) = popped else {
            return Ok(Ok(None));
        };

        let conf = tx
            .execute(Command::HashGetAll {
                key: keys::job_conf(&job_id),
            })
            .await?
            .into_record()?;
        let info = tx
            .execute(Command::HashGetAll {
                key: keys::job_info(&job_id),
            })
            .await?
            .into_record()?;

        tx.execute(Command::SetAdd {
            key: keys::orchestrator_jobs(self.orchestrator_id),
            member: job_id.clone(),
        })
        .await?;

        Ok(Ok(Some(TakenJob { job_id, conf, info })))
    }
}

/// Account for one processed task and finish the job if it was the last one
pub struct IncrProcessed<'a> {
    pub orchestrator_id: &'a str,
    pub job_id: &'a str,
    pub error_increment: i64,
}

#[async_trait]
impl<'a> AtomicScript for IncrProcessed<'a> {
    /// `true` exactly when this call completed the job
    type Output = bool;

    fn name(&self) -> &'static str {
        "incr_processed"
    }

    async fn run(&self, tx: &mut dyn StoreTransaction) -> Result<ScriptResult<bool>> {
        let info_key = keys::job_info(self.job_id);

        let exists = tx
            .execute(Command::Exists {
                key: info_key.clone(),
            })
            .await?
            .into_int()?;
        if exists == 0 {
            return Ok(Err(Sentinel::NoJob.abort()));
        }

        let processed = tx
            .execute(Command::HashIncrBy {
                key: info_key.clone(),
                field: fields::info::PROCESSED.to_string(),
                delta: 1,
            })
            .await?
            .into_int()?;
        tx.execute(Command::HashIncrBy {
            key: info_key.clone(),
            field: fields::info::ERRORS.to_string(),
            delta: self.error_increment,
        })
        .await?;

        let values = tx
            .execute(Command::HashMultiGet {
                key: info_key.clone(),
                fields: vec![
                    fields::info::ALL_SENT.to_string(),
                    fields::info::SENT.to_string(),
                ],
            })
            .await?
            .into_values()?;
        let all_sent = values
            .first()
            .and_then(Option::as_deref)
            .is_some_and(decode_bool);
        let sent = values
            .get(1)
            .and_then(Option::as_deref)
            .and_then(|s| s.parse::<i64>().ok());

        if !(all_sent && sent == Some(processed)) {
            return Ok(Ok(false));
        }

        tx.execute(Command::HashSet {
            key: info_key,
            fields: vec![(
                fields::info::STATUS.to_string(),
                JobStatus::Finished.to_string(),
            )],
        })
        .await?;
        tx.execute(Command::SetRemove {
            key: keys::orchestrator_jobs(self.orchestrator_id),
            member: self.job_id.to_string(),
        })
        .await?;

        Ok(Ok(true))
    }
}

/// Remove a job that no orchestrator is running
///
/// A PAUSED job stays referenced from its orchestrator's job set; readers of
/// that set skip ids whose records are gone.
pub struct DeleteJob<'a> {
    pub job_id: &'a str,
}

#[async_trait]
impl<'a> AtomicScript for DeleteJob<'a> {
    type Output = ();

    fn name(&self) -> &'static str {
        "delete_job"
    }

    async fn run(&self, tx: &mut dyn StoreTransaction) -> Result<ScriptResult<()>> {
        let status = tx
            .execute(Command::HashGet {
                key: keys::job_info(self.job_id),
                field: fields::info::STATUS.to_string(),
            })
            .await?
            .into_value()?;
        let Some(status) = status else {
            return Ok(Err(Sentinel::NoJob.abort()));
        };

        let status = match status.parse::<JobStatus>() {
            Ok(status) if status.is_deletable() => status,
            _ => return Ok(Err(Sentinel::MustBeWaitingPausedFinished.abort())),
        };

        if status == JobStatus::Waiting {
            tx.execute(Command::ListRemove {
                key: keys::JOB_QUEUE.to_string(),
                value: self.job_id.to_string(),
                count: 1,
            })
            .await?;
        }

        tx.execute(Command::SortedRemove {
            key: keys::JOB_IDS.to_string(),
            member: self.job_id.to_string(),
        })
        .await?;
        for key in [
            keys::job_info(self.job_id),
            keys::job_conf(self.job_id),
            keys::job_tasks(self.job_id),
        ] {
            tx.execute(Command::Delete { key }).await?;
        }

        Ok(Ok(()))
    }
}
