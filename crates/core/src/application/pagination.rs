// Job listings: paginated index walk and per-orchestrator views

use tracing::debug;

use crate::application::backend::{next_reply, JobBackend};
use crate::domain::keys;
use crate::domain::marshal::{unmarshal_conf, unmarshal_info};
use crate::domain::{JobRecord, JobSummary, Record};
use crate::error::Result;
use crate::port::Command;

/// Page size used when the caller gives none (or zero)
pub const DEFAULT_LIMIT: usize = 1000;

impl JobBackend {
    /// List jobs in strictly descending id order, starting below `marker`
    ///
    /// Ids whose info record is gone (deleted concurrently, or dangling) are
    /// skipped and the walk continues, so fewer than `limit` jobs are only
    /// returned once the index is exhausted. An empty marker lists from the top.
    pub async fn list_jobs(
        &self,
        marker: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<JobSummary>> {
        let limit = match limit {
            Some(limit) if limit > 0 => limit,
            _ => DEFAULT_LIMIT,
        };

        let mut marker = marker.filter(|m| !m.is_empty()).map(str::to_string);
        let mut jobs = Vec::new();
        loop {
            let wanted = limit - jobs.len();
            if wanted == 0 {
                break;
            }

            let job_ids = self
                .store()
                .execute(Command::SortedRevRangeBelow {
                    key: keys::JOB_IDS.to_string(),
                    below: marker.clone(),
                    limit: wanted,
                })
                .await?
                .into_members()?;

            let infos = self
                .store()
                .execute_batch(
                    job_ids
                        .iter()
                        .map(|job_id| Command::HashGetAll {
                            key: keys::job_info(job_id),
                        })
                        .collect(),
                )
                .await?;

            let mut infos = infos.into_iter();
            for job_id in &job_ids {
                let info = next_reply(&mut infos)?.into_record()?;
                if info.is_empty() {
                    debug!(job_id = %job_id, "Skipping indexed job without info record");
                    continue;
                }
                jobs.push(JobSummary {
                    job_id: job_id.clone(),
                    info: unmarshal_info(&info)?,
                });
            }

            if job_ids.len() < wanted {
                break;
            }
            marker = job_ids.last().cloned();
        }

        Ok(jobs)
    }

    /// Jobs currently claimed by an orchestrator
    ///
    /// Records are fetched up front; unmarshalling happens as the iterator is
    /// consumed. Ids whose records are missing are skipped.
    pub async fn list_orchestrator_jobs(&self, orchestrator_id: &str) -> Result<OrchestratorJobs> {
        let job_ids = self
            .store()
            .execute(Command::SetMembers {
                key: keys::orchestrator_jobs(orchestrator_id),
            })
            .await?
            .into_members()?;

        let commands = job_ids
            .iter()
            .flat_map(|job_id| {
                [
                    Command::HashGetAll {
                        key: keys::job_conf(job_id),
                    },
                    Command::HashGetAll {
                        key: keys::job_info(job_id),
                    },
                ]
            })
            .collect();
        let mut replies = self.store().execute_batch(commands).await?.into_iter();

        let mut entries = Vec::with_capacity(job_ids.len());
        for job_id in job_ids {
            let conf = next_reply(&mut replies)?.into_record()?;
            let info = next_reply(&mut replies)?.into_record()?;
            entries.push((job_id, conf, info));
        }

        Ok(OrchestratorJobs {
            entries: entries.into_iter(),
        })
    }
}

/// Lazily unmarshalled jobs of one orchestrator
pub struct OrchestratorJobs {
    entries: std::vec::IntoIter<(String, Record, Record)>,
}

impl Iterator for OrchestratorJobs {
    type Item = Result<JobRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        for (job_id, conf, info) in self.entries.by_ref() {
            if conf.is_empty() || info.is_empty() {
                debug!(job_id = %job_id, "Skipping claimed job without records");
                continue;
            }

            let record = unmarshal_conf(&conf)
                .and_then(|conf| Ok((conf, unmarshal_info(&info)?)))
                .map(|(conf, info)| JobRecord { job_id, conf, info })
                .map_err(Into::into);
            return Some(record);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::{MockKeyValueStore, Reply};
    use std::sync::Arc;

    fn info_record(status: &str) -> Record {
        [
            ("status", status),
            ("sent", "0"),
            ("processed", "0"),
            ("errors", "0"),
            ("all_sent", "0"),
            ("result", "null"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn conf_record() -> Record {
        [("job_type", "noop"), ("params", "{}")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_list_jobs_refills_after_skipped_entries() {
        let mut store = MockKeyValueStore::new();
        store
            .expect_execute()
            .withf(|cmd| {
                matches!(cmd, Command::SortedRevRangeBelow { below: None, limit: 2, .. })
            })
            .times(1)
            .returning(|_| Ok(Reply::Members(vec!["d".into(), "c".into()])));
        store
            .expect_execute()
            .withf(|cmd| {
                matches!(cmd, Command::SortedRevRangeBelow { below: Some(m), limit: 1, .. } if m == "c")
            })
            .times(1)
            .returning(|_| Ok(Reply::Members(vec!["b".into()])));
        let mut batches = 0;
        store.expect_execute_batch().times(2).returning(move |cmds| {
            batches += 1;
            Ok(match batches {
                // "c" lost its info record
                1 => vec![
                    Reply::Record(info_record("WAITING")),
                    Reply::Record(Record::new()),
                ],
                _ => {
                    assert_eq!(cmds.len(), 1);
                    vec![Reply::Record(info_record("FINISHED"))]
                }
            })
        });

        let backend = JobBackend::new(Arc::new(store));
        let jobs = backend.list_jobs(None, Some(2)).await.unwrap();
        let ids: Vec<_> = jobs.iter().map(|j| j.job_id.as_str()).collect();
        assert_eq!(ids, vec!["d", "b"]);
    }

    #[tokio::test]
    async fn test_list_jobs_stops_when_index_exhausted() {
        let mut store = MockKeyValueStore::new();
        store
            .expect_execute()
            .times(1)
            .returning(|_| Ok(Reply::Members(vec!["a".into()])));
        store
            .expect_execute_batch()
            .times(1)
            .returning(|_| Ok(vec![Reply::Record(info_record("WAITING"))]));

        let backend = JobBackend::new(Arc::new(store));
        let jobs = backend.list_jobs(Some("b"), None).await.unwrap();
        assert_eq!(jobs.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_marker_lists_from_the_top() {
        let mut store = MockKeyValueStore::new();
        store
            .expect_execute()
            .withf(|cmd| matches!(cmd, Command::SortedRevRangeBelow { below: None, .. }))
            .times(1)
            .returning(|_| Ok(Reply::Members(vec!["b".into(), "a".into()])));
        store.expect_execute_batch().times(1).returning(|_| {
            Ok(vec![
                Reply::Record(info_record("WAITING")),
                Reply::Record(info_record("FINISHED")),
            ])
        });

        let backend = JobBackend::new(Arc::new(store));
        let jobs = backend.list_jobs(Some(""), None).await.unwrap();
        let ids: Vec<_> = jobs.iter().map(|job| job.job_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_orchestrator_jobs_skip_dangling_ids() {
        let mut store = MockKeyValueStore::new();
        store
            .expect_execute()
            .returning(|_| Ok(Reply::Members(vec!["gone".into(), "live".into()])));
        store.expect_execute_batch().returning(|cmds| {
            assert_eq!(cmds.len(), 4);
            Ok(vec![
                Reply::Record(Record::new()),
                Reply::Record(Record::new()),
                Reply::Record(conf_record()),
                Reply::Record(info_record("RUNNING")),
            ])
        });

        let backend = JobBackend::new(Arc::new(store));
        let jobs: Vec<JobRecord> = backend
            .list_orchestrator_jobs("orc-1")
            .await
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].job_id, "live");
        assert_eq!(jobs[0].conf.job_type, "noop");
    }
}
