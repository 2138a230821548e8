//! Job id and job name detection from batch scheduler environments.
//!
//! SLURM is checked first, then PBS. The job name doubles as the table
//! name, so every job of a family records into the same table.

use tracing::debug;

use crate::{Error, Result, value::JobId};

struct Scheduler {
  name:     &'static str,
  job_id:   &'static str,
  job_name: &'static str,
}

const SCHEDULERS: &[Scheduler] = &[
  Scheduler { name: "slurm", job_id: "SLURM_JOB_ID", job_name: "SLURM_JOB_NAME" },
  Scheduler { name: "pbs", job_id: "PBS_JOBID", job_name: "PBS_JOBNAME" },
];

fn from_process(key: &str) -> Option<String> {
  std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Id of the running job.
pub fn job_id() -> Result<JobId> { job_id_from(from_process) }

/// Name of the running job, used as the table name.
pub fn table_name() -> Result<String> { table_name_from(from_process) }

/// [`job_id`] with variables looked up through `env`.
pub fn job_id_from(env: impl Fn(&str) -> Option<String>) -> Result<JobId> {
  for scheduler in SCHEDULERS {
    let Some(raw) = env(scheduler.job_id) else {
      continue;
    };
    // PBS ids carry the server name: `1234.head-node`.
    let digits = raw.split('.').next().unwrap_or_default().trim();
    let id = digits.parse::<JobId>().map_err(|_| {
      Error::Detect(format!("{} job id {raw:?} is not an integer", scheduler.name))
    })?;
    debug!(scheduler = scheduler.name, id, "detected job id");
    return Ok(id);
  }
  Err(Error::Detect("no scheduler job id found (SLURM_JOB_ID, PBS_JOBID)".into()))
}

/// [`table_name`] with variables looked up through `env`.
pub fn table_name_from(env: impl Fn(&str) -> Option<String>) -> Result<String> {
  for scheduler in SCHEDULERS {
    if let Some(name) = env(scheduler.job_name) {
      debug!(scheduler = scheduler.name, %name, "detected table name");
      return Ok(name);
    }
  }
  Err(Error::Detect("no scheduler job name found (SLURM_JOB_NAME, PBS_JOBNAME)".into()))
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use super::*;

  fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
      .iter()
      .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
      .collect();
    move |key| vars.get(key).cloned()
  }

  #[test]
  fn slurm_takes_precedence() {
    let vars = env(&[
      ("SLURM_JOB_ID", "42"),
      ("SLURM_JOB_NAME", "sweep"),
      ("PBS_JOBID", "7.head"),
      ("PBS_JOBNAME", "other"),
    ]);
    assert_eq!(job_id_from(&vars).unwrap(), 42);
    assert_eq!(table_name_from(&vars).unwrap(), "sweep");
  }

  #[test]
  fn pbs_ids_drop_the_server_suffix() {
    let vars = env(&[("PBS_JOBID", "1234.head-node"), ("PBS_JOBNAME", "train")]);
    assert_eq!(job_id_from(&vars).unwrap(), 1234);
    assert_eq!(table_name_from(&vars).unwrap(), "train");
  }

  #[test]
  fn non_numeric_id_is_an_error() {
    let err = job_id_from(env(&[("SLURM_JOB_ID", "abc")])).unwrap_err();
    assert!(matches!(err, Error::Detect(_)));
  }

  #[test]
  fn nothing_detected_is_an_error() {
    assert!(matches!(job_id_from(env(&[])), Err(Error::Detect(_))));
    assert!(matches!(table_name_from(env(&[])), Err(Error::Detect(_))));
  }
}
