// Marshalling between typed job records and flat string records

use std::collections::BTreeMap;

use crate::domain::error::{DomainError, Result};
use crate::domain::job::{JobConf, JobConfUpdate, JobInfo, JobInfoUpdate, JobStatus};
use crate::domain::keys::fields;
use crate::error::AppError;

/// Flat field -> value mapping, the only shape the store persists.
pub type Record = BTreeMap<String, String>;

/// Flattened fields to merge into a record, in write order
pub type Fields = Vec<(String, String)>;

pub fn marshal_conf(update: &JobConfUpdate) -> std::result::Result<Fields, AppError> {
    let mut out = Fields::new();
    if let Some(job_type) = &update.job_type {
        out.push((fields::conf::JOB_TYPE.to_string(), job_type.clone()));
    }
    if let Some(params) = &update.params {
        out.push((fields::conf::PARAMS.to_string(), to_json(params)?));
    }
    Ok(out)
}

pub fn unmarshal_conf(record: &Record) -> Result<JobConf> {
    let job_type = required(record, "config", fields::conf::JOB_TYPE)?.to_string();
    let params = from_json(
        fields::conf::PARAMS,
        required(record, "config", fields::conf::PARAMS)?,
    )?;

    Ok(JobConf { job_type, params })
}

pub fn marshal_info(update: &JobInfoUpdate) -> std::result::Result<Fields, AppError> {
    use fields::info;

    let mut out = Fields::new();
    if let Some(status) = update.status {
        out.push((info::STATUS.to_string(), status.to_string()));
    }
    if let Some(sent) = update.sent {
        out.push((info::SENT.to_string(), sent.to_string()));
    }
    if let Some(processed) = update.processed {
        out.push((info::PROCESSED.to_string(), processed.to_string()));
    }
    if let Some(errors) = update.errors {
        out.push((info::ERRORS.to_string(), errors.to_string()));
    }
    // Absent total is never written: "unknown cap" must not become "cap 0".
    if let Some(total) = update.total {
        out.push((info::TOTAL.to_string(), total.to_string()));
    }
    if let Some(all_sent) = update.all_sent {
        out.push((info::ALL_SENT.to_string(), encode_bool(all_sent).to_string()));
    }
    if let Some(result) = &update.result {
        out.push((info::RESULT.to_string(), to_json(result)?));
    }
    Ok(out)
}

pub fn unmarshal_info(record: &Record) -> Result<JobInfo> {
    use fields::info;

    let status: JobStatus = required(record, "info", info::STATUS)?.parse()?;
    let total = record
        .get(info::TOTAL)
        .map(|value| parse_counter(info::TOTAL, value))
        .transpose()?;

    Ok(JobInfo {
        status,
        sent: parse_counter(info::SENT, required(record, "info", info::SENT)?)?,
        processed: parse_counter(info::PROCESSED, required(record, "info", info::PROCESSED)?)?,
        errors: parse_counter(info::ERRORS, required(record, "info", info::ERRORS)?)?,
        total,
        all_sent: decode_bool(required(record, "info", info::ALL_SENT)?),
        result: from_json(info::RESULT, required(record, "info", info::RESULT)?)?,
    })
}

/// Booleans are stored as integers so scripts can compare them directly.
pub fn encode_bool(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

pub fn decode_bool(value: &str) -> bool {
    value == "1"
}

pub fn parse_counter(field: &'static str, value: &str) -> Result<u64> {
    value.parse().map_err(|_| DomainError::InvalidField {
        field,
        value: value.to_string(),
    })
}

fn required<'a>(record: &'a Record, name: &'static str, field: &'static str) -> Result<&'a str> {
    record
        .get(field)
        .map(String::as_str)
        .ok_or(DomainError::MissingField {
            record: name,
            field,
        })
}

fn to_json(value: &serde_json::Value) -> std::result::Result<String, AppError> {
    Ok(serde_json::to_string(value)?)
}

fn from_json(field: &'static str, raw: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw).map_err(|_| DomainError::InvalidField {
        field,
        value: raw.to_string(),
    })
}
