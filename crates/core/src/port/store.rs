// Key-Value Store Port (Interface)

use crate::domain::{Fields, Record};
use crate::error::{AppError, Result};
use crate::port::transaction::StoreTransaction;
use async_trait::async_trait;

/// A single store primitive
///
/// Sorted sets are lexicographic (every member has the same score), lists are
/// read from the front, sets are unordered.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `Int(1)` if any record is stored under `key`, else `Int(0)`
    Exists { key: String },
    /// Drop whatever is stored under `key`
    Delete { key: String },

    HashGetAll { key: String },
    HashGet { key: String, field: String },
    HashMultiGet { key: String, fields: Vec<String> },
    HashSet { key: String, fields: Fields },
    /// Returns the new value; a missing field counts as 0
    HashIncrBy { key: String, field: String, delta: i64 },

    SortedAdd { key: String, member: String },
    SortedRemove { key: String, member: String },
    SortedCard { key: String },
    /// Members strictly below `below` (or all when `None`), highest first
    SortedRevRangeBelow {
        key: String,
        below: Option<String>,
        limit: usize,
    },

    ListPushFront { key: String, value: String },
    ListPopBack { key: String },
    /// Remove up to `count` entries equal to `value`, starting from the front
    ListRemove {
        key: String,
        value: String,
        count: usize,
    },
    ListLen { key: String },

    SetAdd { key: String, member: String },
    SetRemove { key: String, member: String },
    SetMembers { key: String },
    SetCard { key: String },
}

impl Command {
    /// Whether the command mutates the store
    pub fn is_write(&self) -> bool {
        !matches!(
            self,
            Command::Exists { .. }
                | Command::HashGetAll { .. }
                | Command::HashGet { .. }
                | Command::HashMultiGet { .. }
                | Command::SortedCard { .. }
                | Command::SortedRevRangeBelow { .. }
                | Command::ListLen { .. }
                | Command::SetMembers { .. }
                | Command::SetCard { .. }
        )
    }
}

/// Result of a single store command
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Ok,
    Int(i64),
    Value(Option<String>),
    Values(Vec<Option<String>>),
    Record(Record),
    Members(Vec<String>),
}

impl Reply {
    pub fn into_int(self) -> Result<i64> {
        match self {
            Reply::Int(n) => Ok(n),
            other => Err(unexpected("integer", &other)),
        }
    }

    pub fn into_value(self) -> Result<Option<String>> {
        match self {
            Reply::Value(v) => Ok(v),
            other => Err(unexpected("value", &other)),
        }
    }

    pub fn into_values(self) -> Result<Vec<Option<String>>> {
        match self {
            Reply::Values(v) => Ok(v),
            other => Err(unexpected("values", &other)),
        }
    }

    pub fn into_record(self) -> Result<Record> {
        match self {
            Reply::Record(r) => Ok(r),
            other => Err(unexpected("record", &other)),
        }
    }

    pub fn into_members(self) -> Result<Vec<String>> {
        match self {
            Reply::Members(m) => Ok(m),
            other => Err(unexpected("members", &other)),
        }
    }
}

fn unexpected(expected: &str, got: &Reply) -> AppError {
    AppError::Store(format!("unexpected reply: expected {}, got {:?}", expected, got))
}

/// Shared store all backend instances coordinate through
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Execute one command; each command is atomic on its own
    async fn execute(&self, command: Command) -> Result<Reply>;

    /// Submit commands together and apply them in order
    ///
    /// Not atomic as a whole: a failure part-way leaves earlier commands
    /// applied, and callers must re-read before retrying.
    async fn execute_batch(&self, commands: Vec<Command>) -> Result<Vec<Reply>>;

    /// Open an exclusive scope; see [`StoreTransaction`]
    async fn begin_atomic(&self) -> Result<Box<dyn StoreTransaction>>;

    /// Health check
    async fn ping(&self) -> Result<()>;
}
