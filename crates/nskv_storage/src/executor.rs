//! The command executor consumed by the durable backend.
//!
//! A remote data store is reached through an executor that accepts an
//! ordered argument list (`["HGET", key, "value"]`) and answers with a
//! typed reply. The durable backend depends on nothing else.

use crate::error::{StorageError, StorageResult};

/// Completion handler for a single command.
pub type ReplyHandler = Box<dyn FnOnce(StorageResult<CommandReply>) + Send + 'static>;

/// A typed reply from the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandReply {
    /// Absent value.
    Nil,
    /// Integer reply.
    Integer(i64),
    /// Binary-safe string reply.
    String(Vec<u8>),
    /// Array of binary-safe strings.
    Array(Vec<Vec<u8>>),
    /// Short status line such as `OK`.
    Status(String),
    /// Error reply produced by the store.
    Error(String),
}

impl CommandReply {
    /// Returns a short name of the reply type, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            CommandReply::Nil => "nil",
            CommandReply::Integer(_) => "integer",
            CommandReply::String(_) => "string",
            CommandReply::Array(_) => "array",
            CommandReply::Status(_) => "status",
            CommandReply::Error(_) => "error",
        }
    }

    /// Reads the reply as an integer.
    pub fn into_integer(self, command: &str) -> StorageResult<i64> {
        match self {
            CommandReply::Integer(n) => Ok(n),
            other => Err(other.mismatch(command, "integer")),
        }
    }

    /// Reads the reply as an optional string; `Nil` maps to `None`.
    pub fn into_optional_string(self, command: &str) -> StorageResult<Option<Vec<u8>>> {
        match self {
            CommandReply::Nil => Ok(None),
            CommandReply::String(s) => Ok(Some(s)),
            other => Err(other.mismatch(command, "string or nil")),
        }
    }

    /// Reads the reply as an array of strings.
    pub fn into_string_array(self, command: &str) -> StorageResult<Vec<Vec<u8>>> {
        match self {
            CommandReply::Array(items) => Ok(items),
            other => Err(other.mismatch(command, "array")),
        }
    }

    fn mismatch(self, command: &str, expected: &'static str) -> StorageError {
        match self {
            CommandReply::Error(message) => StorageError::Command {
                command: command.to_string(),
                message,
            },
            other => StorageError::UnexpectedReply {
                command: command.to_string(),
                expected,
                actual: other.kind(),
            },
        }
    }
}

/// An asynchronous command executor bound to one remote store.
///
/// The durable backend moves its executor onto a dedicated I/O thread, so
/// an executor is only ever driven from that thread and needs `Send` but
/// not `Sync`.
///
/// # Invariants
///
/// - `handler` is invoked exactly once per call, with an `Err` if the
///   command could not be dispatched or its reply could not be read
/// - `handler` may be invoked before `run_argv_async` returns
pub trait CommandExecutor: Send {
    /// Issues `argv` and hands the reply to `handler`.
    fn run_argv_async(&mut self, argv: Vec<Vec<u8>>, handler: ReplyHandler);
}

impl<E: CommandExecutor + ?Sized> CommandExecutor for Box<E> {
    fn run_argv_async(&mut self, argv: Vec<Vec<u8>>, handler: ReplyHandler) {
        (**self).run_argv_async(argv, handler);
    }
}
