//! Units of work queued on the dispatcher.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::core::{BaseResult, Error, InsertResult};

/// Callback invoked once an insert reaches a terminal state.
pub type InsertCallback<B> = Box<dyn FnOnce(InsertResult<B>) + Send + 'static>;

// =============================================================================
// Insert Task
// =============================================================================

/// A batch to insert into one table.
///
/// The batch is shared and immutable once the task is built; the task owns
/// its handle until the callback fires.
pub struct InsertTask<B> {
    /// Destination table
    pub table_name: String,
    /// Rows to insert
    pub batch: Arc<B>,
    /// Deduplication key forwarded to the server, if any
    pub idempotent_id: Option<String>,
    /// When the task was created
    pub queued_at: Instant,
    callback: InsertCallback<B>,
}

impl<B> InsertTask<B> {
    /// Create a task. An empty `idempotent_id` means "not idempotent".
    pub fn new<F>(
        table_name: impl Into<String>,
        batch: Arc<B>,
        idempotent_id: Option<String>,
        callback: F,
    ) -> Self
    where
        F: FnOnce(InsertResult<B>) + Send + 'static,
    {
        Self {
            table_name: table_name.into(),
            batch,
            idempotent_id: idempotent_id.filter(|id| !id.is_empty()),
            queued_at: Instant::now(),
            callback: Box::new(callback),
        }
    }

    /// Deliver the terminal result. Consumes the task, so the callback can
    /// only ever run once.
    pub fn complete(self, result: BaseResult) {
        let InsertTask {
            table_name,
            batch,
            idempotent_id,
            callback,
            ..
        } = self;

        callback(InsertResult {
            table_name,
            batch,
            idempotent_id,
            err_code: result.err_code,
            err_msg: result.err_msg,
        });
    }
}

impl<B> fmt::Debug for InsertTask<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InsertTask")
            .field("table_name", &self.table_name)
            .field("idempotent_id", &self.idempotent_id)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Task
// =============================================================================

/// Work item executed by a dispatcher worker.
#[derive(Debug)]
pub enum Task<B> {
    Insert(InsertTask<B>),
}

impl<B> Task<B> {
    /// Task kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Task::Insert(_) => "insert",
        }
    }

    /// When the task was created.
    pub fn queued_at(&self) -> Instant {
        match self {
            Task::Insert(task) => task.queued_at,
        }
    }

    /// Complete the task without running it.
    pub fn abort(self, err: &Error) {
        match self {
            Task::Insert(task) => task.complete(BaseResult::from_error(err)),
        }
    }
}

impl<B> From<InsertTask<B>> for Task<B> {
    fn from(task: InsertTask<B>) -> Self {
        Task::Insert(task)
    }
}
