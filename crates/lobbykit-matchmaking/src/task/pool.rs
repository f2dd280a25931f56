//! Fixed-capacity pool of task records.

use tracing::{debug, warn};

use super::types::{TaskId, TaskKind, TaskOutput, TaskParams, TaskPhase, TaskRecord};
use crate::error::{LobbyError, Result};
use crate::pool::SlotPool;
use crate::session::SessionHandle;

#[derive(Debug)]
pub struct TaskSlotPool {
    tasks: SlotPool<TaskRecord>,
}

impl TaskSlotPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            tasks: SlotPool::with_capacity(capacity),
        }
    }

    /// Reserve a slot in the `Allocated` phase.
    ///
    /// Fails with [`LobbyError::TooManyTasks`] and leaves the pool untouched
    /// when every slot is in use.
    pub(crate) fn start_task(
        &mut self,
        kind: TaskKind,
        session: Option<SessionHandle>,
        params: TaskParams,
    ) -> Result<TaskId> {
        let record = TaskRecord {
            kind,
            sub_kind: None,
            phase: TaskPhase::Allocated,
            session,
            params,
            error: None,
            started_at: None,
            cancel_requested: false,
            output: TaskOutput::None,
        };
        match self.tasks.insert(record) {
            Ok(key) => {
                let id = TaskId(key);
                debug!(task_id = %id, ?kind, "Task allocated");
                Ok(id)
            }
            Err(_) => {
                let in_use: Vec<TaskKind> = self.tasks.iter().map(|(_, t)| t.kind).collect();
                warn!(?kind, ?in_use, "Task pool exhausted");
                Err(LobbyError::TooManyTasks)
            }
        }
    }

    pub(crate) fn get(&self, id: TaskId) -> Option<&TaskRecord> {
        self.tasks.get(id.0)
    }

    pub(crate) fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskRecord> {
        self.tasks.get_mut(id.0)
    }

    /// Record `error` unless an earlier error is already recorded.
    pub(crate) fn update_task_error(&mut self, id: TaskId, error: LobbyError) {
        if let Some(task) = self.tasks.get_mut(id.0)
            && task.error.is_none()
        {
            task.error = Some(error);
        }
    }

    pub(crate) fn free(&mut self, id: TaskId) -> Option<TaskRecord> {
        let record = self.tasks.remove(id.0);
        if record.is_some() {
            debug!(task_id = %id, "Task freed");
        }
        record
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains(id.0)
    }

    pub fn phase(&self, id: TaskId) -> Option<TaskPhase> {
        self.get(id).map(|t| t.phase)
    }

    pub fn ids(&self) -> Vec<TaskId> {
        self.tasks.keys().into_iter().map(TaskId).collect()
    }

    pub const fn len(&self) -> usize {
        self.tasks.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tasks.capacity()
    }
}
