//! # Task System Core Traits
//!
//! This module defines the fundamental building blocks of the task system,
//! which runs pipeline work on background threads.
//!
//! ## Core Components
//! - `Task`: Represents a unit of work that can be executed asynchronously
//! - `TaskResult`: Represents the result of a completed task
//! - `TaskContext`: Bookkeeping the results report back into, on the main thread
//!
//! ## Task Lifecycle
//! 1. A `Task` is created and scheduled via `TaskManager::publish_task()`
//! 2. The task's `process()` method is called on a worker thread
//! 3. The task returns a boxed `TaskResult`
//! 4. The result's `handle_result()` is called on the main thread
//! 5. The result can spawn new tasks

use std::collections::HashSet;

use crate::engine_state::{error::PipelineError, grid::ChunkCoordinate};

/// A unit of work that can be executed on a worker thread.
///
/// Tasks own everything they need (typically an `Arc` of the pipeline plus a coordinate),
/// so they are `'static` and can be moved to any worker.
pub trait Task: Send {
    /// Processes the task and returns a result.
    ///
    /// Runs on a worker thread. Errors are captured in the result rather than returned,
    /// since the main thread decides what to do about them.
    fn process(&self) -> Box<dyn TaskResult + Send>;

    /// The chunk this task works on, if any. Used to forget tasks that are dropped from
    /// the queue before they ran.
    fn coordinate(&self) -> Option<ChunkCoordinate> {
        None
    }
}

/// The result of processing a [`Task`], handled on the main thread.
pub trait TaskResult: Send {
    /// Records the outcome in `context`.
    ///
    /// # Returns
    /// Follow-up tasks to schedule (can be empty).
    fn handle_result(self: Box<Self>, context: &mut TaskContext) -> Vec<Box<dyn Task + Send>>;
}

/// Main-thread bookkeeping for background work.
#[derive(Debug, Default)]
pub struct TaskContext {
    /// Chunks with a task queued or running
    pub in_flight: HashSet<ChunkCoordinate>,
    /// Chunks finished since the last drain
    pub completed: Vec<ChunkCoordinate>,
    /// Chunks whose task failed since the last drain
    pub failed: Vec<(ChunkCoordinate, PipelineError)>,
}

impl TaskContext {
    /// Takes the completed and failed lists, leaving them empty.
    pub fn drain_outcomes(&mut self) -> (Vec<ChunkCoordinate>, Vec<(ChunkCoordinate, PipelineError)>) {
        (
            std::mem::take(&mut self.completed),
            std::mem::take(&mut self.failed),
        )
    }
}
