//! # Task Management System
//!
//! Runs pipeline work (voxel generation, lighting, meshing) on a pool of worker threads
//! while the main thread keeps rendering.
//!
//! ## Architecture Overview
//!
//! - `TaskManager`: Central coordinator for task distribution and worker management
//! - `Task`: A unit of work that can be executed asynchronously
//! - `TaskResult`: The result of a completed task, which can spawn additional tasks
//! - `TaskChannel`: Communication channel between the main thread and one worker
//!
//! Each worker owns a dedicated channel pair. Tasks are handed out round-robin to workers
//! with free capacity; everything else waits in a FIFO queue on the main thread.
//!
//! ## Task Lifecycle
//! 1. Tasks are created and published via `TaskManager::publish_task()`
//! 2. The manager distributes tasks to available worker channels using round-robin
//! 3. Workers process tasks and send back results
//! 4. Results are handled on the main thread in `process_completed_tasks()`
//! 5. Results can spawn new tasks
//!
//! ## Example Usage
//! ```rust,ignore
//! let mut task_manager = TaskManager::new(worker_count);
//! let mut context = TaskContext::default();
//!
//! task_manager.publish_task(Box::new(GeometryTask::new(pipeline.clone(), coordinate)));
//!
//! // In the frame loop:
//! task_manager.process_completed_tasks(&mut context);
//! task_manager.process_queued_tasks();
//! ```

pub mod task;
pub mod tasks;

use std::{
    collections::VecDeque,
    sync::mpsc::{channel, Receiver, Sender},
    thread::{self, JoinHandle},
};

use log::{error, info};
use task::{Task, TaskContext, TaskResult};

/// A communication channel between the main thread and a worker thread.
///
/// # Fields
/// - `task_sender`: Sends tasks from main thread to worker
/// - `result_receiver`: Receives task results from worker
/// - `num_tasks_in_flight`: Tracks number of tasks currently being processed
/// - `_worker`: Handle to the worker thread, which exits once `task_sender` is dropped
#[derive(Debug)]
pub struct TaskChannel {
    task_sender: Sender<Box<dyn Task + Send>>,
    result_receiver: Receiver<Box<dyn TaskResult + Send>>,
    num_tasks_in_flight: usize,
    _worker: JoinHandle<()>,
}

/// Manages a pool of worker threads and coordinates task execution.
///
/// # Fields
/// - `channels`: Set of active worker channels
/// - `queued_tasks`: Tasks waiting for an available worker
/// - `current_channel`: Index for round-robin scheduling
pub struct TaskManager {
    channels: Vec<TaskChannel>,
    queued_tasks: VecDeque<Box<dyn Task + Send>>,
    current_channel: usize,
}

/// Maximum number of tasks that can be in flight per worker channel.
///
/// Kept at 1 so a long task never has others stuck behind it on the same worker while
/// another worker sits idle.
pub const MAX_TASKS_IN_FLIGHT: usize = 1;

impl TaskManager {
    /// Creates a new `TaskManager` with the specified number of worker threads.
    ///
    /// With zero workers nothing runs in the background; queued tasks only run on the
    /// calling thread inside [`wait_until_idle`](Self::wait_until_idle).
    ///
    /// # Panics
    /// Panics if the underlying thread creation fails.
    pub fn new(num_workers: usize) -> Self {
        let mut channels = Vec::with_capacity(num_workers);

        for index in 0..num_workers {
            let (task_tx, task_rx) = channel::<Box<dyn Task + Send>>();
            let (result_tx, result_rx) = channel::<Box<dyn TaskResult + Send>>();

            let task_closure = move || {
                while let Ok(task) = task_rx.recv() {
                    let result = task.process();
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
            };

            let worker = match thread::Builder::new()
                .name(format!("chunk-worker-{index}"))
                .spawn(task_closure)
            {
                Ok(worker) => worker,
                Err(error) => panic!("failed to spawn chunk worker {index}: {error}"),
            };

            channels.push(TaskChannel {
                task_sender: task_tx,
                result_receiver: result_rx,
                num_tasks_in_flight: 0,
                _worker: worker,
            });
        }
        info!("Started {num_workers} chunk workers");

        TaskManager {
            channels,
            queued_tasks: VecDeque::new(),
            current_channel: 0,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.channels.len()
    }

    /// Tasks sent to a worker whose result has not been handled yet.
    pub fn tasks_in_flight(&self) -> usize {
        self.channels
            .iter()
            .map(|channel| channel.num_tasks_in_flight)
            .sum()
    }

    pub fn queued_len(&self) -> usize {
        self.queued_tasks.len()
    }

    pub fn is_idle(&self) -> bool {
        self.queued_tasks.is_empty() && self.tasks_in_flight() == 0
    }

    /// Attempts to send a task to a specific worker channel.
    ///
    /// # Returns
    /// - `Ok(())` if the task was successfully sent to the worker
    /// - `Err(task)` if the send failed (the worker is gone)
    fn try_send_task(
        &mut self,
        task: Box<dyn Task + Send>,
        channel_idx: usize,
    ) -> Result<(), Box<dyn Task + Send>> {
        match self.channels[channel_idx].task_sender.send(task) {
            Ok(_) => {
                self.channels[channel_idx].num_tasks_in_flight += 1;
                Ok(())
            }
            Err(task) => Err(task.0),
        }
    }

    /// Finds an available worker channel, round-robin from the last one used.
    fn find_available_channel(&self) -> Option<usize> {
        if self.channels.is_empty() {
            return None;
        }

        let start_channel = self.current_channel;
        let mut current = start_channel;
        loop {
            if self.channels[current].num_tasks_in_flight < MAX_TASKS_IN_FLIGHT {
                return Some(current);
            }
            current = (current + 1) % self.channels.len();
            if current == start_channel {
                return None;
            }
        }
    }

    /// Publishes a new task for execution.
    ///
    /// # Returns
    /// - `true` if the task was immediately scheduled on an available worker
    /// - `false` if the task was queued because all workers are busy
    pub fn publish_task(&mut self, task: Box<dyn Task + Send>) -> bool {
        match self.find_available_channel() {
            Some(channel_idx) => match self.try_send_task(task, channel_idx) {
                Ok(_) => {
                    self.current_channel = (channel_idx + 1) % self.channels.len();
                    true
                }
                Err(task) => {
                    self.queued_tasks.push_back(task);
                    false
                }
            },
            None => {
                self.queued_tasks.push_back(task);
                false
            }
        }
    }

    /// Hands queued tasks to workers until the queue is empty or every worker is busy.
    pub fn process_queued_tasks(&mut self) {
        while !self.queued_tasks.is_empty() {
            let Some(channel_idx) = self.find_available_channel() else {
                break;
            };
            let Some(task) = self.queued_tasks.pop_front() else {
                break;
            };
            match self.try_send_task(task, channel_idx) {
                Ok(_) => self.current_channel = (channel_idx + 1) % self.channels.len(),
                Err(task) => {
                    // Channel is disconnected, put task back and stop processing
                    self.queued_tasks.push_front(task);
                    break;
                }
            }
        }
    }

    /// Drops every task that has not reached a worker yet.
    ///
    /// # Returns
    /// The dropped tasks, so the caller can forget their bookkeeping.
    pub fn clear_queued(&mut self) -> Vec<Box<dyn Task + Send>> {
        self.queued_tasks.drain(..).collect()
    }

    /// Handles every result the workers have sent back, without blocking.
    ///
    /// # Returns
    /// The number of results handled.
    pub fn process_completed_tasks(&mut self, context: &mut TaskContext) -> usize {
        let mut tasks_to_queue = Vec::new();
        let mut handled = 0;
        for channel in &mut self.channels {
            while let Ok(result) = channel.result_receiver.try_recv() {
                channel.num_tasks_in_flight -= 1;
                handled += 1;
                tasks_to_queue.extend(result.handle_result(context));
            }
        }

        for task in tasks_to_queue {
            self.publish_task(task);
        }
        handled
    }

    /// Blocks until every queued and running task has finished and been handled.
    ///
    /// Without workers, the queue is processed on the calling thread.
    pub fn wait_until_idle(&mut self, context: &mut TaskContext) {
        if self.channels.is_empty() {
            while let Some(task) = self.queued_tasks.pop_front() {
                let follow_ups = task.process().handle_result(context);
                self.queued_tasks.extend(follow_ups);
            }
            return;
        }

        loop {
            self.process_queued_tasks();
            let mut tasks_to_queue = Vec::new();
            let mut waited = false;
            for channel in &mut self.channels {
                while channel.num_tasks_in_flight > 0 {
                    waited = true;
                    match channel.result_receiver.recv() {
                        Ok(result) => {
                            channel.num_tasks_in_flight -= 1;
                            tasks_to_queue.extend(result.handle_result(context));
                        }
                        Err(_) => {
                            error!(
                                "Chunk worker exited with {} tasks in flight",
                                channel.num_tasks_in_flight
                            );
                            channel.num_tasks_in_flight = 0;
                        }
                    }
                }
            }
            for task in tasks_to_queue {
                self.publish_task(task);
            }
            if !waited && self.queued_tasks.is_empty() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    struct Count {
        counter: Arc<AtomicUsize>,
        follow_ups: usize,
    }

    struct Counted {
        counter: Arc<AtomicUsize>,
        follow_ups: usize,
    }

    impl Task for Count {
        fn process(&self) -> Box<dyn TaskResult + Send> {
            self.counter.fetch_add(1, Ordering::SeqCst);
            Box::new(Counted {
                counter: Arc::clone(&self.counter),
                follow_ups: self.follow_ups,
            })
        }
    }

    impl TaskResult for Counted {
        fn handle_result(self: Box<Self>, _: &mut TaskContext) -> Vec<Box<dyn Task + Send>> {
            if self.follow_ups == 0 {
                return Vec::new();
            }
            vec![Box::new(Count {
                counter: self.counter,
                follow_ups: self.follow_ups - 1,
            })]
        }
    }

    fn count(counter: &Arc<AtomicUsize>, follow_ups: usize) -> Box<dyn Task + Send> {
        Box::new(Count {
            counter: Arc::clone(counter),
            follow_ups,
        })
    }

    #[test]
    fn tasks_beyond_worker_capacity_are_queued() {
        let mut manager = TaskManager::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        assert!(manager.publish_task(count(&counter, 0)));
        assert!(manager.publish_task(count(&counter, 0)));
        assert!(!manager.publish_task(count(&counter, 0)));
        assert_eq!(manager.queued_len(), 1);

        let mut context = TaskContext::default();
        manager.wait_until_idle(&mut context);
        assert!(manager.is_idle());
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn follow_up_tasks_run_before_idle() {
        let mut manager = TaskManager::new(3);
        let counter = Arc::new(AtomicUsize::new(0));
        manager.publish_task(count(&counter, 4));
        manager.wait_until_idle(&mut TaskContext::default());
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn without_workers_tasks_run_inline_when_waited_on() {
        let mut manager = TaskManager::new(0);
        let counter = Arc::new(AtomicUsize::new(0));
        assert!(!manager.publish_task(count(&counter, 1)));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        manager.wait_until_idle(&mut TaskContext::default());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn cleared_tasks_never_run() {
        let mut manager = TaskManager::new(0);
        let counter = Arc::new(AtomicUsize::new(0));
        manager.publish_task(count(&counter, 0));
        assert_eq!(manager.clear_queued().len(), 1);
        manager.wait_until_idle(&mut TaskContext::default());
        assert_eq!(counter.load(Ordering::SeqCst), 0);
    }
}
