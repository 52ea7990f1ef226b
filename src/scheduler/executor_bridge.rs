//! Scheduler→conversation bridge.
//!
//! Provides [`TaskExecutorBridge`] which implements the [`TaskExecutor`](super::runner::TaskExecutor)
//! callback to connect scheduled tasks to the conversation pipeline.

use crate::pipeline::messages::ConversationRequest;
use crate::scheduler::tasks::{ConversationTrigger, ScheduledTask, TaskResult};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

/// Bridges scheduler task execution to the conversation pipeline.
///
/// When a scheduled task with a [`ConversationTrigger`] payload executes,
/// this bridge parses the payload and sends a conversation request to the
/// pipeline via an mpsc channel.
pub struct TaskExecutorBridge {
    /// Channel for sending conversation requests to the pipeline.
    request_tx: mpsc::UnboundedSender<ConversationRequest>,
}

impl TaskExecutorBridge {
    /// Create a new executor bridge with the given request channel.
    pub fn new(request_tx: mpsc::UnboundedSender<ConversationRequest>) -> Self {
        Self { request_tx }
    }

    /// Convert this bridge into a boxed `TaskExecutor` callback.
    ///
    /// The returned callback can be passed to [`Scheduler::with_executor`](super::runner::Scheduler::with_executor).
    pub fn into_executor(self) -> Box<dyn Fn(&ScheduledTask) -> TaskResult + Send + Sync> {
        Box::new(move |task: &ScheduledTask| -> TaskResult {
            debug!("TaskExecutorBridge executing task: {}", task.id);

            // Parse conversation trigger from task payload
            let trigger = match ConversationTrigger::from_task_payload(&task.payload) {
                Ok(t) => t,
                Err(e) => {
                    warn!(
                        "Failed to parse ConversationTrigger from task {}: {e}",
                        task.id
                    );
                    return TaskResult::Error(format!("Invalid conversation payload: {e}"));
                }
            };

            // Create oneshot channel for response
            let (response_tx, _response_rx) = oneshot::channel();

            // Build conversation request
            let request = ConversationRequest {
                task_id: task.id.clone(),
                prompt: trigger.prompt.clone(),
                system_addon: trigger.system_addon.clone(),
                response_tx,
            };

            // Send request to pipeline
            match self.request_tx.send(request) {
                Ok(()) => {
                    debug!("ConversationRequest sent for task {}", task.id);
                    // For now, return success immediately. Later tasks will handle
                    // waiting for the response and capturing the result.
                    TaskResult::Success(format!("Conversation triggered: {}", trigger.prompt))
                }
                Err(_) => {
                    warn!(
                        "Failed to send ConversationRequest for task {}: channel closed",
                        task.id
                    );
                    TaskResult::Error("Conversation channel closed".to_owned())
                }
            }
        })
    }
}
