use crate::config::MidjourneyConfig;
use crate::midjourney::client::{TaskClient, TaskSnapshot, TaskStatus};
use crate::midjourney::prompt::{request_from_messages, TaskRequest};
use crate::midjourney::render::ProgressRenderer;
use crate::types::{GatewayError, Message, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Races `fut` against the request's cancellation.
async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GatewayError::Cancelled.into()),
        out = fut => out,
    }
}

/// Drives an image task from submission to rendered result.
pub struct TaskOrchestrator<C> {
    client: C,
    config: Arc<MidjourneyConfig>,
}

impl<C: TaskClient> TaskOrchestrator<C> {
    pub fn new(client: C, config: Arc<MidjourneyConfig>) -> Self {
        Self { client, config }
    }

    /// Prepares the prompt from `messages`, submits it and streams progress and
    /// the result through `hook`.
    ///
    /// Polling stops as soon as `cancel` fires and the call returns
    /// `GatewayError::Cancelled`; nothing keeps running in the background.
    pub async fn create_stream_task<H>(
        &self,
        model: &str,
        messages: &[Message],
        cancel: &CancellationToken,
        mut hook: H,
    ) -> Result<TaskSnapshot>
    where
        H: FnMut(&str) -> Result<()>,
    {
        let request = request_from_messages(&self.config, model, messages)?;
        self.run(&request, cancel, &mut hook).await
    }

    pub async fn run<H>(
        &self,
        request: &TaskRequest,
        cancel: &CancellationToken,
        hook: &mut H,
    ) -> Result<TaskSnapshot>
    where
        H: FnMut(&str) -> Result<()>,
    {
        let task_id = cancellable(cancel, self.client.submit(request)).await?;
        tracing::info!("[MIDJOURNEY] Task {} submitted ({})", task_id, request.action());

        let mut renderer = ProgressRenderer::new();
        let result = self.poll(request, &task_id, &mut renderer, cancel, hook).await;
        if result.is_err() {
            // Best effort: the sink may be the reason polling stopped.
            if let Err(e) = renderer.finish(hook) {
                tracing::debug!("[MIDJOURNEY] Could not close progress block: {}", e);
            }
        }
        result
    }

    async fn poll<H>(
        &self,
        request: &TaskRequest,
        task_id: &str,
        renderer: &mut ProgressRenderer,
        cancel: &CancellationToken,
        hook: &mut H,
    ) -> Result<TaskSnapshot>
    where
        H: FnMut(&str) -> Result<()>,
    {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            cancellable(cancel, async {
                ticker.tick().await;
                Ok(())
            })
            .await?;

            let snapshot = cancellable(cancel, self.client.fetch(task_id)).await?;
            match snapshot.status {
                TaskStatus::Failure => {
                    let reason = snapshot
                        .fail_reason
                        .clone()
                        .unwrap_or_else(|| "unknown failure".to_string());
                    tracing::warn!("[MIDJOURNEY] Task {} failed: {}", task_id, reason);
                    return Err(GatewayError::Task(format!("error from midjourney: {}", reason)).into());
                }
                TaskStatus::Success => {
                    let url = snapshot.image_url.clone().ok_or_else(|| {
                        GatewayError::Task(format!("task {} finished without an image", task_id))
                    })?;
                    renderer.on_progress(100, hook)?;
                    renderer.on_complete(
                        request.action(),
                        task_id,
                        &url,
                        &self.config.virtual_host,
                        hook,
                    )?;
                    tracing::info!("[MIDJOURNEY] Task {} completed", task_id);
                    return Ok(snapshot);
                }
                _ => renderer.on_progress(snapshot.progress, hook)?,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midjourney::prompt::TaskAction;
    use std::sync::Mutex;

    struct FailingClient;

    impl TaskClient for FailingClient {
        async fn submit(&self, _request: &TaskRequest) -> Result<String> {
            Ok("1".to_string())
        }

        async fn fetch(&self, task_id: &str) -> Result<TaskSnapshot> {
            Ok(TaskSnapshot {
                task_id: task_id.to_string(),
                action: TaskAction::Imagine,
                status: TaskStatus::Failure,
                progress: 0,
                image_url: None,
                fail_reason: Some("banned prompt".to_string()),
            })
        }
    }

    struct NeverSubmitted {
        calls: Mutex<usize>,
    }

    impl TaskClient for NeverSubmitted {
        async fn submit(&self, _request: &TaskRequest) -> Result<String> {
            if let Ok(mut calls) = self.calls.lock() {
                *calls += 1;
            }
            Ok("1".to_string())
        }

        async fn fetch(&self, _task_id: &str) -> Result<TaskSnapshot> {
            Err(GatewayError::Task("unreachable".to_string()).into())
        }
    }

    fn config() -> Arc<MidjourneyConfig> {
        Arc::new(MidjourneyConfig {
            poll_interval_ms: 1,
            ..MidjourneyConfig::default()
        })
    }

    #[tokio::test]
    async fn test_failure_is_task_error() {
        let orchestrator = TaskOrchestrator::new(FailingClient, config());
        let cancel = CancellationToken::new();
        let result = orchestrator
            .create_stream_task("midjourney", &[Message::user("a cat")], &cancel, |_: &str| Ok(()))
            .await;
        match result.map_err(|e| e.inner) {
            Err(GatewayError::Task(reason)) => assert!(reason.contains("banned prompt")),
            other => panic!("expected task error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_prompt_never_submits() {
        let client = NeverSubmitted {
            calls: Mutex::new(0),
        };
        let orchestrator = TaskOrchestrator::new(client, config());
        let cancel = CancellationToken::new();
        let result = orchestrator
            .create_stream_task("midjourney", &[Message::user("  --fast ")], &cancel, |_: &str| Ok(()))
            .await;
        assert!(matches!(result.map_err(|e| e.inner), Err(GatewayError::Format(_))));
        let calls = orchestrator.client.calls.lock().map(|c| *c).unwrap_or(usize::MAX);
        assert_eq!(calls, 0);
    }
}
