//! Worker pool: request units in, response units out, one generation call at a time per worker.

use crate::llm::{GenerationBackend, GenerationError};
use crate::pipeline::queue::SharedReceiver;
use crate::pipeline::stats::PipelineStats;
use crate::pipeline::unit::{RequestUnit, ResponseKind, ResponseUnit};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub(crate) struct WorkerSettings {
    pub generate_timeout: Duration,
    pub failure_reply: String,
    pub annotate: bool,
}

/// Why a request produced no generated text.
#[derive(Debug)]
enum WorkFailure {
    Generation(GenerationError),
    TimedOut(Duration),
    Panicked,
}

impl std::fmt::Display for WorkFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkFailure::Generation(e) => write!(f, "{}", e),
            WorkFailure::TimedOut(d) => write!(f, "generation timed out after {:?}", d),
            WorkFailure::Panicked => write!(f, "generation backend panicked"),
        }
    }
}

/// Spawn `count` workers sharing one intake receiver. Each holds its own outtake sender, so
/// the outtake queue stays open until every worker has exited.
pub(crate) fn spawn_workers(
    count: usize,
    intake: SharedReceiver<RequestUnit>,
    outtake: &mpsc::Sender<ResponseUnit>,
    backend: Arc<dyn GenerationBackend>,
    settings: WorkerSettings,
    stats: Arc<PipelineStats>,
) -> Vec<JoinHandle<()>> {
    (1..=count)
        .map(|id| {
            tokio::spawn(worker_loop(
                id,
                intake.clone(),
                outtake.clone(),
                backend.clone(),
                settings.clone(),
                stats.clone(),
            ))
        })
        .collect()
}

/// Runs until the intake queue is closed and drained.
async fn worker_loop(
    worker_id: usize,
    intake: SharedReceiver<RequestUnit>,
    outtake: mpsc::Sender<ResponseUnit>,
    backend: Arc<dyn GenerationBackend>,
    settings: WorkerSettings,
    stats: Arc<PipelineStats>,
) {
    log::debug!("worker {} started", worker_id);
    while let Some(request) = intake.recv().await {
        let response = match generate(backend.as_ref(), &request, settings.generate_timeout).await {
            Ok(text) => {
                stats.record_generated();
                let text = if settings.annotate {
                    format!("{}\n\nProcessed by worker {}", text, worker_id)
                } else {
                    text
                };
                ResponseUnit::for_request(&request, text, ResponseKind::Generated)
            }
            Err(failure) => {
                stats.record_generation_failure();
                log::warn!(
                    "worker {}: generation failed for message {} in {}: {}",
                    worker_id,
                    request.origin_message_id(),
                    request.conversation_id(),
                    failure
                );
                ResponseUnit::for_request(&request, settings.failure_reply.clone(), ResponseKind::Failed)
            }
        };
        if outtake.send(response).await.is_err() {
            log::error!("worker {}: outtake queue closed, stopping", worker_id);
            break;
        }
    }
    log::debug!("worker {} stopped", worker_id);
}

/// One backend call under a deadline. A panic inside the backend future is caught and
/// reported as a failure of this request only.
async fn generate(
    backend: &dyn GenerationBackend,
    request: &RequestUnit,
    deadline: Duration,
) -> Result<String, WorkFailure> {
    let call = AssertUnwindSafe(backend.generate(request.credential(), request.prompt_text()))
        .catch_unwind();
    match tokio::time::timeout(deadline, call).await {
        Ok(Ok(Ok(text))) => Ok(text),
        Ok(Ok(Err(e))) => Err(WorkFailure::Generation(e)),
        Ok(Err(_panic)) => Err(WorkFailure::Panicked),
        Err(_elapsed) => Err(WorkFailure::TimedOut(deadline)),
    }
}
