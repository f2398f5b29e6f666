//! Dispatch pool: delivers response units to the chat channel as replies to their origin message.

use crate::channels::ChannelHandle;
use crate::pipeline::queue::SharedReceiver;
use crate::pipeline::stats::PipelineStats;
use crate::pipeline::unit::{ResponseKind, ResponseUnit};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub(crate) struct DispatchSettings {
    pub send_timeout: Duration,
    pub annotate: bool,
}

pub(crate) fn spawn_dispatchers(
    count: usize,
    outtake: SharedReceiver<ResponseUnit>,
    channel: Arc<dyn ChannelHandle>,
    settings: DispatchSettings,
    stats: Arc<PipelineStats>,
) -> Vec<JoinHandle<()>> {
    (1..=count)
        .map(|id| {
            tokio::spawn(dispatch_loop(
                id,
                outtake.clone(),
                channel.clone(),
                settings.clone(),
                stats.clone(),
            ))
        })
        .collect()
}

/// Runs until the outtake queue is closed and drained. Failed sends are logged and not retried.
async fn dispatch_loop(
    dispatcher_id: usize,
    outtake: SharedReceiver<ResponseUnit>,
    channel: Arc<dyn ChannelHandle>,
    settings: DispatchSettings,
    stats: Arc<PipelineStats>,
) {
    log::debug!("dispatcher {} started", dispatcher_id);
    while let Some(response) = outtake.recv().await {
        let text = if settings.annotate && response.kind() != ResponseKind::Notice {
            format!("{}\n\nSent by dispatcher {}", response.response_text(), dispatcher_id)
        } else {
            response.response_text().to_string()
        };
        let send = channel.send_reply(
            response.conversation_id(),
            &text,
            Some(response.origin_message_id()),
        );
        match tokio::time::timeout(settings.send_timeout, send).await {
            Ok(Ok(())) => {
                stats.record_delivered();
                log::debug!(
                    "dispatcher {}: delivered reply to message {} in {}",
                    dispatcher_id,
                    response.origin_message_id(),
                    response.conversation_id()
                );
            }
            Ok(Err(e)) => {
                stats.record_delivery_failure();
                log::warn!(
                    "dispatcher {}: delivery to {} failed: {}",
                    dispatcher_id,
                    response.conversation_id(),
                    e
                );
            }
            Err(_) => {
                stats.record_delivery_failure();
                log::warn!(
                    "dispatcher {}: delivery to {} timed out after {:?}",
                    dispatcher_id,
                    response.conversation_id(),
                    settings.send_timeout
                );
            }
        }
    }
    log::debug!("dispatcher {} stopped", dispatcher_id);
}
