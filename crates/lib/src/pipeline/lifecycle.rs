//! Lifecycle coordinator: owns both queues and both pools, and shuts them down in order.
//!
//! `Running → DrainingWorkers → DrainingDispatchers → Stopped`. The intake queue closes when
//! the intake controller finishes; the outtake queue closes once every worker has exited.
//! Units already queued when a queue closes are still processed.

use crate::channels::{ChannelHandle, InboundMessage};
use crate::config::{Config, PipelineConfig};
use crate::llm::GenerationBackend;
use crate::pipeline::dispatch::{spawn_dispatchers, DispatchSettings};
use crate::pipeline::intake::{CommandSet, IntakeController};
use crate::pipeline::queue::SharedReceiver;
use crate::pipeline::stats::{PipelineReport, PipelineStats};
use crate::pipeline::worker::{spawn_workers, WorkerSettings};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Built, not yet started.
    Idle,
    Running,
    DrainingWorkers,
    DrainingDispatchers,
    Stopped,
}

/// Pool sizes, queue capacity, deadlines, and reply texts.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub worker_count: usize,
    pub dispatcher_count: usize,
    pub queue_capacity: usize,
    pub generate_timeout: Duration,
    pub send_timeout: Duration,
    pub annotate_replies: bool,
    pub missing_argument_notice: String,
    pub failure_reply: String,
}

impl PipelineSettings {
    /// Zero counts or capacity are raised to 1.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            worker_count: config.worker_count.max(1),
            dispatcher_count: config.dispatcher_count.max(1),
            queue_capacity: config.queue_capacity.max(1),
            generate_timeout: config.generate_timeout(),
            send_timeout: config.send_timeout(),
            annotate_replies: config.annotate_replies,
            missing_argument_notice: config.missing_argument_notice.clone(),
            failure_reply: config.failure_reply.clone(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// The whole pipeline, ready to run against an inbound message source.
pub struct Pipeline {
    settings: PipelineSettings,
    commands: CommandSet,
    preamble: String,
    credential: String,
    backend: Arc<dyn GenerationBackend>,
    channel: Arc<dyn ChannelHandle>,
    state: watch::Sender<LifecycleState>,
}

impl Pipeline {
    pub fn new(
        settings: PipelineSettings,
        commands: CommandSet,
        preamble: impl Into<String>,
        credential: impl Into<String>,
        backend: Arc<dyn GenerationBackend>,
        channel: Arc<dyn ChannelHandle>,
    ) -> Self {
        let (state, _) = watch::channel(LifecycleState::Idle);
        Self {
            settings,
            commands,
            preamble: preamble.into(),
            credential: credential.into(),
            backend,
            channel,
            state,
        }
    }

    /// Build from loaded config. `credential` is the resolved generation key.
    pub fn from_config(
        config: &Config,
        credential: impl Into<String>,
        backend: Arc<dyn GenerationBackend>,
        channel: Arc<dyn ChannelHandle>,
    ) -> Self {
        Self::new(
            PipelineSettings::from_config(&config.pipeline),
            CommandSet::from_config(config),
            config.preamble.clone(),
            credential,
            backend,
            channel,
        )
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Run until `inbound` ends (every sender dropped), then drain and stop.
    pub async fn run(self, inbound: mpsc::Receiver<InboundMessage>) -> PipelineReport {
        self.run_until(inbound, std::future::pending()).await
    }

    /// Run until `inbound` ends or `shutdown` completes, then drain and stop.
    pub async fn run_until<F>(
        self,
        inbound: mpsc::Receiver<InboundMessage>,
        shutdown: F,
    ) -> PipelineReport
    where
        F: Future<Output = ()>,
    {
        let Pipeline {
            settings,
            commands,
            preamble,
            credential,
            backend,
            channel,
            state,
        } = self;
        let stats = Arc::new(PipelineStats::new());
        let (intake_tx, intake_rx) = mpsc::channel(settings.queue_capacity);
        let (outtake_tx, outtake_rx) = mpsc::channel(settings.queue_capacity);

        let workers = spawn_workers(
            settings.worker_count,
            SharedReceiver::new(intake_rx),
            &outtake_tx,
            backend,
            WorkerSettings {
                generate_timeout: settings.generate_timeout,
                failure_reply: settings.failure_reply.clone(),
                annotate: settings.annotate_replies,
            },
            stats.clone(),
        );
        let dispatchers = spawn_dispatchers(
            settings.dispatcher_count,
            SharedReceiver::new(outtake_rx),
            channel,
            DispatchSettings {
                send_timeout: settings.send_timeout,
                annotate: settings.annotate_replies,
            },
            stats.clone(),
        );
        let intake = IntakeController::new(
            commands,
            preamble,
            credential,
            settings.missing_argument_notice.clone(),
            intake_tx,
            outtake_tx.clone(),
            stats.clone(),
        );

        log::info!(
            "pipeline running: {} workers, {} dispatchers, queue capacity {}",
            settings.worker_count,
            settings.dispatcher_count,
            settings.queue_capacity
        );
        transition(&state, LifecycleState::Running);
        intake.run(inbound, shutdown).await;

        transition(&state, LifecycleState::DrainingWorkers);
        join_pool("worker", workers).await;
        drop(outtake_tx);

        transition(&state, LifecycleState::DrainingDispatchers);
        join_pool("dispatcher", dispatchers).await;

        transition(&state, LifecycleState::Stopped);
        let report = stats.snapshot();
        log::info!("pipeline stopped: {:?}", report);
        report
    }
}

fn transition(state: &watch::Sender<LifecycleState>, next: LifecycleState) {
    let prev = state.send_replace(next);
    log::info!("pipeline: {:?} -> {:?}", prev, next);
}

async fn join_pool(role: &str, handles: Vec<JoinHandle<()>>) {
    let results = futures_util::future::join_all(handles).await;
    for (id, result) in (1..).zip(results) {
        if let Err(e) = result {
            log::error!("{} {} ended abnormally: {}", role, id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn settings_follow_config() {
        let mut config = Config::default();
        config.pipeline.worker_count = 3;
        config.pipeline.dispatcher_count = 0;
        config.pipeline.generate_timeout_secs = 5;
        let s = PipelineSettings::from_config(&config.pipeline);
        assert_eq!(s.worker_count, 3);
        assert_eq!(s.dispatcher_count, 1);
        assert_eq!(s.queue_capacity, 64);
        assert_eq!(s.generate_timeout, Duration::from_secs(5));
        assert_eq!(s.missing_argument_notice, "Please, enter your topic or phrase");
    }
}
