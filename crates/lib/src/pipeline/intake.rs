//! Intake controller: turns each inbound message into zero or one request unit.

use crate::channels::InboundMessage;
use crate::config::{CommandConfig, Config};
use crate::pipeline::stats::PipelineStats;
use crate::pipeline::unit::{RequestUnit, ResponseUnit};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Recognized command prefixes and their prompt labels.
#[derive(Debug, Clone)]
pub struct CommandSet {
    commands: Vec<CommandConfig>,
}

/// Outcome of matching a message against the command set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parsed<'a> {
    /// Not a recognized command; no reply.
    Ignored,
    /// A recognized command with nothing after it.
    MissingArgument { label: &'a str },
    Command { label: &'a str, argument: &'a str },
}

impl CommandSet {
    pub fn new(commands: Vec<CommandConfig>) -> Self {
        Self { commands }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.commands.clone())
    }

    /// Match the first word of `text` against the prefixes. A Telegram `@botname` suffix on the
    /// command word is ignored, so `/topic@quill_bot cats` matches `/topic`.
    pub fn parse<'a>(&'a self, text: &'a str) -> Parsed<'a> {
        let text = text.trim_start();
        let (word, rest) = match text.find(char::is_whitespace) {
            Some(i) => text.split_at(i),
            None => (text, ""),
        };
        let word = word.split_once('@').map(|(w, _)| w).unwrap_or(word);
        let Some(command) = self.commands.iter().find(|c| c.prefix == word) else {
            return Parsed::Ignored;
        };
        let argument = rest.trim();
        if argument.is_empty() {
            Parsed::MissingArgument {
                label: &command.label,
            }
        } else {
            Parsed::Command {
                label: &command.label,
                argument,
            }
        }
    }
}

/// `"{preamble}{label}: {argument}"`.
pub fn compose_prompt(preamble: &str, label: &str, argument: &str) -> String {
    format!("{}{}: {}", preamble, label, argument)
}

/// The single producer of the intake queue. Dropping it closes the intake queue.
pub struct IntakeController {
    commands: CommandSet,
    preamble: String,
    credential: String,
    missing_argument_notice: String,
    intake_tx: mpsc::Sender<RequestUnit>,
    outtake_tx: mpsc::Sender<ResponseUnit>,
    stats: Arc<PipelineStats>,
}

impl IntakeController {
    pub(crate) fn new(
        commands: CommandSet,
        preamble: String,
        credential: String,
        missing_argument_notice: String,
        intake_tx: mpsc::Sender<RequestUnit>,
        outtake_tx: mpsc::Sender<ResponseUnit>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            commands,
            preamble,
            credential,
            missing_argument_notice,
            intake_tx,
            outtake_tx,
            stats,
        }
    }

    /// Handle one inbound message. Returns false when a downstream queue has closed.
    pub async fn handle(&self, msg: InboundMessage) -> bool {
        self.stats.record_received();
        match self.commands.parse(&msg.text) {
            Parsed::Ignored => {
                self.stats.record_ignored();
                log::debug!(
                    "intake: ignoring message {} in {}",
                    msg.message_id,
                    msg.conversation_id
                );
                true
            }
            Parsed::MissingArgument { label } => {
                log::debug!(
                    "intake: {} command without argument in {}, sending notice",
                    label,
                    msg.conversation_id
                );
                self.stats.record_notice();
                let notice = ResponseUnit::notice(
                    msg.message_id,
                    msg.conversation_id.as_str(),
                    self.missing_argument_notice.as_str(),
                );
                if self.outtake_tx.send(notice).await.is_err() {
                    log::error!("intake: outtake queue closed, dropping notice");
                    return false;
                }
                true
            }
            Parsed::Command { label, argument } => {
                let unit = RequestUnit::new(
                    msg.message_id,
                    msg.conversation_id.as_str(),
                    compose_prompt(&self.preamble, label, argument),
                    self.credential.as_str(),
                );
                if self.intake_tx.send(unit).await.is_err() {
                    log::error!("intake: intake queue closed, dropping request");
                    return false;
                }
                self.stats.record_enqueued();
                log::debug!(
                    "intake: queued {} request for message {} in {}",
                    label,
                    msg.message_id,
                    msg.conversation_id
                );
                true
            }
        }
    }

    /// Read `inbound` until it ends or `shutdown` fires. On shutdown the inbound queue is closed
    /// and messages already buffered in it are still handled. Consumes the controller, which
    /// closes the intake queue.
    pub async fn run<F>(self, mut inbound: mpsc::Receiver<InboundMessage>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut stopping = false;
        loop {
            let msg = if stopping {
                inbound.recv().await
            } else {
                tokio::select! {
                    msg = inbound.recv() => msg,
                    _ = &mut shutdown => {
                        log::info!("intake: stop requested, closing inbound source");
                        inbound.close();
                        stopping = true;
                        continue;
                    }
                }
            };
            let Some(msg) = msg else {
                break;
            };
            if !self.handle(msg).await {
                break;
            }
        }
        log::info!("intake: inbound source finished, closing intake queue");
    }
}
