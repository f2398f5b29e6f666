//! Integration tests: run the whole pipeline against in-process fakes of the Gemini backend
//! and the Telegram channel. No network access.

use async_trait::async_trait;
use quill::channels::{ChannelHandle, DeliveryError, InboundMessage};
use quill::config::Config;
use quill::llm::{GenerationBackend, GenerationError};
use quill::pipeline::{CommandSet, LifecycleState, Pipeline, PipelineReport, PipelineSettings};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

const PREAMBLE: &str = "Write a short story. ";
const NOTICE: &str = "Please, enter your topic or phrase";

/// Answers "A story about {argument}." Prompts whose argument is FAIL, PANIC, or SLOW misbehave.
#[derive(Default)]
struct FakeBackend {
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
    delay: Duration,
}

impl FakeBackend {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationBackend for FakeBackend {
    async fn generate(&self, credential: &str, prompt: &str) -> Result<String, GenerationError> {
        assert_eq!(credential, "test-key");
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let argument = prompt.rsplit(": ").next().unwrap_or(prompt);
        match argument {
            "FAIL" => Err(GenerationError::Api {
                status: 429,
                body: "quota exceeded".to_string(),
            }),
            "PANIC" => panic!("backend blew up"),
            "SLOW" => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok("too late".to_string())
            }
            other => Ok(format!("A story about {}.", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Sent {
    conversation_id: String,
    text: String,
    reply_to: Option<i64>,
}

/// Records every reply. Sends to `failing_conversation` fail.
#[derive(Default)]
struct FakeChannel {
    sent: Mutex<Vec<Sent>>,
    failing_conversation: Option<String>,
}

impl FakeChannel {
    fn failing_for(conversation_id: &str) -> Self {
        Self {
            failing_conversation: Some(conversation_id.to_string()),
            ..Self::default()
        }
    }

    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChannelHandle for FakeChannel {
    fn id(&self) -> &str {
        "fake"
    }

    fn stop(&self) {}

    async fn send_reply(
        &self,
        conversation_id: &str,
        text: &str,
        reply_to: Option<i64>,
    ) -> Result<(), DeliveryError> {
        if self.failing_conversation.as_deref() == Some(conversation_id) {
            return Err(DeliveryError::Api("chat not found".to_string()));
        }
        self.sent.lock().unwrap().push(Sent {
            conversation_id: conversation_id.to_string(),
            text: text.to_string(),
            reply_to,
        });
        Ok(())
    }
}

fn message(id: i64, conversation_id: &str, text: &str) -> InboundMessage {
    InboundMessage {
        channel_id: "fake".to_string(),
        conversation_id: conversation_id.to_string(),
        message_id: id,
        text: text.to_string(),
    }
}

fn settings(workers: usize, dispatchers: usize) -> PipelineSettings {
    PipelineSettings {
        worker_count: workers,
        dispatcher_count: dispatchers,
        generate_timeout: Duration::from_secs(5),
        send_timeout: Duration::from_secs(5),
        ..PipelineSettings::default()
    }
}

fn pipeline(
    settings: PipelineSettings,
    backend: &Arc<FakeBackend>,
    channel: &Arc<FakeChannel>,
) -> Pipeline {
    Pipeline::new(
        settings,
        CommandSet::from_config(&Config::default()),
        PREAMBLE,
        "test-key",
        backend.clone(),
        channel.clone(),
    )
}

/// Feed `messages` through a fresh pipeline and wait for it to stop.
async fn run_messages(
    settings: PipelineSettings,
    backend: &Arc<FakeBackend>,
    channel: &Arc<FakeChannel>,
    messages: Vec<InboundMessage>,
) -> PipelineReport {
    let (tx, rx) = mpsc::channel(messages.len().max(1));
    for m in messages {
        tx.send(m).await.expect("queue inbound");
    }
    drop(tx);
    pipeline(settings, backend, channel).run(rx).await
}

#[tokio::test]
async fn topic_command_is_generated_and_threaded_to_origin() {
    let backend = Arc::new(FakeBackend::default());
    let channel = Arc::new(FakeChannel::default());
    let report = run_messages(
        settings(2, 2),
        &backend,
        &channel,
        vec![message(10, "100", "/topic cats")],
    )
    .await;

    assert_eq!(backend.prompts(), vec!["Write a short story. TOPIC: cats".to_string()]);
    let sent = channel.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].conversation_id, "100");
    assert_eq!(sent[0].reply_to, Some(10));
    assert!(sent[0].text.contains("A story about cats."));
    assert_eq!(report.enqueued, 1);
    assert_eq!(report.generated, 1);
    assert_eq!(report.delivered, 1);
}

#[tokio::test]
async fn empty_argument_gets_notice_without_backend_call() {
    let backend = Arc::new(FakeBackend::default());
    let channel = Arc::new(FakeChannel::default());
    let report = run_messages(
        settings(2, 2),
        &backend,
        &channel,
        vec![message(11, "100", "/phrase ")],
    )
    .await;

    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        channel.sent(),
        vec![Sent {
            conversation_id: "100".to_string(),
            text: NOTICE.to_string(),
            reply_to: Some(11),
        }]
    );
    assert_eq!(report.notices, 1);
    assert_eq!(report.enqueued, 0);
}

#[tokio::test]
async fn non_command_is_ignored() {
    let backend = Arc::new(FakeBackend::default());
    let channel = Arc::new(FakeChannel::default());
    let report = run_messages(
        settings(2, 2),
        &backend,
        &channel,
        vec![message(12, "100", "hello"), message(13, "100", "   ")],
    )
    .await;

    assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    assert!(channel.sent().is_empty());
    assert_eq!(report.received, 2);
    assert_eq!(report.ignored, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_valid_command_gets_exactly_one_matching_reply() {
    let backend = Arc::new(FakeBackend::with_delay(Duration::from_millis(2)));
    let channel = Arc::new(FakeChannel::default());
    let messages: Vec<_> = (0..40)
        .map(|i| message(i, &format!("chat-{}", i % 5), &format!("/topic subject{}", i)))
        .collect();
    run_messages(settings(10, 10), &backend, &channel, messages).await;

    let sent = channel.sent();
    assert_eq!(sent.len(), 40);
    let ids: HashSet<i64> = sent.iter().filter_map(|s| s.reply_to).collect();
    assert_eq!(ids, (0..40).collect::<HashSet<i64>>());
    for s in &sent {
        let id = s.reply_to.expect("threaded");
        assert_eq!(s.conversation_id, format!("chat-{}", id % 5));
        assert_eq!(s.text, format!("A story about subject{}.", id));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn queued_items_survive_explicit_stop() {
    let backend = Arc::new(FakeBackend::with_delay(Duration::from_millis(5)));
    let channel = Arc::new(FakeChannel::default());
    let (tx, rx) = mpsc::channel(64);
    for i in 0..25 {
        tx.send(message(i, "100", &format!("/topic t{}", i)))
            .await
            .expect("queue inbound");
    }
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    stop_tx.send(()).expect("signal stop");

    let pipeline = pipeline(settings(3, 2), &backend, &channel);
    let report = pipeline
        .run_until(rx, async {
            let _ = stop_rx.await;
        })
        .await;

    assert!(tx.send(message(99, "100", "/topic late")).await.is_err());
    assert_eq!(report.enqueued, 25);
    assert_eq!(report.delivered, 25);
    let ids: HashSet<i64> = channel.sent().iter().filter_map(|s| s.reply_to).collect();
    assert_eq!(ids, (0..25).collect::<HashSet<i64>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_worker_and_ten_workers_produce_the_same_replies() {
    let messages = || -> Vec<InboundMessage> {
        (0..30)
            .map(|i| {
                let text = match i % 3 {
                    0 => format!("/topic topic{}", i),
                    1 => format!("/phrase phrase{}", i),
                    _ => "/topic".to_string(),
                };
                message(i, "100", &text)
            })
            .collect()
    };

    let mut results = Vec::new();
    for workers in [1, 10] {
        let backend = Arc::new(FakeBackend::with_delay(Duration::from_millis(1)));
        let channel = Arc::new(FakeChannel::default());
        run_messages(settings(workers, 3), &backend, &channel, messages()).await;
        results.push(channel.sent().into_iter().collect::<HashSet<_>>());
    }
    assert_eq!(results[0].len(), 30);
    assert_eq!(results[0], results[1]);
}

#[tokio::test]
async fn backend_failures_do_not_stop_later_requests() {
    let backend = Arc::new(FakeBackend::default());
    let channel = Arc::new(FakeChannel::default());
    let failure_reply = PipelineSettings::default().failure_reply;
    let report = run_messages(
        settings(1, 1),
        &backend,
        &channel,
        vec![
            message(1, "100", "/topic FAIL"),
            message(2, "100", "/topic PANIC"),
            message(3, "100", "/topic dogs"),
        ],
    )
    .await;

    let mut sent = channel.sent();
    sent.sort_by_key(|s| s.reply_to);
    let texts: Vec<&str> = sent.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(
        texts,
        vec![failure_reply.as_str(), failure_reply.as_str(), "A story about dogs."]
    );
    assert_eq!(report.generation_failures, 2);
    assert_eq!(report.generated, 1);
}

#[tokio::test]
async fn slow_backend_call_times_out_with_apology() {
    let backend = Arc::new(FakeBackend::default());
    let channel = Arc::new(FakeChannel::default());
    let settings = PipelineSettings {
        generate_timeout: Duration::from_millis(50),
        failure_reply: "try again".to_string(),
        ..settings(1, 1)
    };
    let report = run_messages(
        settings,
        &backend,
        &channel,
        vec![message(1, "100", "/topic SLOW"), message(2, "100", "/topic owls")],
    )
    .await;

    let mut sent = channel.sent();
    sent.sort_by_key(|s| s.reply_to);
    assert_eq!(sent[0].text, "try again");
    assert_eq!(sent[1].text, "A story about owls.");
    assert_eq!(report.generation_failures, 1);
}

#[tokio::test]
async fn delivery_failure_does_not_stop_dispatcher() {
    let backend = Arc::new(FakeBackend::default());
    let channel = Arc::new(FakeChannel::failing_for("gone"));
    let report = run_messages(
        settings(1, 1),
        &backend,
        &channel,
        vec![message(1, "gone", "/topic cats"), message(2, "100", "/topic dogs")],
    )
    .await;

    let sent = channel.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].reply_to, Some(2));
    assert_eq!(report.delivery_failures, 1);
    assert_eq!(report.delivered, 1);
}

#[tokio::test]
async fn annotations_name_worker_and_dispatcher_but_not_notices() {
    let backend = Arc::new(FakeBackend::default());
    let channel = Arc::new(FakeChannel::default());
    let settings = PipelineSettings {
        annotate_replies: true,
        ..settings(1, 1)
    };
    run_messages(
        settings,
        &backend,
        &channel,
        vec![message(1, "100", "/topic cats"), message(2, "100", "/topic")],
    )
    .await;

    let mut sent = channel.sent();
    sent.sort_by_key(|s| s.reply_to);
    assert_eq!(
        sent[0].text,
        "A story about cats.\n\nProcessed by worker 1\n\nSent by dispatcher 1"
    );
    assert_eq!(sent[1].text, NOTICE);
}

#[tokio::test]
async fn lifecycle_ends_stopped() {
    let backend = Arc::new(FakeBackend::default());
    let channel = Arc::new(FakeChannel::default());
    let pipeline = pipeline(settings(2, 2), &backend, &channel);
    let state = pipeline.subscribe();
    assert_eq!(*state.borrow(), LifecycleState::Idle);

    let (tx, rx) = mpsc::channel(4);
    tx.send(message(1, "100", "/topic cats")).await.expect("queue inbound");
    drop(tx);
    pipeline.run(rx).await;

    assert_eq!(*state.borrow(), LifecycleState::Stopped);
    assert_eq!(channel.sent().len(), 1);
}
