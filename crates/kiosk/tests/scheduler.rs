use kiosk::{
    FrameProducer, FrameTransport, KioskMetrics, SchedulerConfig, TickOutcome,
    TransmissionScheduler,
};
use schema::{IdentityConfig, StreamKind};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Clone)]
struct StubProducer {
    frame: Option<Vec<u8>>,
    calls: Arc<AtomicUsize>,
    /// When set, each encode waits for a permit on this gate.
    gate: Option<Arc<Notify>>,
}

impl StubProducer {
    fn with_frame() -> Self {
        Self {
            frame: Some(vec![0xFF, 0xD8, 0xFF]),
            calls: Arc::new(AtomicUsize::new(0)),
            gate: None,
        }
    }

    fn empty() -> Self {
        Self {
            frame: None,
            ..Self::with_frame()
        }
    }

    fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::with_frame()
        }
    }
}

impl FrameProducer for StubProducer {
    async fn produce(&self, _stream: StreamKind) -> Option<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.frame.clone()
    }
}

#[derive(Clone, Default)]
struct StubTransport {
    frames: Arc<Mutex<Vec<StreamKind>>>,
    configs: Arc<Mutex<Vec<IdentityConfig>>>,
    fail: Arc<AtomicBool>,
}

impl StubTransport {
    fn sent(&self, stream: StreamKind) -> usize {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .filter(|s| **s == stream)
            .count()
    }
}

impl FrameTransport for StubTransport {
    type Error = String;

    async fn send_frame(&self, stream: StreamKind, _bytes: Vec<u8>) -> Result<(), String> {
        if self.fail.load(Ordering::SeqCst) {
            return Err("broker unreachable".to_string());
        }
        self.frames.lock().unwrap().push(stream);
        Ok(())
    }

    async fn send_identity_config(&self, config: IdentityConfig) -> Result<(), String> {
        self.configs.lock().unwrap().push(config);
        Ok(())
    }
}

const IDENTITY: IdentityConfig = IdentityConfig {
    th: 0.6,
    mark: false,
};

fn config() -> SchedulerConfig {
    SchedulerConfig {
        fun_interval: Duration::from_millis(300),
        att_base_interval: Duration::from_millis(3000),
        att_retry_interval: Duration::from_millis(400),
        response_timeout: Duration::from_millis(1000),
    }
}

fn scheduler(
    producer: StubProducer,
    transport: StubTransport,
    config: SchedulerConfig,
) -> Arc<TransmissionScheduler<StubProducer, StubTransport>> {
    TransmissionScheduler::new(
        producer,
        transport,
        config,
        IDENTITY,
        KioskMetrics::new("kiosk-test"),
    )
}

/// Let spawned send tasks run without reaching any timeout.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn tick_is_a_no_op_while_request_in_flight() {
    let transport = StubTransport::default();
    let producer = StubProducer::with_frame();
    let scheduler = scheduler(producer.clone(), transport.clone(), config());
    scheduler.on_connected();

    assert_eq!(scheduler.tick_emotion(), TickOutcome::Started);
    settle().await;
    assert!(scheduler.in_flight(StreamKind::Emotion));

    assert_eq!(scheduler.tick_emotion(), TickOutcome::InFlight);
    assert_eq!(scheduler.tick_emotion(), TickOutcome::InFlight);
    settle().await;
    assert_eq!(transport.sent(StreamKind::Emotion), 1);
    assert_eq!(producer.calls.load(Ordering::SeqCst), 1);

    scheduler.on_result(StreamKind::Emotion);
    settle().await;
    assert!(!scheduler.in_flight(StreamKind::Emotion));
    assert_eq!(scheduler.tick_emotion(), TickOutcome::Started);
}

#[tokio::test(start_paused = true)]
async fn tick_is_a_no_op_while_encode_pending() {
    let gate = Arc::new(Notify::new());
    let transport = StubTransport::default();
    let producer = StubProducer::gated(gate.clone());
    let scheduler = scheduler(producer.clone(), transport.clone(), config());
    scheduler.on_connected();

    assert_eq!(scheduler.tick_emotion(), TickOutcome::Started);
    settle().await;
    assert_eq!(producer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(transport.sent(StreamKind::Emotion), 0);

    assert_eq!(scheduler.tick_emotion(), TickOutcome::InFlight);
    settle().await;
    assert_eq!(producer.calls.load(Ordering::SeqCst), 1);

    gate.notify_one();
    settle().await;
    assert_eq!(transport.sent(StreamKind::Emotion), 1);
    assert!(scheduler.in_flight(StreamKind::Emotion));
    assert_eq!(scheduler.tick_emotion(), TickOutcome::InFlight);
}

#[tokio::test(start_paused = true)]
async fn disconnect_releases_outstanding_guards() {
    let scheduler = scheduler(StubProducer::with_frame(), StubTransport::default(), config());
    scheduler.on_connected();

    assert_eq!(scheduler.tick_emotion(), TickOutcome::Started);
    assert!(scheduler.on_render_pass(true));
    settle().await;
    assert!(scheduler.in_flight(StreamKind::Emotion));
    assert!(scheduler.in_flight(StreamKind::Identity));

    scheduler.on_disconnected();
    settle().await;
    assert!(!scheduler.in_flight(StreamKind::Emotion));
    assert!(!scheduler.in_flight(StreamKind::Identity));

    scheduler.on_connected();
    assert_eq!(scheduler.tick_emotion(), TickOutcome::Started);
}

#[tokio::test(start_paused = true)]
async fn streams_are_guarded_independently() {
    let transport = StubTransport::default();
    let scheduler = scheduler(StubProducer::with_frame(), transport.clone(), config());
    scheduler.on_connected();

    assert_eq!(scheduler.tick_emotion(), TickOutcome::Started);
    assert!(scheduler.on_render_pass(true));
    settle().await;

    assert!(scheduler.in_flight(StreamKind::Emotion));
    assert!(scheduler.in_flight(StreamKind::Identity));

    scheduler.on_result(StreamKind::Identity);
    settle().await;
    assert!(scheduler.in_flight(StreamKind::Emotion));
    assert!(!scheduler.in_flight(StreamKind::Identity));
}

#[tokio::test(start_paused = true)]
async fn failed_send_releases_guard() {
    let transport = StubTransport::default();
    transport.fail.store(true, Ordering::SeqCst);
    let scheduler = scheduler(StubProducer::with_frame(), transport.clone(), config());
    scheduler.on_connected();

    assert_eq!(scheduler.tick_emotion(), TickOutcome::Started);
    settle().await;
    assert!(!scheduler.in_flight(StreamKind::Emotion));
    assert_eq!(transport.sent(StreamKind::Emotion), 0);
    assert_eq!(scheduler.tick_emotion(), TickOutcome::Started);
}

#[tokio::test(start_paused = true)]
async fn missing_frame_releases_guard() {
    let transport = StubTransport::default();
    let producer = StubProducer::empty();
    let scheduler = scheduler(producer.clone(), transport.clone(), config());
    scheduler.on_connected();

    assert_eq!(scheduler.tick_emotion(), TickOutcome::Started);
    settle().await;
    assert!(!scheduler.in_flight(StreamKind::Emotion));
    assert_eq!(producer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(transport.sent(StreamKind::Emotion), 0);
}

#[tokio::test(start_paused = true)]
async fn response_timeout_releases_guard() {
    let scheduler = scheduler(StubProducer::with_frame(), StubTransport::default(), config());
    scheduler.on_connected();

    scheduler.tick_emotion();
    settle().await;
    assert!(scheduler.in_flight(StreamKind::Emotion));

    tokio::time::sleep(Duration::from_millis(990)).await;
    assert!(scheduler.in_flight(StreamKind::Emotion));

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!scheduler.in_flight(StreamKind::Emotion));
}

#[tokio::test(start_paused = true)]
async fn ticks_pause_while_disconnected_hidden_or_stopped() {
    let transport = StubTransport::default();
    let scheduler = scheduler(StubProducer::with_frame(), transport.clone(), config());

    assert_eq!(scheduler.tick_emotion(), TickOutcome::Paused);
    assert!(!scheduler.on_render_pass(true));

    scheduler.on_connected();
    scheduler.set_visible(false);
    assert_eq!(scheduler.tick_emotion(), TickOutcome::Paused);
    assert!(!scheduler.on_render_pass(true));

    scheduler.set_visible(true);
    scheduler.on_disconnected();
    assert_eq!(scheduler.tick_emotion(), TickOutcome::Paused);

    scheduler.on_connected();
    scheduler.shutdown();
    assert_eq!(scheduler.tick_emotion(), TickOutcome::Paused);

    settle().await;
    assert_eq!(transport.sent(StreamKind::Emotion), 0);
    assert_eq!(transport.sent(StreamKind::Identity), 0);
}

#[tokio::test(start_paused = true)]
async fn connecting_sends_identity_config_each_time() {
    let transport = StubTransport::default();
    let scheduler = scheduler(StubProducer::with_frame(), transport.clone(), config());

    scheduler.on_connected();
    settle().await;
    scheduler.on_disconnected();
    scheduler.on_connected();
    settle().await;

    let configs = transport.configs.lock().unwrap().clone();
    assert_eq!(configs, vec![IDENTITY, IDENTITY]);
}

#[tokio::test(start_paused = true)]
async fn identity_push_adapts_to_unmatched_faces() {
    let transport = StubTransport::default();
    let scheduler = scheduler(StubProducer::with_frame(), transport.clone(), config());
    scheduler.on_connected();

    // First render pass always requests an identity frame.
    assert!(scheduler.on_render_pass(false));
    settle().await;
    assert!(scheduler.last_identity_push().is_some());
    scheduler.on_result(StreamKind::Identity);
    settle().await;

    // Unmatched face, but the retry gap has not passed.
    assert!(!scheduler.on_render_pass(true));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(scheduler.on_render_pass(true));
    settle().await;
    scheduler.on_result(StreamKind::Identity);
    settle().await;
    assert_eq!(transport.sent(StreamKind::Identity), 2);

    // Everyone named: only the baseline interval triggers a push.
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert!(!scheduler.on_render_pass(false));
    tokio::time::sleep(Duration::from_millis(2000)).await;
    assert!(scheduler.on_render_pass(false));
    settle().await;
    assert_eq!(transport.sent(StreamKind::Identity), 3);
}

#[tokio::test(start_paused = true)]
async fn identity_push_skips_while_previous_request_outstanding() {
    let transport = StubTransport::default();
    let scheduler = scheduler(StubProducer::with_frame(), transport.clone(), config());
    scheduler.on_connected();

    assert!(scheduler.on_render_pass(true));
    settle().await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!scheduler.on_render_pass(true));
    assert_eq!(transport.sent(StreamKind::Identity), 1);
}

#[tokio::test(start_paused = true)]
async fn emotion_loop_ticks_at_fixed_period() {
    let transport = StubTransport::default();
    let scheduler = scheduler(
        StubProducer::with_frame(),
        transport.clone(),
        SchedulerConfig {
            response_timeout: Duration::from_millis(100),
            ..config()
        },
    );
    scheduler.on_connected();
    settle().await;

    let handle = tokio::spawn(scheduler.clone().run_emotion_loop());
    tokio::time::sleep(Duration::from_millis(950)).await;
    assert_eq!(transport.sent(StreamKind::Emotion), 4);

    scheduler.shutdown();
    handle.await.unwrap();
    assert_eq!(transport.sent(StreamKind::Emotion), 4);
}
