//! Per-stream transmission state machine.
//!
//! Each stream is `Idle -> Sending -> Idle`, guarded by a [`SingleFlight`].
//! The guard is held from the tick until the stream's result arrives, the
//! send fails, or the response timeout elapses. A busy guard makes the tick a
//! no-op; nothing is queued.

use crate::config::SchedulerConfig;
use crate::metrics::KioskMetrics;
use schema::{IdentityConfig, StreamKind};
use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio::time::{Instant, MissedTickBehavior};

/// Produces the compressed frame for a stream, or `None` when no frame is
/// available this tick.
pub trait FrameProducer: Send + Sync + 'static {
    fn produce(&self, stream: StreamKind) -> impl Future<Output = Option<Vec<u8>>> + Send;
}

/// Outbound half of the event channel.
pub trait FrameTransport: Send + Sync + 'static {
    type Error: Display + Send;

    fn send_frame(
        &self,
        stream: StreamKind,
        bytes: Vec<u8>,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn send_identity_config(
        &self,
        config: IdentityConfig,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Mutual exclusion flag for one stream. Not a queue.
#[derive(Clone, Default)]
pub struct SingleFlight {
    busy: Arc<AtomicBool>,
}

impl SingleFlight {
    pub fn try_acquire(&self) -> Option<FlightPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightPermit {
                busy: self.busy.clone(),
            })
    }

    pub fn in_flight(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the guard on drop, whatever path the send took.
pub struct FlightPermit {
    busy: Arc<AtomicBool>,
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// When to request an identity frame outside the baseline cadence.
#[derive(Debug, Clone)]
pub struct IdentityPushPolicy {
    base_interval: std::time::Duration,
    retry_interval: std::time::Duration,
    last_push: Option<Instant>,
}

impl IdentityPushPolicy {
    pub fn new(base_interval: std::time::Duration, retry_interval: std::time::Duration) -> Self {
        Self {
            base_interval,
            retry_interval,
            last_push: None,
        }
    }

    /// Push when an unnamed face is on screen and the retry gap has passed, or
    /// when the baseline interval has passed regardless.
    pub fn should_push(&self, now: Instant, any_unmatched: bool) -> bool {
        let Some(last) = self.last_push else {
            return true;
        };
        let elapsed = now.saturating_duration_since(last);
        (any_unmatched && elapsed >= self.retry_interval) || elapsed >= self.base_interval
    }

    /// Set on send, not on result arrival.
    pub fn record_push(&mut self, at: Instant) {
        self.last_push = Some(at);
    }

    pub fn last_push(&self) -> Option<Instant> {
        self.last_push
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Guard taken, frame production started.
    Started,
    /// Previous request still outstanding.
    InFlight,
    /// Disconnected, hidden or shut down.
    Paused,
}

struct StreamState {
    flight: SingleFlight,
    results: Notify,
}

impl StreamState {
    fn new() -> Self {
        Self {
            flight: SingleFlight::default(),
            results: Notify::new(),
        }
    }
}

pub struct TransmissionScheduler<P, T> {
    producer: P,
    transport: T,
    config: SchedulerConfig,
    identity_config: IdentityConfig,
    metrics: KioskMetrics,
    emotion: StreamState,
    identity: StreamState,
    policy: Mutex<IdentityPushPolicy>,
    connected: AtomicBool,
    visible: AtomicBool,
    live: AtomicBool,
}

impl<P: FrameProducer, T: FrameTransport> TransmissionScheduler<P, T> {
    pub fn new(
        producer: P,
        transport: T,
        config: SchedulerConfig,
        identity_config: IdentityConfig,
        metrics: KioskMetrics,
    ) -> Arc<Self> {
        Arc::new(Self {
            producer,
            transport,
            identity_config,
            metrics,
            emotion: StreamState::new(),
            identity: StreamState::new(),
            policy: Mutex::new(IdentityPushPolicy::new(
                config.att_base_interval,
                config.att_retry_interval,
            )),
            config,
            connected: AtomicBool::new(false),
            visible: AtomicBool::new(true),
            live: AtomicBool::new(true),
        })
    }

    fn stream(&self, stream: StreamKind) -> &StreamState {
        match stream {
            StreamKind::Emotion => &self.emotion,
            StreamKind::Identity => &self.identity,
        }
    }

    fn policy(&self) -> MutexGuard<'_, IdentityPushPolicy> {
        self.policy
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn in_flight(&self, stream: StreamKind) -> bool {
        self.stream(stream).flight.in_flight()
    }

    pub fn last_identity_push(&self) -> Option<Instant> {
        self.policy().last_push()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn is_active(&self) -> bool {
        self.live.load(Ordering::Acquire)
            && self.connected.load(Ordering::Acquire)
            && self.visible.load(Ordering::Acquire)
    }

    /// Channel (re)connected: resend the identity configuration. Idempotent.
    pub fn on_connected(self: &Arc<Self>) {
        self.connected.store(true, Ordering::Release);

        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.transport.send_identity_config(this.identity_config).await {
                this.metrics.send_failed(StreamKind::Identity);
                tracing::warn!(error = %e, "Failed to send identity config");
            }
        });
    }

    /// Channel lost: results for outstanding requests will never arrive, so
    /// both guards are released now.
    pub fn on_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
        self.emotion.results.notify_waiters();
        self.identity.results.notify_waiters();
    }

    /// While hidden, both loops skip.
    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::Release);
    }

    /// A result for `stream` arrived; the in-flight request is complete.
    pub fn on_result(&self, stream: StreamKind) {
        self.stream(stream).results.notify_waiters();
    }

    /// One emotion-loop tick.
    pub fn tick_emotion(self: &Arc<Self>) -> TickOutcome {
        self.dispatch(StreamKind::Emotion)
    }

    /// Called after every render pass with whether any face stayed unnamed.
    /// Returns whether an identity frame was requested.
    pub fn on_render_pass(self: &Arc<Self>, any_unmatched: bool) -> bool {
        if !self.policy().should_push(Instant::now(), any_unmatched) {
            return false;
        }
        self.dispatch(StreamKind::Identity) == TickOutcome::Started
    }

    fn dispatch(self: &Arc<Self>, stream: StreamKind) -> TickOutcome {
        if !self.is_active() {
            return TickOutcome::Paused;
        }

        let Some(permit) = self.stream(stream).flight.try_acquire() else {
            tracing::trace!(%stream, "Request in flight, skipping tick");
            self.metrics.frame_skipped(stream);
            return TickOutcome::InFlight;
        };

        let this = self.clone();
        tokio::spawn(async move { this.transmit(stream, permit).await });
        TickOutcome::Started
    }

    async fn transmit(&self, stream: StreamKind, permit: FlightPermit) {
        let Some(bytes) = self.producer.produce(stream).await else {
            tracing::trace!(%stream, "No frame available");
            self.metrics.frame_skipped(stream);
            return;
        };

        // Register for the result before sending so a fast reply is not missed.
        let result = self.stream(stream).results.notified();
        tokio::pin!(result);
        result.as_mut().enable();

        let len = bytes.len();
        if let Err(e) = self.transport.send_frame(stream, bytes).await {
            self.metrics.send_failed(stream);
            tracing::debug!(%stream, error = %e, "Frame send failed");
            return;
        }

        self.metrics.frame_sent(stream);
        if stream == StreamKind::Identity {
            self.policy().record_push(Instant::now());
        }
        tracing::trace!(%stream, bytes = len, "Frame sent");

        if tokio::time::timeout(self.config.response_timeout, result)
            .await
            .is_err()
        {
            tracing::debug!(
                %stream,
                timeout_ms = self.config.response_timeout.as_millis() as u64,
                "No result before timeout, releasing guard"
            );
        }

        drop(permit);
    }

    /// Fixed-period emotion loop; returns after [`Self::shutdown`].
    pub async fn run_emotion_loop(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.config.fun_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            period_ms = self.config.fun_interval.as_millis() as u64,
            "Emotion loop started"
        );

        loop {
            interval.tick().await;
            if !self.live.load(Ordering::Acquire) {
                break;
            }
            self.tick_emotion();
        }

        tracing::info!("Emotion loop stopped");
    }

    /// Stop scheduling. In-flight sends finish on their own; waiters are
    /// released immediately.
    pub fn shutdown(&self) {
        self.live.store(false, Ordering::Release);
        self.emotion.results.notify_waiters();
        self.identity.results.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // ==================== SingleFlight ====================

    #[test]
    fn second_acquire_fails_until_release() {
        let flight = SingleFlight::default();
        let permit = flight.try_acquire().expect("first acquire");
        assert!(flight.in_flight());
        assert!(flight.try_acquire().is_none());

        drop(permit);
        assert!(!flight.in_flight());
        assert!(flight.try_acquire().is_some());
    }

    // ==================== IdentityPushPolicy ====================

    fn policy() -> IdentityPushPolicy {
        IdentityPushPolicy::new(Duration::from_millis(5000), Duration::from_millis(400))
    }

    #[tokio::test(start_paused = true)]
    async fn first_render_pass_always_pushes() {
        assert!(policy().should_push(Instant::now(), false));
    }

    #[tokio::test(start_paused = true)]
    async fn unmatched_face_pushes_after_retry_gap() {
        let mut policy = policy();
        let now = Instant::now() + Duration::from_secs(10);
        policy.record_push(now - Duration::from_millis(500));
        assert!(policy.should_push(now, true));
    }

    #[tokio::test(start_paused = true)]
    async fn unmatched_face_waits_for_retry_gap() {
        let mut policy = policy();
        let now = Instant::now() + Duration::from_secs(10);
        policy.record_push(now - Duration::from_millis(399));
        assert!(!policy.should_push(now, true));

        policy.record_push(now - Duration::from_millis(400));
        assert!(policy.should_push(now, true));
    }

    #[tokio::test(start_paused = true)]
    async fn matched_faces_wait_for_base_interval() {
        let mut policy = policy();
        let now = Instant::now() + Duration::from_secs(10);
        policy.record_push(now - Duration::from_millis(1000));
        assert!(!policy.should_push(now, false));

        policy.record_push(now - Duration::from_millis(5000));
        assert!(policy.should_push(now, false));
    }
}
