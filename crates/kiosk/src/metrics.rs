use opentelemetry::{KeyValue, global, metrics::Counter};
use schema::StreamKind;

/// Engine counters. Without an installed meter provider these are no-ops.
#[derive(Clone)]
pub struct KioskMetrics {
    frames_sent: Counter<u64>,
    frames_skipped: Counter<u64>,
    send_failures: Counter<u64>,
    render_passes: Counter<u64>,
}

impl KioskMetrics {
    pub fn new(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);

        Self {
            frames_sent: meter
                .u64_counter("kiosk_frames_sent_total")
                .with_description("Frames published to the backend")
                .build(),
            frames_skipped: meter
                .u64_counter("kiosk_frames_skipped_total")
                .with_description("Ticks that produced no frame (encoder not ready or request in flight)")
                .build(),
            send_failures: meter
                .u64_counter("kiosk_send_failures_total")
                .with_description("Frame or config publishes that failed")
                .build(),
            render_passes: meter
                .u64_counter("kiosk_render_passes_total")
                .with_description("Overlay repaints triggered by emotion batches")
                .build(),
        }
    }

    fn stream(stream: StreamKind) -> [KeyValue; 1] {
        [KeyValue::new("stream", stream.as_str())]
    }

    pub fn frame_sent(&self, stream: StreamKind) {
        self.frames_sent.add(1, &Self::stream(stream));
    }

    pub fn frame_skipped(&self, stream: StreamKind) {
        self.frames_skipped.add(1, &Self::stream(stream));
    }

    pub fn send_failed(&self, stream: StreamKind) {
        self.send_failures.add(1, &Self::stream(stream));
    }

    pub fn render_pass(&self) {
        self.render_passes.add(1, &[]);
    }
}
