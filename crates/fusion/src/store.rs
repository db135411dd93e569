use geometry::Size;
use schema::{EmotionResult, IdentityResult};

pub const DEFAULT_MAX_IDENTITY_AGE_MS: u64 = 1800;

/// A result set together with the moment it arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultBatch<T> {
    /// Engine clock (milliseconds) at arrival.
    pub received_at_ms: u64,
    /// Capture surface the boxes are expressed in.
    pub frame_size: Size,
    pub items: Vec<T>,
}

impl<T> ResultBatch<T> {
    pub fn new(received_at_ms: u64, frame_size: Size, items: Vec<T>) -> Self {
        Self {
            received_at_ms,
            frame_size,
            items,
        }
    }

    /// Age at `now_ms`. Batches stamped in the future count as brand new.
    #[inline]
    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.received_at_ms)
    }
}

/// Latest batch per stream. Each record replaces the previous batch wholesale,
/// including when an older response arrives after a newer one.
#[derive(Debug, Default)]
pub struct ResultStore {
    identity: Option<ResultBatch<IdentityResult>>,
    emotion: Option<ResultBatch<EmotionResult>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_identity(&mut self, batch: ResultBatch<IdentityResult>) {
        self.identity = Some(batch);
    }

    pub fn record_emotion(&mut self, batch: ResultBatch<EmotionResult>) {
        self.emotion = Some(batch);
    }

    pub fn identity(&self) -> Option<&ResultBatch<IdentityResult>> {
        self.identity.as_ref()
    }

    pub fn emotion(&self) -> Option<&ResultBatch<EmotionResult>> {
        self.emotion.as_ref()
    }

    /// Identity batch if it is no older than `max_age_ms` (inclusive).
    pub fn fresh_identity_batch(
        &self,
        now_ms: u64,
        max_age_ms: u64,
    ) -> Option<&ResultBatch<IdentityResult>> {
        self.identity
            .as_ref()
            .filter(|batch| batch.age_ms(now_ms) <= max_age_ms)
    }

    /// Identity items if fresh, otherwise an empty slice.
    pub fn fresh_identity(&self, now_ms: u64, max_age_ms: u64) -> &[IdentityResult] {
        self.fresh_identity_batch(now_ms, max_age_ms)
            .map(|batch| batch.items.as_slice())
            .unwrap_or(&[])
    }

    pub fn clear(&mut self) {
        self.identity = None;
        self.emotion = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geometry::DetectionBox;

    fn identity(label: &str) -> IdentityResult {
        IdentityResult {
            bounds: DetectionBox::new(0.0, 0.0, 10.0, 10.0),
            label: Some(label.to_string()),
            score: 0.9,
        }
    }

    fn batch_at(received_at_ms: u64, labels: &[&str]) -> ResultBatch<IdentityResult> {
        ResultBatch::new(
            received_at_ms,
            Size::new(320, 240),
            labels.iter().map(|l| identity(l)).collect(),
        )
    }

    #[test]
    fn empty_store_has_nothing_fresh() {
        let store = ResultStore::new();
        assert!(store.fresh_identity(1_000, DEFAULT_MAX_IDENTITY_AGE_MS).is_empty());
    }

    #[test]
    fn staleness_boundary_is_inclusive() {
        let now = 10_000;
        let mut store = ResultStore::new();

        store.record_identity(batch_at(now - 1800, &["alice"]));
        assert_eq!(store.fresh_identity(now, 1800).len(), 1);

        store.record_identity(batch_at(now - 1801, &["alice"]));
        assert!(store.fresh_identity(now, 1800).is_empty());
    }

    #[test]
    fn record_replaces_whole_batch() {
        let mut store = ResultStore::new();
        store.record_identity(batch_at(100, &["alice", "bob"]));
        store.record_identity(batch_at(200, &["carol"]));

        let items = store.fresh_identity(200, 1800);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].label.as_deref(), Some("carol"));
    }

    #[test]
    fn out_of_order_arrival_still_becomes_latest() {
        let mut store = ResultStore::new();
        store.record_identity(batch_at(500, &["newer"]));
        store.record_identity(batch_at(300, &["older"]));

        assert_eq!(store.identity().unwrap().items[0].label.as_deref(), Some("older"));
    }

    #[test]
    fn future_timestamp_counts_as_fresh() {
        let mut store = ResultStore::new();
        store.record_identity(batch_at(5_000, &["alice"]));
        assert_eq!(store.fresh_identity(4_000, 0).len(), 1);
    }

    #[test]
    fn clear_drops_both_streams() {
        let mut store = ResultStore::new();
        store.record_identity(batch_at(0, &["alice"]));
        store.record_emotion(ResultBatch::new(0, Size::new(320, 240), Vec::new()));
        store.clear();
        assert!(store.identity().is_none());
        assert!(store.emotion().is_none());
    }
}
