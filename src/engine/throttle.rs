use std::time::Instant;

use tracing::debug;

use crate::config::ThrottleInterval;
use crate::state::record::UpdatePayload;

/// Coalesces update batches into at most one flush per interval.
///
/// Trailing-edge: the first batch accepted while idle arms a deadline one
/// interval later, and every batch accepted before that deadline is
/// concatenated, in arrival order, into the same flush.
#[derive(Debug)]
pub struct ThrottleScheduler {
    interval: ThrottleInterval,
    pending: Vec<UpdatePayload>,
    pending_batches: usize,
    armed_at: Option<Instant>,
}

impl ThrottleScheduler {
    pub fn new(interval: ThrottleInterval) -> Self {
        Self {
            interval,
            pending: Vec::new(),
            pending_batches: 0,
            armed_at: None,
        }
    }

    pub fn interval(&self) -> ThrottleInterval {
        self.interval
    }

    pub fn schedule(&mut self, batch: Vec<UpdatePayload>, now: Instant) {
        self.armed_at.get_or_insert(now);
        self.pending.extend(batch);
        self.pending_batches += 1;
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.armed_at.map(|armed| armed + self.interval.as_duration())
    }

    /// Hands back the accumulated payloads once the deadline has passed.
    pub fn poll_flush(&mut self, now: Instant) -> Option<Vec<UpdatePayload>> {
        let deadline = self.deadline()?;
        if now < deadline {
            return None;
        }

        debug!(
            batches = self.pending_batches,
            payloads = self.pending.len(),
            "throttle flush"
        );
        self.armed_at = None;
        self.pending_batches = 0;
        Some(std::mem::take(&mut self.pending))
    }

    /// Re-times the armed deadline from when it was armed; pending batches stay.
    pub fn set_interval(&mut self, interval: ThrottleInterval) {
        if interval != self.interval {
            debug!(from = %self.interval, to = %interval, pending = self.pending_batches, "throttle interval changed");
            self.interval = interval;
        }
    }

    /// Drops pending work. Idempotent, and harmless after a flush already fired.
    pub fn cancel(&mut self) -> usize {
        let dropped = self.pending_batches;
        if dropped > 0 {
            debug!(batches = dropped, "throttle cancelled with pending batches");
        }
        self.pending.clear();
        self.pending_batches = 0;
        self.armed_at = None;
        dropped
    }

    pub fn is_idle(&self) -> bool {
        self.armed_at.is_none()
    }

    pub fn pending_batches(&self) -> usize {
        self.pending_batches
    }
}

impl Drop for ThrottleScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::record::Fields;
    use serde_json::json;
    use std::time::Duration;

    fn price(id: i64, price: i64) -> UpdatePayload {
        let mut fields = Fields::new();
        fields.insert("Price".to_string(), json!(price));
        UpdatePayload::new(id, fields)
    }

    #[test]
    fn test_coalesces_batches_in_arrival_order() {
        let start = Instant::now();
        let mut throttle = ThrottleScheduler::new(ThrottleInterval::Ms1000);

        for i in 0..5 {
            throttle.schedule(vec![price(1, i)], start + Duration::from_millis(i as u64 * 100));
        }
        assert_eq!(throttle.pending_batches(), 5);
        assert!(throttle.poll_flush(start + Duration::from_millis(999)).is_none());

        let flushed = throttle.poll_flush(start + Duration::from_millis(1_001)).unwrap();
        let prices: Vec<_> = flushed.iter().map(|p| p.fields["Price"].clone()).collect();
        assert_eq!(prices, vec![json!(0), json!(1), json!(2), json!(3), json!(4)]);

        assert!(throttle.is_idle());
        assert!(throttle.poll_flush(start + Duration::from_secs(10)).is_none());
    }

    #[test]
    fn test_deadline_armed_by_first_batch() {
        let start = Instant::now();
        let mut throttle = ThrottleScheduler::new(ThrottleInterval::Ms500);
        assert!(throttle.deadline().is_none());

        throttle.schedule(vec![], start);
        throttle.schedule(vec![], start + Duration::from_millis(400));
        assert_eq!(throttle.deadline(), Some(start + Duration::from_millis(500)));
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let start = Instant::now();
        let mut throttle = ThrottleScheduler::new(ThrottleInterval::Ms100);

        assert_eq!(throttle.cancel(), 0);
        throttle.schedule(vec![price(1, 1)], start);
        assert_eq!(throttle.cancel(), 1);
        assert_eq!(throttle.cancel(), 0);
        assert!(throttle.poll_flush(start + Duration::from_secs(1)).is_none());
    }

    #[test]
    fn test_cancel_after_flush_is_harmless() {
        let start = Instant::now();
        let mut throttle = ThrottleScheduler::new(ThrottleInterval::Ms100);
        throttle.schedule(vec![price(1, 1)], start);

        assert!(throttle.poll_flush(start + Duration::from_millis(100)).is_some());
        assert_eq!(throttle.cancel(), 0);
    }

    #[test]
    fn test_interval_change_keeps_pending() {
        let start = Instant::now();
        let mut throttle = ThrottleScheduler::new(ThrottleInterval::Ms5000);
        throttle.schedule(vec![price(1, 1)], start);
        throttle.schedule(vec![price(2, 2)], start + Duration::from_millis(50));

        throttle.set_interval(ThrottleInterval::Ms100);
        assert_eq!(throttle.deadline(), Some(start + Duration::from_millis(100)));

        let flushed = throttle.poll_flush(start + Duration::from_millis(100)).unwrap();
        assert_eq!(flushed.len(), 2);
        assert!(throttle.poll_flush(start + Duration::from_secs(6)).is_none());
    }
}
