//! Bounded single-producer/single-consumer metadata hand-off.
//!
//! One buffer sits between each parser and its owning analyzer. A single
//! mutex serializes producer appends against consumer bulk drains; the
//! critical sections are a constant-time append or one bounded copy. This is
//! deliberately not a lock-free ring: the consumer drains in bulk and the
//! producer must observe the shortened index before its next append.

use std::sync::{Mutex, PoisonError};

use crate::config::MAX_META_PKT_ARR_SIZE;
use crate::error::{Result, WhisperError};
use crate::metadata::MetadataRecord;

pub struct MetadataHandoff {
    inner: Mutex<Vec<MetadataRecord>>,
    capacity: usize,
}

impl MetadataHandoff {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 || capacity > MAX_META_PKT_ARR_SIZE {
            return Err(WhisperError::Allocation(format!(
                "handoff capacity {capacity} outside (0, {MAX_META_PKT_ARR_SIZE}]"
            )));
        }
        Ok(Self { inner: Mutex::new(Vec::with_capacity(capacity)), capacity })
    }

    /// Appends one record. When the write index reaches capacity the buffer
    /// is saturated: it resets to zero, dropping everything accumulated, and
    /// `true` is returned so the producer can warn. Dropping beats blocking
    /// here; the pipeline degrades in throughput, never in liveness.
    pub fn push(&self, rec: MetadataRecord) -> bool {
        let mut buf = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        buf.push(rec);
        if buf.len() == self.capacity {
            buf.clear();
            true
        } else {
            false
        }
    }

    /// Bulk-drains up to `max_fetch` records from the head into `dst`,
    /// bounded also by the free space `dst` has below `dst_capacity`.
    /// The remaining tail keeps FIFO order; the write index shrinks by
    /// exactly the copied count.
    pub fn drain_into(
        &self,
        dst: &mut Vec<MetadataRecord>,
        dst_capacity: usize,
        max_fetch: usize,
    ) -> usize {
        let mut buf = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let fit = dst_capacity.saturating_sub(dst.len());
        let copied = buf.len().min(max_fetch).min(fit);
        dst.extend(buf.drain(..copied));
        copied
    }

    /// Current write index. Only meaningful as a snapshot.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ProtoCode;

    fn rec(n: u32) -> MetadataRecord {
        MetadataRecord::new(n, ProtoCode::TcpSyn, 60, n as f64)
    }

    #[test]
    fn append_increments_write_index() {
        let h = MetadataHandoff::new(8).expect("capacity in range");
        assert!(!h.push(rec(1)));
        assert!(!h.push(rec(2)));
        assert_eq!(h.len(), 2);
        assert!(h.len() <= h.capacity());
    }

    #[test]
    fn saturation_resets_to_zero() {
        let h = MetadataHandoff::new(4).expect("capacity in range");
        for i in 0..3 {
            assert!(!h.push(rec(i)));
        }
        // Fourth append reaches capacity: everything is dropped, not blocked.
        assert!(h.push(rec(3)));
        assert_eq!(h.len(), 0);
    }

    #[test]
    fn drain_takes_head_and_shifts_tail() {
        let h = MetadataHandoff::new(16).expect("capacity in range");
        for i in 0..6 {
            h.push(rec(i));
        }

        let mut dst = Vec::new();
        let copied = h.drain_into(&mut dst, 1024, 4);
        assert_eq!(copied, 4);
        assert_eq!(h.len(), 2);
        assert_eq!(dst.iter().map(|r| r.src_addr).collect::<Vec<_>>(), vec![0, 1, 2, 3]);

        // The tail survived in order; a second drain picks it up from the head.
        let copied = h.drain_into(&mut dst, 1024, 4);
        assert_eq!(copied, 2);
        assert_eq!(h.len(), 0);
        assert_eq!(dst.iter().map(|r| r.src_addr).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn drain_is_bounded_by_destination_space() {
        let h = MetadataHandoff::new(16).expect("capacity in range");
        for i in 0..10 {
            h.push(rec(i));
        }

        let mut dst = vec![rec(100); 6];
        let copied = h.drain_into(&mut dst, 8, 1 << 17);
        assert_eq!(copied, 2);
        assert_eq!(h.len(), 8);
        assert_eq!(dst.len(), 8);
    }

    #[test]
    fn drain_arithmetic_matches_contract() {
        // copied <= min(pre, max_fetch, fit) and post == pre - copied.
        let h = MetadataHandoff::new(64).expect("capacity in range");
        for i in 0..20 {
            h.push(rec(i));
        }
        let pre = h.len();
        let mut dst = Vec::new();
        let copied = h.drain_into(&mut dst, 7, 16);
        assert!(copied <= pre.min(16).min(7));
        assert_eq!(h.len(), pre - copied);
    }

    #[test]
    fn capacity_limits_are_enforced() {
        assert!(MetadataHandoff::new(0).is_err());
        assert!(MetadataHandoff::new(MAX_META_PKT_ARR_SIZE + 1).is_err());
    }
}
