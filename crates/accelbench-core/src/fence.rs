//! Host-side fence synchronisation.
//!
//! `signal` only enqueues a marker and returns; `wait_until` is the single
//! blocking point between the host and the device timeline.

use std::fmt;
use std::time::Duration;

use accelbench_backend::{CommandQueue, Fence};
use tracing::trace;

use crate::error::SyncError;

/// How long a fence wait may block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WaitTimeout {
    #[default]
    Infinite,
    Bounded(Duration),
}

impl WaitTimeout {
    /// `None` means wait forever.
    pub fn from_millis(ms: Option<u64>) -> Self {
        ms.map_or(Self::Infinite, |ms| Self::Bounded(Duration::from_millis(ms)))
    }

    pub fn as_duration(self) -> Option<Duration> {
        match self {
            Self::Infinite => None,
            Self::Bounded(d) => Some(d),
        }
    }
}

impl fmt::Display for WaitTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infinite => write!(f, "infinite"),
            Self::Bounded(d) => write!(f, "{}ms", d.as_millis()),
        }
    }
}

/// Tracks the values signaled on one fence and waits for their completion.
#[derive(Debug)]
pub struct FenceSynchronizer {
    fence: Fence,
    last_signaled: u64,
}

impl FenceSynchronizer {
    pub fn new(fence: Fence) -> Self {
        let last_signaled = fence.completed_value();
        Self { fence, last_signaled }
    }

    pub fn fence(&self) -> &Fence {
        &self.fence
    }

    pub fn last_signaled(&self) -> u64 {
        self.last_signaled
    }

    pub fn completed_value(&self) -> u64 {
        self.fence.completed_value()
    }

    /// Enqueue a completion marker at `value` on `queue`. Non-blocking.
    ///
    /// `value` must exceed every value signaled before it.
    pub fn signal(&mut self, queue: &dyn CommandQueue, value: u64) -> Result<(), SyncError> {
        if value <= self.last_signaled {
            return Err(SyncError::NonMonotonic { last: self.last_signaled, requested: value });
        }
        queue.signal(&self.fence, value).map_err(SyncError::Signal)?;
        self.last_signaled = value;
        trace!(fence = self.fence.id(), value, "signaled");
        Ok(())
    }

    /// Block until the fence reaches `value` or `timeout` elapses.
    ///
    /// Returns immediately if `value` was already reached.
    pub fn wait_until(&self, value: u64, timeout: WaitTimeout) -> Result<(), SyncError> {
        if self.fence.wait_for(value, timeout.as_duration()) {
            return Ok(());
        }
        Err(SyncError::Timeout {
            target: value,
            completed: self.fence.completed_value(),
            timeout: timeout.as_duration().unwrap_or(Duration::MAX),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use accelbench_backend::reference::ReferenceBackend;
    use accelbench_backend::{ComputeBackend, FeatureLevel, QueueKind, WorkItem};
    use std::sync::Arc;

    fn setup() -> (ReferenceBackend, Arc<dyn CommandQueue>, FenceSynchronizer) {
        let backend = ReferenceBackend::default_topology();
        let adapter = backend.enumerate_adapters(&[]).unwrap().remove(1);
        let device = backend.create_device(&adapter, FeatureLevel::Core1_0).unwrap();
        let queue = device.create_queue(QueueKind::Compute).unwrap();
        let sync = FenceSynchronizer::new(device.create_fence(0).unwrap());
        (backend, queue, sync)
    }

    #[test]
    fn rejects_non_increasing_values() {
        let (_backend, queue, mut sync) = setup();
        sync.signal(queue.as_ref(), 1).unwrap();
        sync.signal(queue.as_ref(), 2).unwrap();
        assert!(matches!(
            sync.signal(queue.as_ref(), 2),
            Err(SyncError::NonMonotonic { last: 2, requested: 2 })
        ));
        assert!(matches!(
            sync.signal(queue.as_ref(), 1),
            Err(SyncError::NonMonotonic { last: 2, requested: 1 })
        ));
        assert_eq!(sync.last_signaled(), 2);
    }

    #[test]
    fn zero_is_never_a_valid_signal() {
        let (_backend, queue, mut sync) = setup();
        assert!(sync.signal(queue.as_ref(), 0).is_err());
    }

    #[test]
    fn repeated_wait_on_reached_value_succeeds() {
        let (_backend, queue, mut sync) = setup();
        sync.signal(queue.as_ref(), 1).unwrap();
        sync.wait_until(1, WaitTimeout::Infinite).unwrap();
        sync.wait_until(1, WaitTimeout::Infinite).unwrap();
        sync.wait_until(1, WaitTimeout::Bounded(Duration::from_millis(1))).unwrap();
        assert_eq!(sync.fence().wait_count(), 3);
    }

    #[test]
    fn bounded_wait_times_out_on_stuck_device() {
        let (_backend, queue, mut sync) = setup();
        let (release, stuck) = std::sync::mpsc::channel::<()>();
        queue
            .submit(WorkItem::new("stuck", move || {
                let _ = stuck.recv();
            }))
            .unwrap();
        sync.signal(queue.as_ref(), 1).unwrap();

        let err = sync.wait_until(1, WaitTimeout::Bounded(Duration::from_millis(10))).unwrap_err();
        assert!(matches!(err, SyncError::Timeout { target: 1, completed: 0, .. }));

        release.send(()).unwrap();
        sync.wait_until(1, WaitTimeout::Infinite).unwrap();
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(32))]

        #[test]
        fn only_strictly_increasing_signals_are_accepted(
            values in proptest::collection::vec(0u64..20, 1..24),
        ) {
            let (_backend, queue, mut sync) = setup();
            let mut high = 0u64;
            for value in values {
                let accepted = sync.signal(queue.as_ref(), value).is_ok();
                proptest::prop_assert_eq!(accepted, value > high);
                high = high.max(value);
                proptest::prop_assert_eq!(sync.last_signaled(), high);
            }
            sync.wait_until(high, WaitTimeout::Infinite).unwrap();
            proptest::prop_assert_eq!(sync.completed_value(), high);
        }
    }

    #[test]
    fn wait_timeout_from_config() {
        assert_eq!(WaitTimeout::from_millis(None), WaitTimeout::Infinite);
        assert_eq!(
            WaitTimeout::from_millis(Some(250)),
            WaitTimeout::Bounded(Duration::from_millis(250))
        );
        assert_eq!(WaitTimeout::Bounded(Duration::from_millis(250)).to_string(), "250ms");
    }
}
