//! Ordering guarantees of the reference accelerator's device timeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use accelbench_backend::reference::{FailPoint, ReferenceBackend};
use accelbench_backend::{
    AdapterAttribute, BackendError, CommandQueue, ComputeBackend, ComputeDevice, FeatureLevel,
    QueueKind, WorkItem,
};
use proptest::prelude::*;

fn compute_queue(backend: &ReferenceBackend) -> (Arc<dyn ComputeDevice>, Arc<dyn CommandQueue>) {
    let adapter = backend
        .enumerate_adapters(&[AdapterAttribute::CoreCompute])
        .unwrap()
        .into_iter()
        .find(|a| a.is_compute_only())
        .unwrap();
    let device = backend.create_device(&adapter, FeatureLevel::Core1_0).unwrap();
    let queue = device.create_queue(QueueKind::Compute).unwrap();
    (device, queue)
}

#[test]
fn work_executes_in_submission_order() {
    let backend = ReferenceBackend::default_topology();
    let (device, queue) = compute_queue(&backend);
    let fence = device.create_fence(0).unwrap();
    let log = Arc::new(Mutex::new(Vec::new()));

    for i in 0..50 {
        let log = Arc::clone(&log);
        queue
            .submit(WorkItem::new(format!("item-{i}"), move || log.lock().unwrap().push(i)))
            .unwrap();
    }
    queue.signal(&fence, 1).unwrap();
    assert!(fence.wait_for(1, Some(Duration::from_secs(5))));

    assert_eq!(*log.lock().unwrap(), (0..50).collect::<Vec<_>>());
}

#[test]
fn submit_returns_before_work_completes() {
    let backend = ReferenceBackend::default_topology();
    let (device, queue) = compute_queue(&backend);
    let fence = device.create_fence(0).unwrap();

    let gate = Arc::new(Mutex::new(()));
    let held = gate.lock().unwrap();
    let inner = Arc::clone(&gate);
    queue.submit(WorkItem::new("blocked", move || drop(inner.lock().unwrap()))).unwrap();
    queue.signal(&fence, 1).unwrap();

    // The device is stuck behind the gate, so the fence cannot have moved.
    assert!(!fence.wait_for(1, Some(Duration::from_millis(20))));
    assert_eq!(fence.completed_value(), 0);

    drop(held);
    assert!(fence.wait_for(1, Some(Duration::from_secs(5))));
}

#[test]
fn dropping_queue_drains_outstanding_work() {
    let backend = ReferenceBackend::default_topology();
    let (_device, queue) = compute_queue(&backend);
    let ran = Arc::new(AtomicUsize::new(0));
    for _ in 0..10 {
        let ran = Arc::clone(&ran);
        queue
            .submit(WorkItem::new("tick", move || {
                thread::sleep(Duration::from_millis(1));
                ran.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
    }
    drop(queue);
    assert_eq!(ran.load(Ordering::SeqCst), 10);
    assert_eq!(backend.live_queues(), 0);
}

#[test]
fn submit_fail_point_rejects_work() {
    let backend = ReferenceBackend::builder()
        .adapter("npu", false, true)
        .fail_at(FailPoint::Submit)
        .build();
    let (_device, queue) = compute_queue(&backend);
    let err = queue.submit(WorkItem::new("never", || {})).unwrap_err();
    assert!(matches!(err, BackendError::CallFailed { .. }));
    assert_eq!(backend.submissions(), 0);
}

#[test]
fn queues_have_independent_timelines() {
    let backend = ReferenceBackend::default_topology();
    let (device, first) = compute_queue(&backend);
    let second = device.create_queue(QueueKind::Compute).unwrap();
    let fence_a = device.create_fence(0).unwrap();
    let fence_b = device.create_fence(0).unwrap();

    let gate = Arc::new(Mutex::new(()));
    let held = gate.lock().unwrap();
    let inner = Arc::clone(&gate);
    first.submit(WorkItem::new("blocked", move || drop(inner.lock().unwrap()))).unwrap();
    first.signal(&fence_a, 1).unwrap();
    second.signal(&fence_b, 1).unwrap();

    assert!(fence_b.wait_for(1, Some(Duration::from_secs(5))));
    assert_eq!(fence_a.completed_value(), 0);
    drop(held);
    assert!(fence_a.wait_for(1, Some(Duration::from_secs(5))));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// After waiting on value `v`, every item tagged at or below `v` has run.
    #[test]
    fn wait_implies_completion(batches in prop::collection::vec(1usize..4, 1..8)) {
        let backend = ReferenceBackend::default_topology();
        let (device, queue) = compute_queue(&backend);
        let fence = device.create_fence(0).unwrap();
        let completed = Arc::new(Mutex::new(Vec::<u64>::new()));

        for (idx, count) in batches.iter().enumerate() {
            let tag = idx as u64 + 1;
            for _ in 0..*count {
                let completed = Arc::clone(&completed);
                queue
                    .submit(WorkItem::new("tagged", move || completed.lock().unwrap().push(tag)))
                    .unwrap();
            }
            queue.signal(&fence, tag).unwrap();
        }

        for tag in 1..=batches.len() as u64 {
            prop_assert!(fence.wait_for(tag, Some(Duration::from_secs(5))));
            let expected: usize = batches[..tag as usize].iter().sum();
            let done = completed.lock().unwrap().iter().filter(|t| **t <= tag).count();
            prop_assert_eq!(done, expected);
        }
    }
}
