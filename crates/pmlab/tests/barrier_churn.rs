// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Barrier under membership churn: workers join, acknowledge and leave at
//! random points while a producer cycles generations.

use pmlab::sync::{GenerationBarrier, GenerationWait, Readiness};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const GENERATIONS: u64 = 300;

#[derive(Debug, Default, Clone, Copy)]
struct Churn {
    acknowledged: u64,
    left_pending: u64,
}

fn worker(barrier: Arc<GenerationBarrier>, seed: u64) -> Churn {
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut churn = Churn::default();

    while !barrier.is_shutdown() {
        let (handle, mut last_seen) = barrier.join_participant();
        let lifetime = rng.u32(1..20);

        for _ in 0..lifetime {
            match barrier.wait_for_generation(last_seen) {
                GenerationWait::Advanced(generation) => {
                    if rng.u8(..) < 8 {
                        // Leave while pending
                        churn.left_pending += 1;
                        break;
                    }
                    barrier
                        .acknowledge(handle, generation)
                        .expect("acknowledge open generation");
                    churn.acknowledged += 1;
                    last_seen = generation;
                }
                GenerationWait::TimedOut => {}
                GenerationWait::Shutdown => break,
            }
        }
        barrier.leave_participant(handle);
    }
    churn
}

#[test]
fn test_producer_never_stalls_under_churn() {
    let barrier = Arc::new(GenerationBarrier::with_wait_timeout(Duration::from_millis(
        20,
    )));

    let workers: Vec<_> = (0..6)
        .map(|i| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || worker(barrier, 0x5eed + i))
        })
        .collect();

    // Hold the producer until somebody participates
    let deadline = Instant::now() + Duration::from_secs(5);
    while barrier.alive_count() == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(1));
    }
    assert!(barrier.alive_count() > 0, "no worker joined");

    for expected in 0..GENERATIONS {
        assert_eq!(
            barrier.await_ready(),
            Readiness::Ready {
                generation: expected
            }
        );

        let snap = barrier.snapshot();
        assert!(snap.pending.is_empty());
        assert_eq!(snap.done, snap.active);

        barrier.reset();

        let snap = barrier.snapshot();
        let pending: HashSet<_> = snap.pending.iter().collect();
        let done: HashSet<_> = snap.done.iter().collect();
        let active: HashSet<_> = snap.active.iter().collect();
        assert!(pending.is_disjoint(&done));
        assert_eq!(&pending | &done, active);
    }

    barrier.shutdown();
    let churn: Vec<Churn> = workers
        .into_iter()
        .map(|w| w.join().expect("worker thread"))
        .collect();
    let acknowledged: u64 = churn.iter().map(|c| c.acknowledged).sum();
    let left_pending: u64 = churn.iter().map(|c| c.left_pending).sum();
    assert!(acknowledged > 0, "no worker acknowledged");
    assert!(left_pending > 0, "no worker left while pending");
    assert_eq!(barrier.generation(), GENERATIONS);
}
