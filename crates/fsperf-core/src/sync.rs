//! Reusable in-process barrier for the worker threads of one host.

use crate::error::{BenchError, Result};
use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct State {
    arrived: usize,
    generation: u64,
    aborted: bool,
}

/// Cyclic barrier over a fixed number of threads.
///
/// The last thread to arrive in a round becomes its leader: it runs the
/// caller's leader action (the cross-host barrier, when there is one) before
/// anyone is released, so all threads on all hosts leave the round together.
///
/// A failing thread calls [`ThreadSync::abort`] instead of deserting the
/// barrier; every current and future waiter then gets [`BenchError::Aborted`]
/// rather than blocking forever.
#[derive(Debug)]
pub struct ThreadSync {
    parties: usize,
    state: Mutex<State>,
    cvar: Condvar,
}

impl ThreadSync {
    pub fn new(parties: usize) -> Self {
        Self {
            parties: parties.max(1),
            state: Mutex::new(State::default()),
            cvar: Condvar::new(),
        }
    }

    /// Wait until all parties arrive.
    pub fn barrier(&self) -> Result<()> {
        self.barrier_with(|| Ok(()))
    }

    /// Wait until all parties arrive; the last one runs `leader` first.
    ///
    /// An error from `leader` aborts the barrier and is returned to the
    /// leader alone.
    pub fn barrier_with(&self, leader: impl FnOnce() -> Result<()>) -> Result<()> {
        let mut state = self.state.lock();
        if state.aborted {
            return Err(BenchError::Aborted);
        }

        state.arrived += 1;
        if state.arrived == self.parties {
            if let Err(err) = leader() {
                state.aborted = true;
                self.cvar.notify_all();
                return Err(err);
            }
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.cvar.notify_all();
            return Ok(());
        }

        let generation = state.generation;
        while state.generation == generation && !state.aborted {
            self.cvar.wait(&mut state);
        }
        if state.generation == generation {
            Err(BenchError::Aborted)
        } else {
            Ok(())
        }
    }

    /// Release every waiter with [`BenchError::Aborted`]. Idempotent.
    pub fn abort(&self) {
        let mut state = self.state.lock();
        state.aborted = true;
        self.cvar.notify_all();
    }

    pub fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_rounds_release_together() {
        const THREADS: usize = 6;
        const ROUNDS: usize = 50;
        let sync = ThreadSync::new(THREADS);
        let arrivals = AtomicUsize::new(0);
        let leaders = AtomicUsize::new(0);

        thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    for round in 0..ROUNDS {
                        arrivals.fetch_add(1, Ordering::SeqCst);
                        sync.barrier_with(|| {
                            leaders.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .unwrap();
                        assert!(arrivals.load(Ordering::SeqCst) >= (round + 1) * THREADS);
                    }
                });
            }
        });

        assert_eq!(arrivals.load(Ordering::SeqCst), THREADS * ROUNDS);
        assert_eq!(leaders.load(Ordering::SeqCst), ROUNDS);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn every_round_sees_exactly_n_arrivals(parties in 1usize..8, rounds in 1usize..30) {
            let sync = ThreadSync::new(parties);
            let arrivals = AtomicUsize::new(0);

            thread::scope(|s| {
                for _ in 0..parties {
                    s.spawn(|| {
                        for round in 0..rounds {
                            arrivals.fetch_add(1, Ordering::SeqCst);
                            sync.barrier().unwrap();
                            // Nobody can be two rounds ahead of this thread.
                            let seen = arrivals.load(Ordering::SeqCst);
                            assert!(seen >= (round + 1) * parties);
                            assert!(seen < (round + 2) * parties);
                        }
                    });
                }
            });

            prop_assert_eq!(arrivals.load(Ordering::SeqCst), parties * rounds);
            prop_assert!(!sync.is_aborted());
        }
    }

    #[test]
    fn test_single_party_never_blocks() {
        let sync = ThreadSync::new(1);
        for _ in 0..3 {
            sync.barrier().unwrap();
        }
    }

    #[test]
    fn test_abort_releases_waiters() {
        let sync = ThreadSync::new(3);
        thread::scope(|s| {
            let waiters: Vec<_> = (0..2).map(|_| s.spawn(|| sync.barrier())).collect();
            thread::sleep(Duration::from_millis(50));
            sync.abort();
            for waiter in waiters {
                assert!(matches!(waiter.join().unwrap(), Err(BenchError::Aborted)));
            }
        });
        assert!(sync.is_aborted());
        assert!(matches!(sync.barrier(), Err(BenchError::Aborted)));
    }

    #[test]
    fn test_leader_error_goes_to_leader_only() {
        let sync = ThreadSync::new(2);
        let outcomes: Vec<Result<()>> = thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    s.spawn(|| sync.barrier_with(|| Err(BenchError::Protocol("peer gone".into()))))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let primary = outcomes
            .iter()
            .filter(|r| matches!(r, Err(BenchError::Protocol(_))))
            .count();
        let aborted = outcomes
            .iter()
            .filter(|r| matches!(r, Err(BenchError::Aborted)))
            .count();
        assert_eq!((primary, aborted), (1, 1));
    }
}
