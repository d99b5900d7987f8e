//! One-time lazy resolution
//!
//! `LazyResolved<T>` runs an expensive resolution body exactly once, on
//! whichever thread gets there first. Racing callers block until it is
//! done; later callers read the published value without blocking.
//!
//! # States
//!
//! ```text
//! Uninitialized ──► Resolving ──► Resolved   (value published)
//!                            └──► Failed     (permanent, never retried)
//! any ──► TornDown                           (process detach, not re-enterable)
//! ```

use crate::error::ResolveError;
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::warn;

const UNINITIALIZED: u8 = 0;
const RESOLVING: u8 = 1;
const RESOLVED: u8 = 2;
const FAILED: u8 = 3;
const TORN_DOWN: u8 = 4;

/// Observable lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LazyPhase {
    Uninitialized,
    Resolving,
    Resolved,
    Failed,
    TornDown,
}

impl LazyPhase {
    /// Resolution has finished, successfully or not
    pub fn is_settled(&self) -> bool {
        matches!(self, LazyPhase::Resolved | LazyPhase::Failed)
    }
}

/// A value resolved at most once, published to every thread
pub struct LazyResolved<T> {
    /// Advisory phase flag; the cell is the source of truth for the value
    phase: AtomicU8,
    /// `Some` on success, `None` after a failed attempt
    cell: OnceCell<Option<T>>,
}

impl<T> LazyResolved<T> {
    pub const fn new() -> Self {
        Self {
            phase: AtomicU8::new(UNINITIALIZED),
            cell: OnceCell::new(),
        }
    }

    /// Get the value, running `resolve` if nobody has yet
    ///
    /// Exactly one caller runs `resolve`; every other caller blocks until
    /// it returns. A failure is remembered and `resolve` is never run again.
    pub fn get_or_resolve<F>(&self, resolve: F) -> Option<&T>
    where
        F: FnOnce() -> Result<T, ResolveError>,
    {
        if self.phase.load(Ordering::Acquire) == TORN_DOWN {
            return None;
        }

        self.cell
            .get_or_init(|| {
                self.phase.store(RESOLVING, Ordering::Release);
                match resolve() {
                    Ok(value) => {
                        self.phase.store(RESOLVED, Ordering::Release);
                        Some(value)
                    }
                    Err(e) => {
                        warn!("One-time resolution failed, staying unavailable: {}", e);
                        self.phase.store(FAILED, Ordering::Release);
                        None
                    }
                }
            })
            .as_ref()
    }

    /// Get the value without triggering resolution
    pub fn get(&self) -> Option<&T> {
        if self.phase.load(Ordering::Acquire) == TORN_DOWN {
            return None;
        }
        self.cell.get().and_then(Option::as_ref)
    }

    pub fn phase(&self) -> LazyPhase {
        match self.phase.load(Ordering::Acquire) {
            UNINITIALIZED => LazyPhase::Uninitialized,
            RESOLVING => LazyPhase::Resolving,
            RESOLVED => LazyPhase::Resolved,
            FAILED => LazyPhase::Failed,
            _ => LazyPhase::TornDown,
        }
    }

    /// Stop handing out the value; nothing is resolved after this
    pub fn mark_torn_down(&self) {
        self.phase.store(TORN_DOWN, Ordering::Release);
    }
}

impl<T> Default for LazyResolved<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::time::Duration;

    #[test]
    fn test_resolves_once() {
        let lazy = LazyResolved::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = lazy.get_or_resolve(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(42)
            });
            assert_eq!(value, Some(&42));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(lazy.phase(), LazyPhase::Resolved);
    }

    #[test]
    fn test_failure_is_permanent() {
        let lazy: LazyResolved<u32> = LazyResolved::new();
        let calls = AtomicUsize::new(0);

        let first = lazy.get_or_resolve(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ResolveError::SystemDirectory("test".into()))
        });
        assert!(first.is_none());

        let second = lazy.get_or_resolve(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        });
        assert!(second.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(lazy.phase(), LazyPhase::Failed);
    }

    #[test]
    fn test_get_does_not_resolve() {
        let lazy: LazyResolved<u32> = LazyResolved::new();
        assert!(lazy.get().is_none());
        assert_eq!(lazy.phase(), LazyPhase::Uninitialized);

        lazy.get_or_resolve(|| Ok(1));
        assert_eq!(lazy.get(), Some(&1));
    }

    #[test]
    fn test_torn_down_is_not_reentrant() {
        let lazy = LazyResolved::new();
        lazy.get_or_resolve(|| Ok(5));
        lazy.mark_torn_down();

        assert!(lazy.get().is_none());
        assert!(lazy.get_or_resolve(|| Ok(6)).is_none());
        assert_eq!(lazy.phase(), LazyPhase::TornDown);

        let never_used: LazyResolved<u32> = LazyResolved::new();
        never_used.mark_torn_down();
        assert!(never_used.get_or_resolve(|| Ok(1)).is_none());
    }

    #[test]
    fn test_concurrent_first_use() {
        const THREADS: usize = 16;
        let lazy = LazyResolved::new();
        let calls = AtomicUsize::new(0);
        let barrier = Barrier::new(THREADS);

        let seen: Vec<Option<u64>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        lazy.get_or_resolve(|| {
                            calls.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(Duration::from_millis(20));
                            Ok(0xABCD_u64)
                        })
                        .copied()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(seen.iter().all(|v| *v == Some(0xABCD)));
    }

    #[test]
    fn test_concurrent_first_use_failure() {
        const THREADS: usize = 16;
        let lazy: LazyResolved<u64> = LazyResolved::new();
        let calls = AtomicUsize::new(0);
        let barrier = Barrier::new(THREADS);

        let seen: Vec<Option<u64>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        lazy.get_or_resolve(|| {
                            calls.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(Duration::from_millis(20));
                            Err(ResolveError::SystemDirectory("unavailable".into()))
                        })
                        .copied()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(seen.iter().all(Option::is_none));
        assert_eq!(lazy.phase(), LazyPhase::Failed);
    }
}
