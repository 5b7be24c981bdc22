//! CPU-GPU synchronization.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Status of a fence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FenceStatus {
    /// The GPU work guarded by the fence is still pending.
    Unsignaled,
    /// The GPU work is complete.
    Signaled,
}

/// Signaled by the backend once a frame's submitted work has completed.
///
/// Cloning a fence shares the underlying flag, so the backend can keep one
/// copy to signal while the frame ring waits on another.
#[derive(Debug, Clone)]
pub struct Fence {
    signaled: Arc<AtomicBool>,
}

impl Fence {
    pub fn new_unsignaled() -> Self {
        Self {
            signaled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn new_signaled() -> Self {
        Self {
            signaled: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn status(&self) -> FenceStatus {
        if self.signaled.load(Ordering::Acquire) {
            FenceStatus::Signaled
        } else {
            FenceStatus::Unsignaled
        }
    }

    pub fn is_signaled(&self) -> bool {
        self.status() == FenceStatus::Signaled
    }

    /// Block until the fence is signaled.
    pub fn wait(&self) {
        while !self.signaled.load(Ordering::Acquire) {
            std::thread::yield_now();
        }
    }

    /// Returns `false` if `timeout` elapsed first.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        while !self.signaled.load(Ordering::Acquire) {
            if start.elapsed() >= timeout {
                return false;
            }
            std::thread::yield_now();
        }
        true
    }

    pub fn signal(&self) {
        self.signaled.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fence_signal_shared_between_clones() {
        let fence = Fence::new_unsignaled();
        let backend_copy = fence.clone();
        assert_eq!(fence.status(), FenceStatus::Unsignaled);

        backend_copy.signal();
        assert!(fence.is_signaled());
        fence.wait();
    }

    #[test]
    fn test_fence_wait_timeout() {
        let fence = Fence::new_unsignaled();
        assert!(!fence.wait_timeout(Duration::from_millis(1)));
        assert!(Fence::new_signaled().wait_timeout(Duration::from_millis(1)));
    }

    #[test]
    fn test_fence_signaled_from_thread() {
        let fence = Fence::new_unsignaled();
        let remote = fence.clone();
        let handle = std::thread::spawn(move || remote.signal());
        fence.wait();
        handle.join().unwrap();
        assert!(fence.is_signaled());
    }
}
