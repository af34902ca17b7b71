use std::sync::{Arc, Mutex, PoisonError};

/// Thread-safe holder of one device's latest telemetry.
///
/// Protocol callbacks and the frame-poll path share a cell through cheap
/// clones. Closures passed to [`StateCell::with`] run under the lock and must
/// only copy data in or out: no transforms, no pumping, no host emission.
pub struct StateCell<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Clone for StateCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> StateCell<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(value)),
        }
    }

    /// Run `f` with exclusive access to the state.
    ///
    /// A lock poisoned by a panicking callback is recovered; the state is plain
    /// telemetry that stays consistent field by field.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|poisoned| {
            log::warn!("Device state lock poisoned, recovering");
            PoisonError::into_inner(poisoned)
        });
        f(&mut guard)
    }
}

impl<T: Clone> StateCell<T> {
    /// Copy of the whole state.
    pub fn snapshot(&self) -> T {
        self.with(|state| state.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let cell = StateCell::new(Vec::<u32>::new());
        let writer = cell.clone();
        writer.with(|v| v.push(7));
        assert_eq!(cell.snapshot(), vec![7]);
    }

    #[test]
    fn test_concurrent_writers() {
        let cell = StateCell::new(0u64);
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let cell = cell.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        cell.with(|n| *n += 1);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(cell.snapshot(), 4000);
    }

    #[test]
    fn test_recovers_from_poisoned_lock() {
        let cell = StateCell::new(1u32);
        let poisoner = cell.clone();
        let _ = std::thread::spawn(move || {
            poisoner.with(|_| panic!("callback panicked"));
        })
        .join();
        assert_eq!(cell.with(|n| *n + 1), 2);
    }
}
