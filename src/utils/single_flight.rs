//! Single-flight resource loading
//!
//! A `SingleFlight<T>` owns a lazily loaded resource. The first caller starts
//! the load; callers arriving while it is in flight await the same shared
//! future and see the same outcome. A failed load leaves the slot empty so a
//! later call can try again.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};

use super::error::LoadError;

type SharedLoad<T> = Shared<BoxFuture<'static, Result<Arc<T>, LoadError>>>;

enum FlightState<T> {
    Empty,
    InFlight(SharedLoad<T>),
    Ready(Arc<T>),
}

/// Lifecycle of the slot as seen from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightStatus {
    Empty,
    Loading,
    Ready,
}

pub struct SingleFlight<T> {
    state: Mutex<FlightState<T>>,
}

impl<T: Send + Sync + 'static> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FlightState::Empty),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FlightState<T>> {
        // The state is a plain enum swap; a poisoned lock still holds a valid value.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The loaded value, if a load has completed successfully
    pub fn get(&self) -> Option<Arc<T>> {
        match &*self.lock() {
            FlightState::Ready(value) => Some(Arc::clone(value)),
            _ => None,
        }
    }

    pub fn status(&self) -> FlightStatus {
        match &*self.lock() {
            FlightState::Empty => FlightStatus::Empty,
            FlightState::InFlight(_) => FlightStatus::Loading,
            FlightState::Ready(_) => FlightStatus::Ready,
        }
    }

    /// Return the loaded value, starting `load` only if nothing is loaded or loading.
    ///
    /// `load` is called at most once per empty slot; every caller that joins
    /// while the load is running receives a clone of its result.
    pub async fn get_or_load<F, Fut>(&self, load: F) -> Result<Arc<T>, LoadError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, LoadError>> + Send + 'static,
    {
        let flight = match self.join_or_start(load) {
            Ok(flight) => flight,
            Err(ready) => return Ok(ready),
        };

        let outcome = flight.clone().await;

        let mut state = self.lock();
        let settles_current =
            matches!(&*state, FlightState::InFlight(current) if current.ptr_eq(&flight));
        // Another caller of the same flight may have settled it first
        let settled_by_peer = match (&*state, &outcome) {
            (FlightState::Ready(stored), Ok(value)) => Arc::ptr_eq(stored, value),
            _ => false,
        };

        if settles_current {
            *state = match &outcome {
                Ok(value) => FlightState::Ready(Arc::clone(value)),
                Err(_) => FlightState::Empty,
            };
        } else if outcome.is_ok() && !settled_by_peer {
            // Reset while loading: the value was never stored
            return Err(LoadError::new("resource", "reset before the load finished"));
        }

        outcome
    }

    fn join_or_start<F, Fut>(&self, load: F) -> Result<SharedLoad<T>, Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, LoadError>> + Send + 'static,
    {
        let mut state = self.lock();
        match &*state {
            FlightState::Ready(value) => Err(Arc::clone(value)),
            FlightState::InFlight(flight) => Ok(flight.clone()),
            FlightState::Empty => {
                let flight = load().map(|result| result.map(Arc::new)).boxed().shared();
                *state = FlightState::InFlight(flight.clone());
                Ok(flight)
            }
        }
    }

    /// Drop the loaded value (or abandon an in-flight load) and return to empty.
    ///
    /// Callers still awaiting an abandoned load get an error, never a value
    /// the slot no longer holds.
    pub fn reset(&self) -> Option<Arc<T>> {
        match std::mem::replace(&mut *self.lock(), FlightState::Empty) {
            FlightState::Ready(value) => Some(value),
            _ => None,
        }
    }
}

impl<T: Send + Sync + 'static> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_load(
        calls: &Arc<AtomicUsize>,
        result: Result<u32, LoadError>,
    ) -> impl Future<Output = Result<u32, LoadError>> + Send + 'static {
        calls.fetch_add(1, Ordering::SeqCst);
        async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            result
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_load() {
        let flight = SingleFlight::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b, c) = tokio::join!(
            flight.get_or_load(|| counting_load(&calls, Ok(7))),
            flight.get_or_load(|| counting_load(&calls, Ok(8))),
            flight.get_or_load(|| counting_load(&calls, Ok(9))),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*a.unwrap(), 7);
        assert_eq!(*b.unwrap(), 7);
        assert_eq!(*c.unwrap(), 7);
        assert_eq!(flight.status(), FlightStatus::Ready);
    }

    #[tokio::test]
    async fn test_ready_value_is_not_reloaded() {
        let flight = SingleFlight::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        flight.get_or_load(|| counting_load(&calls, Ok(1))).await.unwrap();
        let again = flight.get_or_load(|| counting_load(&calls, Ok(2))).await.unwrap();

        assert_eq!(*again, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_shared_then_retryable() {
        let flight = SingleFlight::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let failure = LoadError::new("test model", "missing weights");

        let (a, b) = tokio::join!(
            flight.get_or_load(|| counting_load(&calls, Err(failure.clone()))),
            flight.get_or_load(|| counting_load(&calls, Ok(3))),
        );
        assert_eq!(a.unwrap_err(), failure);
        assert_eq!(b.unwrap_err(), failure);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(flight.status(), FlightStatus::Empty);

        let retried = flight.get_or_load(|| counting_load(&calls, Ok(4))).await;
        assert_eq!(*retried.unwrap(), 4);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_reset_disposes_value() {
        let flight = SingleFlight::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        flight.get_or_load(|| counting_load(&calls, Ok(5))).await.unwrap();
        assert_eq!(flight.reset().as_deref(), Some(&5));
        assert!(flight.get().is_none());
        assert_eq!(flight.status(), FlightStatus::Empty);
    }

    #[tokio::test]
    async fn test_reset_during_load_fails_waiting_callers() {
        let flight = SingleFlight::<u32>::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b, _) = tokio::join!(
            flight.get_or_load(|| counting_load(&calls, Ok(6))),
            flight.get_or_load(|| counting_load(&calls, Ok(7))),
            async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                flight.reset()
            },
        );

        assert!(a.is_err());
        assert!(b.is_err());
        assert_eq!(flight.status(), FlightStatus::Empty);
        assert!(flight.get().is_none());

        let reloaded = flight.get_or_load(|| counting_load(&calls, Ok(8))).await;
        assert_eq!(*reloaded.unwrap(), 8);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
