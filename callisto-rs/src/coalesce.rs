//! Collapses concurrent duplicate loads for a key into a single execution.
//!
//! Whenever a cache miss triggers an expensive load (a peer fetch or a call into the backing
//! store), any number of callers may stumble over the very same missing key at the same time.
//! Without protection, each of them would hammer the backend individually. The
//! [Coalescer](Coalescer) makes sure that for each key at most one load is in flight: the
//! first caller becomes the *leader* and actually performs the work, everyone else arriving
//! while the flight is live simply awaits the leader's result.
//!
//! Internally each flight is a [tokio::sync::watch] channel. The leader keeps the sender and
//! publishes the result exactly once; followers hold a receiver and wait for the value to
//! appear. This construction has a property which a hand-rolled latch would have to fight
//! for: if the leader panics or its future is dropped mid-flight, the sender is dropped and
//! every follower wakes up with a well-defined [Abandoned](Abandoned) error instead of
//! hanging forever.
use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;

use tokio::sync::watch;

/// Signals that the leader of a coalesced flight vanished before publishing a result.
///
/// This happens if the leading future panics or is dropped (e.g. because its caller enforced
/// a timeout). Followers receiving this error are free to simply retry, which will start a
/// fresh flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("the coalesced load was abandoned before a result was produced")]
pub struct Abandoned;

enum Role<T> {
    Leader(watch::Sender<Option<T>>),
    Follower(watch::Receiver<Option<T>>),
}

/// Ensures that per key only a single load is executed at a time.
///
/// The result type only needs to be [Clone] as every waiter receives its own copy - for
/// fallible loads this is typically a `Result` with cloneable error, so that a failure
/// propagates identically to all coalesced callers.
///
/// # Examples
///
/// ```
/// # use callisto::coalesce::Coalescer;
/// # use std::sync::Arc;
/// # use std::sync::atomic::{AtomicUsize, Ordering};
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let coalescer = Arc::new(Coalescer::new());
/// let executions = Arc::new(AtomicUsize::new(0));
///
/// let mut tasks = Vec::new();
/// for _ in 0..10 {
///     let coalescer = coalescer.clone();
///     let executions = executions.clone();
///     tasks.push(tokio::spawn(async move {
///         coalescer
///             .run("answer", async move {
///                 executions.fetch_add(1, Ordering::SeqCst);
///                 tokio::time::sleep(std::time::Duration::from_millis(20)).await;
///                 42
///             })
///             .await
///             .unwrap()
///     }));
/// }
///
/// for task in tasks {
///     assert_eq!(task.await.unwrap(), 42);
/// }
/// assert_eq!(executions.load(Ordering::SeqCst), 1);
/// # }
/// ```
pub struct Coalescer<T> {
    flights: Mutex<HashMap<String, watch::Receiver<Option<T>>>>,
}

impl<T: Clone> Coalescer<T> {
    /// Creates a new coalescer with no flights in progress.
    pub fn new() -> Self {
        Coalescer {
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Executes the given work for the given key, unless a flight for this key is already
    /// live - in which case the result of that flight is awaited and returned instead.
    ///
    /// Once a flight has published its result and was cleaned up, the next call for the same
    /// key starts over with a fresh execution. The flight map mutex is only ever held for
    /// map operations, never while the work itself is running.
    pub async fn run<F>(&self, key: &str, work: F) -> Result<T, Abandoned>
    where
        F: Future<Output = T>,
    {
        let role = {
            let mut flights = self.flights.lock().unwrap();
            match flights.get(key) {
                Some(receiver) => Role::Follower(receiver.clone()),
                None => {
                    let (sender, receiver) = watch::channel(None);
                    let _ = flights.insert(key.to_owned(), receiver);
                    Role::Leader(sender)
                }
            }
        };

        match role {
            Role::Follower(mut receiver) => {
                // wait_for also inspects the current value, so a follower joining after the
                // leader published (but before cleanup removed the flight) sees the result
                // immediately. An Err means the sender is gone without a result.
                match receiver.wait_for(|result| result.is_some()).await {
                    Ok(result) => Ok(result.clone().expect("checked by wait_for")),
                    Err(_) => Err(Abandoned),
                }
            }
            Role::Leader(sender) => {
                // The guard removes the flight when this future completes - or unwinds.
                let _cleanup = FlightGuard {
                    flights: &self.flights,
                    key,
                };

                let result = work.await;
                let _ = sender.send(Some(result.clone()));

                Ok(result)
            }
        }
    }
}

impl<T: Clone> Default for Coalescer<T> {
    fn default() -> Self {
        Coalescer::new()
    }
}

/// Removes a flight from the map once its leader is done with it.
///
/// Being a Drop guard, this also runs when the leading future panics or is dropped, so no
/// torn flight can ever shadow future loads for its key.
struct FlightGuard<'a, T> {
    flights: &'a Mutex<HashMap<String, watch::Receiver<Option<T>>>>,
    key: &'a str,
}

impl<T> Drop for FlightGuard<'_, T> {
    fn drop(&mut self) {
        // Never panic during an unwind - a poisoned map is drained on a best effort basis.
        if let Ok(mut flights) = self.flights.lock() {
            let _ = flights.remove(self.key);
        }
    }
}
