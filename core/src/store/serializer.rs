//! FIFO single-flight execution of store access.

use std::future::Future;

use tokio::sync::Mutex;

/// Owns the queue that totally orders every store read and update.
///
/// `dispatch` runs the given unit of work only after all previously dispatched
/// work has completed; no two units ever run concurrently. The fairness of
/// `tokio::sync::Mutex` (waiters are woken in FIFO order) is what gives the
/// strict submission-order guarantee.
///
/// There is deliberately no timeout, cancellation or priority: a unit of work
/// that never resolves stalls every later transaction. This also only
/// serializes access within one process; two server instances sharing a
/// library root are not protected.
#[derive(Debug, Default)]
pub struct StoreSerializer {
	gate: Mutex<()>,
}

impl StoreSerializer {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn dispatch<T, F, Fut>(&self, work: F) -> T
	where
		F: FnOnce() -> Fut,
		Fut: Future<Output = T>,
	{
		let _guard = self.gate.lock().await;
		work().await
	}
}
