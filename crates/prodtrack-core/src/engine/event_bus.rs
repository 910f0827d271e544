//! Broadcast channel for lifecycle events.
//!
//! Subscribers such as notification dispatchers receive every event published
//! after a successful commit. A lagging or absent subscriber never blocks the
//! publisher.

use prodtrack_types::LifecycleEvent;
use tokio::sync::broadcast;

/// Cloneable handle to the lifecycle event channel.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
	/// Creates a bus that buffers up to `capacity` events per subscriber.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event, returning the number of subscribers reached.
	///
	/// Errors only when nobody is subscribed; callers ignore that with `.ok()`.
	pub fn publish(
		&self,
		event: LifecycleEvent,
	) -> Result<usize, broadcast::error::SendError<LifecycleEvent>> {
		self.sender.send(event)
	}

	/// Publishes a batch in order.
	pub(crate) fn publish_all(&self, events: impl IntoIterator<Item = LifecycleEvent>) {
		for event in events {
			self.publish(event).ok();
		}
	}
}
