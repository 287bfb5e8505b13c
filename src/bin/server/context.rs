use encore::announce::Announcement;
use encore::context::AppContext;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct ServerState {
	pub ctx: &'static AppContext,
	/// Rendered announcements for whatever chat transport is attached.
	/// Sends into the void are logged as delivery failures, never dropped
	/// silently.
	pub announcements: broadcast::Sender<Announcement>,
}

impl ServerState {
	pub fn new(ctx: &'static AppContext) -> Self {
		let (announcements, _) = broadcast::channel(64);
		Self { ctx, announcements }
	}

	pub fn publish(&self, announcement: Announcement) {
		match self.announcements.send(announcement) {
			Ok(receivers) => {
				tracing::debug!(receivers, "Announcement published");
			}
			Err(failed) => {
				tracing::warn!(
					title = failed.0.title,
					"Announcement delivery failed: no transport attached"
				);
			}
		}
	}
}
