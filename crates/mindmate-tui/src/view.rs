use mindmate_core::{ViewPort, ViewUpdate};
use tokio::sync::mpsc;

use crate::tui::AppEvent;

/// Forwards client view updates into the terminal event loop
pub struct ChannelView {
    tx: mpsc::UnboundedSender<AppEvent>,
}

impl ChannelView {
    pub fn new(tx: mpsc::UnboundedSender<AppEvent>) -> Self {
        Self { tx }
    }
}

impl ViewPort for ChannelView {
    fn update(&self, update: ViewUpdate) {
        if self.tx.send(AppEvent::View(update)).is_err() {
            tracing::debug!("view update dropped, event loop has exited");
        }
    }
}
