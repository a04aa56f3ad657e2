//! The seam between the subscription layer and whatever carries change events.
//!
//! A transport hands out channels. Each channel multiplexes listeners for one
//! or more tables and is released in one `close`.

use crate::error::Result;
use crate::event::{ChangeEvent, EventMask};
use std::sync::Arc;

/// Raw subscription status as reported by a transport channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportStatus {
    Subscribed,
    TimedOut,
    ChannelError,
    Closed,
}

pub type EventHandler = Arc<dyn Fn(ChangeEvent) + Send + Sync>;
pub type StatusHandler = Arc<dyn Fn(TransportStatus) + Send + Sync>;

pub trait ChangeTransport: Send + Sync + 'static {
    fn open_channel(&self, name: &str) -> Result<Box<dyn TransportChannel>>;
}

pub trait TransportChannel: Send {
    fn name(&self) -> &str;

    /// Register a listener for changes on `resource`. Must be called before
    /// [`TransportChannel::subscribe`].
    fn on_table_event(&mut self, resource: &str, mask: EventMask, handler: EventHandler);

    /// Start the subscription. Confirmation and later status changes arrive
    /// through `status`, possibly before this call returns.
    fn subscribe(&mut self, status: StatusHandler) -> Result<()>;

    /// Release the channel and every listener registered on it. Idempotent.
    fn close(&mut self);
}

impl<T: ChangeTransport + ?Sized> ChangeTransport for Arc<T> {
    fn open_channel(&self, name: &str) -> Result<Box<dyn TransportChannel>> {
        (**self).open_channel(name)
    }
}
