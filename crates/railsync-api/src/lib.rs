// railsync-api: Async wire clients for a DCC model-railroad controller
// (HTTP poll/command endpoints, server-push event stream, JSON command channel)

pub mod client;
pub mod command_channel;
mod connections;
mod devices;
pub mod error;
pub mod event_stream;
pub mod models;
pub mod reconnect;
pub mod transport;

pub use client::ControllerClient;
pub use command_channel::{
    ChannelEvent, ChannelRequest, ChannelState, CommandChannelHandle, derive_channel_url,
};
pub use error::Error;
pub use event_stream::{EventStreamHandle, StreamItem, StreamState};
pub use reconnect::DEFAULT_RECONNECT_DELAY;
pub use transport::{TlsMode, TransportConfig};
