//! Alert dispatch: channel transports and the parallel manager

mod manager;
mod transport;

pub use manager::{AlertManager, ChannelSettings};
pub use transport::{
    BotApiTransport, ChannelTransport, ChatWebhookTransport, GenericWebhookTransport,
};
