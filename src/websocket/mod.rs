mod handler;
mod message;

pub use handler::{ws_handler, UNAUTHORIZED_CLOSE_CODE};
pub use message::{ClientMessage, OutboundMessage, ServerMessage};
