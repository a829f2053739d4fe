pub mod buffer;
pub mod connection;
pub mod error;
pub mod frame;
pub mod message;

pub use connection::Connection;
pub use error::WireError;
pub use frame::{Frame, Header};
pub use message::Message;
