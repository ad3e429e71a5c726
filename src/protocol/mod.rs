pub mod catalog;
pub mod constants;
pub mod error;
pub mod fields;
pub mod frame;

pub use catalog::{decode_response, encode_request, IncomingMessage, MessageType, OperationCode, Request, Response, UserEntry};
pub use constants::*;
pub use error::{FrameError, ProtocolError};
