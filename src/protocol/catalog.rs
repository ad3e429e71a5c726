//! Operation codes and their payload layouts.

use std::fmt;

use crate::protocol::error::ProtocolError;
use crate::protocol::fields::{put_fixed, put_variable, FieldReader};
use crate::protocol::{CLIENT_ID_SIZE, NAME_FIELD_SIZE, PUBLIC_KEY_SIZE};
use tracing::{debug, error};

/// Every operation code that may appear in a frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum OperationCode {
    RegistrationRequest = 1000,
    RegistrationSuccess = 1001,
    RegistrationFailure = 1002,
    LoginRequest = 2000,
    LoginSuccess = 2001,
    LoginFailure = 2002,
    SendMessageRequest = 3000,
    SendMessageSuccess = 3001,
    SendMessageFailure = 3002,
    SendSymmetricKeyRequest = 3100,
    SendSymmetricKeySuccess = 3101,
    SendSymmetricKeyFailure = 3102,
    RequestMessages = 4000,
    MessagesResponse = 4001,
    RequestMessagesFailure = 4002,
    RequestUsers = 5000,
    UsersResponse = 5001,
    RequestPublicKey = 5002,
    PublicKeyResponse = 5003,
    RequestUsersFailure = 5004,
    RequestPublicKeyFailure = 5005,
    LogoutRequest = 6000,
    LogoutSuccess = 6001,
    LogoutFailure = 6002,
    GeneralFailure = 9000,
}

impl OperationCode {
    pub const ALL: [OperationCode; 25] = [
        Self::RegistrationRequest,
        Self::RegistrationSuccess,
        Self::RegistrationFailure,
        Self::LoginRequest,
        Self::LoginSuccess,
        Self::LoginFailure,
        Self::SendMessageRequest,
        Self::SendMessageSuccess,
        Self::SendMessageFailure,
        Self::SendSymmetricKeyRequest,
        Self::SendSymmetricKeySuccess,
        Self::SendSymmetricKeyFailure,
        Self::RequestMessages,
        Self::MessagesResponse,
        Self::RequestMessagesFailure,
        Self::RequestUsers,
        Self::UsersResponse,
        Self::RequestPublicKey,
        Self::PublicKeyResponse,
        Self::RequestUsersFailure,
        Self::RequestPublicKeyFailure,
        Self::LogoutRequest,
        Self::LogoutSuccess,
        Self::LogoutFailure,
        Self::GeneralFailure,
    ];

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Self::RegistrationFailure
                | Self::LoginFailure
                | Self::SendMessageFailure
                | Self::SendSymmetricKeyFailure
                | Self::RequestMessagesFailure
                | Self::RequestUsersFailure
                | Self::RequestPublicKeyFailure
                | Self::LogoutFailure
                | Self::GeneralFailure
        )
    }
}

impl TryFrom<u16> for OperationCode {
    type Error = ProtocolError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|code| code.as_u16() == value)
            .ok_or(ProtocolError::UnexpectedOperationCode(value))
    }
}

impl fmt::Display for OperationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.as_u16())
    }
}

/// Client requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Register { username: String, public_key: String },
    Login { username: String },
    SendMessage { recipient: String, message: Vec<u8> },
    SendSymmetricKey { recipient: String, encrypted_key: Vec<u8> },
    RequestMessages,
    RequestUsers,
    RequestPublicKey { identifier: String },
    Logout,
}

impl Request {
    pub fn code(&self) -> OperationCode {
        match self {
            Request::Register { .. } => OperationCode::RegistrationRequest,
            Request::Login { .. } => OperationCode::LoginRequest,
            Request::SendMessage { .. } => OperationCode::SendMessageRequest,
            Request::SendSymmetricKey { .. } => OperationCode::SendSymmetricKeyRequest,
            Request::RequestMessages => OperationCode::RequestMessages,
            Request::RequestUsers => OperationCode::RequestUsers,
            Request::RequestPublicKey { .. } => OperationCode::RequestPublicKey,
            Request::Logout => OperationCode::LogoutRequest,
        }
    }
}

/// Build the payload of `request`. Oversized payloads are rejected by the frame codec.
pub fn encode_request(request: &Request) -> Vec<u8> {
    let mut payload = Vec::new();
    match request {
        Request::Register { username, public_key } => {
            put_fixed(&mut payload, username, NAME_FIELD_SIZE);
            put_fixed(&mut payload, public_key, PUBLIC_KEY_SIZE);
        }
        Request::Login { username } => {
            put_fixed(&mut payload, username, NAME_FIELD_SIZE);
        }
        Request::SendMessage { recipient, message } => {
            put_fixed(&mut payload, recipient, NAME_FIELD_SIZE);
            put_variable(&mut payload, message);
        }
        Request::SendSymmetricKey { recipient, encrypted_key } => {
            put_fixed(&mut payload, recipient, NAME_FIELD_SIZE);
            put_variable(&mut payload, encrypted_key);
        }
        Request::RequestPublicKey { identifier } => {
            put_fixed(&mut payload, identifier, NAME_FIELD_SIZE);
        }
        Request::RequestMessages | Request::RequestUsers | Request::Logout => {}
    }
    debug!("Encoded {} payload: {} bytes", request.code(), payload.len());
    payload
}

/// Kind of a queued message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Text,
    SymmetricKeyExchange,
    Reserved(u8),
}

impl From<u8> for MessageType {
    fn from(value: u8) -> Self {
        match value {
            1 => MessageType::Text,
            2 => MessageType::SymmetricKeyExchange,
            other => MessageType::Reserved(other),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(value: MessageType) -> Self {
        match value {
            MessageType::Text => 1,
            MessageType::SymmetricKeyExchange => 2,
            MessageType::Reserved(other) => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub sender_id: String,
    pub message_id: u32,
    pub message_type: MessageType,
    pub content: Vec<u8>,
}

/// Decoded server responses, one variant per response shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Registered { client_id: String },
    LoggedIn,
    MessageAccepted { message_id: u32 },
    KeyAccepted { message_id: u32 },
    Users(Vec<UserEntry>),
    Messages(Vec<IncomingMessage>),
    PublicKey { client_id: String, public_key: String },
    LoggedOut,
    Failure { code: OperationCode, reason: String },
}

impl Response {
    pub fn code(&self) -> OperationCode {
        match self {
            Response::Registered { .. } => OperationCode::RegistrationSuccess,
            Response::LoggedIn => OperationCode::LoginSuccess,
            Response::MessageAccepted { .. } => OperationCode::SendMessageSuccess,
            Response::KeyAccepted { .. } => OperationCode::SendSymmetricKeySuccess,
            Response::Users(_) => OperationCode::UsersResponse,
            Response::Messages(_) => OperationCode::MessagesResponse,
            Response::PublicKey { .. } => OperationCode::PublicKeyResponse,
            Response::LoggedOut => OperationCode::LogoutSuccess,
            Response::Failure { code, .. } => *code,
        }
    }
}

/// Decode a response payload according to its operation code.
pub fn decode_response(code: u16, payload: &[u8]) -> Result<Response, ProtocolError> {
    let op = OperationCode::try_from(code)?;
    let mut r = FieldReader::new(payload);

    let response = match op {
        op if op.is_failure() => Response::Failure { code: op, reason: error_text(payload) },
        OperationCode::RegistrationSuccess => Response::Registered {
            client_id: r.fixed(CLIENT_ID_SIZE, "client_id")?,
        },
        OperationCode::LoginSuccess => Response::LoggedIn,
        OperationCode::LogoutSuccess => Response::LoggedOut,
        OperationCode::SendMessageSuccess => Response::MessageAccepted {
            message_id: r.u32("message_id")?,
        },
        OperationCode::SendSymmetricKeySuccess => Response::KeyAccepted {
            message_id: r.u32("message_id")?,
        },
        OperationCode::UsersResponse => {
            let count = r.u32("user_count")?;
            let mut users = Vec::new();
            for _ in 0..count {
                users.push(UserEntry {
                    id: r.fixed(CLIENT_ID_SIZE, "user_id")?,
                    name: r.fixed(NAME_FIELD_SIZE, "user_name")?,
                });
            }
            Response::Users(users)
        }
        OperationCode::MessagesResponse => {
            let count = r.u32("message_count")?;
            let mut messages = Vec::new();
            for _ in 0..count {
                messages.push(IncomingMessage {
                    sender_id: r.fixed(CLIENT_ID_SIZE, "sender_id")?,
                    message_id: r.u32("message_id")?,
                    message_type: MessageType::from(r.u8("message_type")?),
                    content: r.variable("content")?,
                });
            }
            Response::Messages(messages)
        }
        OperationCode::PublicKeyResponse => Response::PublicKey {
            client_id: r.fixed(CLIENT_ID_SIZE, "client_id")?,
            public_key: r.fixed(PUBLIC_KEY_SIZE, "public_key")?,
        },
        request => {
            error!("Request code {} received where a response was expected", request);
            return Err(ProtocolError::UnexpectedOperationCode(code));
        }
    };

    if r.remaining() > 0 && !matches!(response, Response::Failure { .. }) {
        debug!("Ignoring {} trailing bytes after {}", r.remaining(), op);
    }
    Ok(response)
}

fn error_text(payload: &[u8]) -> String {
    let end = payload.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&payload[..end]).into_owned()
}
