use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::{ClientConfig, Identity};
use crate::crypto::{AsymmetricCipher, CryptoError, RandomSource, SymmetricCipher};
use crate::keys::{KeyExchangeManager, KeyStore, MessageCipher};
use crate::protocol::frame;
use crate::protocol::{
    decode_response, encode_request, FrameError, IncomingMessage, MessageType, OperationCode,
    ProtocolError, Request, Response, UserEntry, PUBLIC_KEY_SIZE,
};
use crate::transport::Transport;

#[derive(Debug)]
pub enum ClientError {
    Frame(FrameError),
    Protocol(ProtocolError),
    Crypto(CryptoError),
    Transport(io::Error),
    Timeout(Duration),
    Rejected { code: OperationCode, reason: String },
    PublicKeyTooLong { len: usize, max: usize },
    NotRegistered,
    AlreadyRegistered,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Frame(e) => write!(f, "framing error: {}", e),
            ClientError::Protocol(e) => write!(f, "protocol error: {}", e),
            ClientError::Crypto(e) => write!(f, "crypto error: {}", e),
            ClientError::Transport(e) => write!(f, "transport error: {}", e),
            ClientError::Timeout(d) => write!(f, "no response within {}s", d.as_secs()),
            ClientError::Rejected { code, reason } if reason.is_empty() =>
                write!(f, "server rejected request ({})", code),
            ClientError::Rejected { code, reason } =>
                write!(f, "server rejected request ({}): {}", code, reason),
            ClientError::PublicKeyTooLong { len, max } =>
                write!(f, "public key is {} bytes; the wire field holds {}", len, max),
            ClientError::NotRegistered => write!(f, "not registered; run `register` first"),
            ClientError::AlreadyRegistered => write!(f, "already registered"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<FrameError> for ClientError {
    fn from(e: FrameError) -> Self {
        ClientError::Frame(e)
    }
}

impl From<ProtocolError> for ClientError {
    fn from(e: ProtocolError) -> Self {
        ClientError::Protocol(e)
    }
}

impl From<CryptoError> for ClientError {
    fn from(e: CryptoError) -> Self {
        ClientError::Crypto(e)
    }
}

impl From<io::Error> for ClientError {
    fn from(e: io::Error) -> Self {
        ClientError::Transport(e)
    }
}

/// Outcome of one fetched message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    KeyInstalled { from: String, message_id: u32 },
    Text { from: String, message_id: u32, text: String },
    Failed { from: String, message_id: u32, error: CryptoError },
    Unsupported { from: String, message_id: u32, message_type: u8 },
}

/// Runs each operation as connect → one request frame → one response frame → disconnect.
pub struct Client<T: Transport> {
    config: ClientConfig,
    transport: T,
    store: Arc<KeyStore>,
    exchange: KeyExchangeManager,
    cipher: MessageCipher,
}

impl<T: Transport> Client<T> {
    pub fn new(
        config: ClientConfig,
        transport: T,
        store: Arc<KeyStore>,
        asymmetric: Arc<dyn AsymmetricCipher>,
        symmetric: Arc<dyn SymmetricCipher>,
        random: Arc<dyn RandomSource>,
    ) -> Self {
        let exchange = KeyExchangeManager::new(Arc::clone(&store), asymmetric, random);
        let cipher = MessageCipher::new(Arc::clone(&store), symmetric);
        Self { config, transport, store, exchange, cipher }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn key_store(&self) -> &Arc<KeyStore> {
        &self.store
    }

    fn identity(&self) -> Result<&Identity, ClientError> {
        self.config.identity.as_ref().ok_or(ClientError::NotRegistered)
    }

    async fn roundtrip(&mut self, request: Request) -> Result<Response, ClientError> {
        let op = request.code();
        let bytes = frame::encode(op.as_u16(), &encode_request(&request))?;

        let wait = self.config.timeout();
        let result = match timeout(wait, self.transport.connect(&self.config.server_host, self.config.server_port)).await {
            Err(_) => Err(ClientError::Timeout(wait)),
            Ok(Err(e)) => Err(ClientError::Transport(e)),
            Ok(Ok(())) => self.exchange_frames(&bytes, wait).await,
        };
        self.transport.disconnect().await;
        let raw = result?;

        let frame = frame::decode(&raw)?;
        let response = decode_response(frame.code(), frame.payload)?;
        debug!("{} answered with code {}", op, frame.code());

        if let Response::Failure { code, reason } = response {
            warn!("{} rejected: {}", op, reason);
            return Err(ClientError::Rejected { code, reason });
        }
        Ok(response)
    }

    async fn exchange_frames(&mut self, bytes: &[u8], wait: Duration) -> Result<Vec<u8>, ClientError> {
        match timeout(wait, self.transport.send(bytes)).await {
            Ok(sent) => sent?,
            Err(_) => {
                error!("Timed out after {}s sending the request", wait.as_secs());
                return Err(ClientError::Timeout(wait));
            }
        }
        match timeout(wait, self.transport.receive()).await {
            Ok(received) => Ok(received?),
            Err(_) => {
                error!("Timed out after {}s waiting for a response", wait.as_secs());
                Err(ClientError::Timeout(wait))
            }
        }
    }

    /// Register `name` with `public_key`; on success the assigned id becomes this client's identity.
    pub async fn register(&mut self, name: &str, public_key: &str) -> Result<Identity, ClientError> {
        if self.config.identity.is_some() {
            return Err(ClientError::AlreadyRegistered);
        }
        if public_key.len() > PUBLIC_KEY_SIZE {
            return Err(ClientError::PublicKeyTooLong { len: public_key.len(), max: PUBLIC_KEY_SIZE });
        }
        let request = Request::Register {
            username: name.to_string(),
            public_key: public_key.to_string(),
        };
        match self.roundtrip(request).await? {
            Response::Registered { client_id } => {
                info!("Registered '{}' as {}", name, client_id);
                let identity = Identity { name: name.to_string(), client_id };
                self.config.identity = Some(identity.clone());
                Ok(identity)
            }
            other => Err(unexpected(&other)),
        }
    }

    pub async fn login(&mut self) -> Result<(), ClientError> {
        let username = self.identity()?.name.clone();
        match self.roundtrip(Request::Login { username }).await? {
            Response::LoggedIn => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn list_users(&mut self) -> Result<Vec<UserEntry>, ClientError> {
        self.identity()?;
        match self.roundtrip(Request::RequestUsers).await? {
            Response::Users(users) => {
                info!("Server lists {} users", users.len());
                Ok(users)
            }
            other => Err(unexpected(&other)),
        }
    }

    /// Returns the peer's canonical id and its public key
    pub async fn public_key(&mut self, peer: &str) -> Result<(String, String), ClientError> {
        self.identity()?;
        let request = Request::RequestPublicKey { identifier: peer.to_string() };
        match self.roundtrip(request).await? {
            Response::PublicKey { client_id, public_key } => {
                let id = if client_id.is_empty() { peer.to_string() } else { client_id };
                Ok((id, public_key))
            }
            other => Err(unexpected(&other)),
        }
    }

    /// Fetch `peer`'s public key, create a symmetric key for it and send it over.
    /// Returns the peer's canonical id and the queued message id.
    ///
    /// The key is stored locally, under the canonical id, before the server confirms delivery.
    pub async fn exchange_key(&mut self, peer: &str) -> Result<(String, u32), ClientError> {
        let (peer_id, public_key) = self.public_key(peer).await?;
        let envelope = self.exchange.initiate(&peer_id, &public_key)?;
        let request = Request::SendSymmetricKey { recipient: peer_id.clone(), encrypted_key: envelope };
        match self.roundtrip(request).await? {
            Response::KeyAccepted { message_id } => {
                info!("Symmetric key for '{}' queued as message {}", peer_id, message_id);
                Ok((peer_id, message_id))
            }
            other => Err(unexpected(&other)),
        }
    }

    /// Encrypt `text` for `peer` and queue it on the server.
    ///
    /// `peer` may be a name; it is resolved to the canonical id the key is stored under.
    pub async fn send_text(&mut self, peer: &str, text: &str) -> Result<u32, ClientError> {
        self.identity()?;
        let peer_id = self.resolve(peer).await?;
        let message = self.cipher.encrypt_for_peer(&peer_id, text.as_bytes())?;
        let request = Request::SendMessage { recipient: peer_id, message };
        match self.roundtrip(request).await? {
            Response::MessageAccepted { message_id } => Ok(message_id),
            other => Err(unexpected(&other)),
        }
    }

    async fn resolve(&mut self, peer: &str) -> Result<String, ClientError> {
        if self.store.has(peer) {
            return Ok(peer.to_string());
        }
        let (peer_id, _) = self.public_key(peer).await?;
        if peer_id != peer {
            debug!("Resolved '{}' to {}", peer, peer_id);
        }
        Ok(peer_id)
    }

    /// Pull waiting messages, installing keys and decrypting text as they come.
    pub async fn fetch_messages(&mut self) -> Result<Vec<Delivery>, ClientError> {
        self.identity()?;
        match self.roundtrip(Request::RequestMessages).await? {
            Response::Messages(messages) => {
                info!("Fetched {} messages", messages.len());
                Ok(messages.into_iter().map(|m| self.dispatch(m)).collect())
            }
            other => Err(unexpected(&other)),
        }
    }

    pub async fn logout(&mut self) -> Result<(), ClientError> {
        self.identity()?;
        match self.roundtrip(Request::Logout).await? {
            Response::LoggedOut => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    fn dispatch(&self, message: IncomingMessage) -> Delivery {
        let IncomingMessage { sender_id: from, message_id, message_type, content } = message;
        match message_type {
            MessageType::SymmetricKeyExchange => match self.exchange.receive(&from, &content) {
                Ok(()) => Delivery::KeyInstalled { from, message_id },
                Err(error) => {
                    warn!("Key exchange message {} from '{}' failed: {}", message_id, from, error);
                    Delivery::Failed { from, message_id, error }
                }
            },
            MessageType::Text => match self.cipher.decrypt_for_peer(&from, &content) {
                Ok(plain) => Delivery::Text {
                    from,
                    message_id,
                    text: String::from_utf8_lossy(&plain).into_owned(),
                },
                Err(error) => {
                    warn!("Cannot read message {} from '{}': {}", message_id, from, error);
                    Delivery::Failed { from, message_id, error }
                }
            },
            MessageType::Reserved(kind) => {
                warn!("Message {} from '{}' has unsupported type {}", message_id, from, kind);
                Delivery::Unsupported { from, message_id, message_type: kind }
            }
        }
    }
}

/// A well-formed response that does not answer the request that was sent
fn unexpected(response: &Response) -> ClientError {
    let code = response.code();
    error!("Unexpected response {}", code);
    ClientError::Protocol(ProtocolError::UnexpectedOperationCode(code.as_u16()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::Aes128Cbc;
    use crate::keys::exchange::test_support::{Counting, XorCipher};
    use crate::protocol::fields::{pack_fixed, put_variable, unpack_fixed};
    use crate::protocol::NAME_FIELD_SIZE;
    use crate::protocol::CLIENT_ID_SIZE;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    /// Replays canned response frames and records what was sent
    #[derive(Default)]
    struct Scripted {
        responses: VecDeque<Vec<u8>>,
        sent: Vec<Vec<u8>>,
        connects: usize,
        disconnects: usize,
        hang: bool,
        stall_send: bool,
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn connect(&mut self, _host: &str, _port: u16) -> io::Result<()> {
            self.connects += 1;
            Ok(())
        }

        async fn send(&mut self, bytes: &[u8]) -> io::Result<()> {
            if self.stall_send {
                std::future::pending::<()>().await;
            }
            self.sent.push(bytes.to_vec());
            Ok(())
        }

        async fn receive(&mut self) -> io::Result<Vec<u8>> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            self.responses
                .pop_front()
                .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "script exhausted"))
        }

        async fn disconnect(&mut self) {
            self.disconnects += 1;
        }
    }

    fn registered_config() -> ClientConfig {
        ClientConfig {
            identity: Some(Identity { name: "alice".into(), client_id: "alice-id".into() }),
            timeout_secs: 1,
            ..ClientConfig::default()
        }
    }

    fn client(config: ClientConfig, responses: Vec<Vec<u8>>) -> Client<Scripted> {
        let transport = Scripted { responses: responses.into(), ..Scripted::default() };
        Client::new(
            config,
            transport,
            Arc::new(KeyStore::new()),
            Arc::new(XorCipher { secret: 0x42 }),
            Arc::new(Aes128Cbc),
            Arc::new(Counting(1)),
        )
    }

    fn response(code: OperationCode, payload: &[u8]) -> Vec<u8> {
        frame::encode(code.as_u16(), payload).unwrap()
    }

    #[tokio::test]
    async fn register_adopts_assigned_id() {
        let reply = response(OperationCode::RegistrationSuccess, &pack_fixed("id-0001", CLIENT_ID_SIZE));
        let mut c = client(ClientConfig::default(), vec![reply]);

        let identity = c.register("alice", "PEM").await.unwrap();
        assert_eq!(identity.client_id, "id-0001");
        assert_eq!(c.config().identity.as_ref(), Some(&identity));

        let sent = frame::decode(&c.transport.sent[0]).unwrap();
        assert_eq!(sent.code(), 1000);
        assert_eq!(c.transport.connects, 1);
        assert_eq!(c.transport.disconnects, 1);
    }

    #[tokio::test]
    async fn register_twice_is_refused_locally() {
        let mut c = client(registered_config(), vec![]);
        assert!(matches!(c.register("alice", "PEM").await, Err(ClientError::AlreadyRegistered)));
        assert!(c.transport.sent.is_empty());
    }

    #[tokio::test]
    async fn unregistered_client_cannot_list_users() {
        let mut c = client(ClientConfig::default(), vec![]);
        assert!(matches!(c.list_users().await, Err(ClientError::NotRegistered)));
    }

    #[tokio::test]
    async fn failure_response_surfaces_reason() {
        let reply = response(OperationCode::RequestUsersFailure, b"database offline");
        let mut c = client(registered_config(), vec![reply]);
        match c.list_users().await {
            Err(ClientError::Rejected { code, reason }) => {
                assert_eq!(code, OperationCode::RequestUsersFailure);
                assert_eq!(reason, "database offline");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(c.transport.disconnects, 1);
    }

    #[tokio::test]
    async fn mismatched_success_code_is_a_protocol_error() {
        let mut c = client(registered_config(), vec![response(OperationCode::LogoutSuccess, &[])]);
        assert!(matches!(c.list_users().await, Err(ClientError::Protocol(_))));
    }

    #[tokio::test]
    async fn corrupted_response_is_a_frame_error() {
        let mut reply = response(OperationCode::SendMessageSuccess, &5u32.to_le_bytes());
        reply[9] ^= 0xFF;
        let mut c = client(registered_config(), vec![reply]);
        c.key_store().put("bob", [1u8; 16]);
        assert!(matches!(
            c.send_text("bob", "hi").await,
            Err(ClientError::Frame(FrameError::ChecksumMismatch { .. }))
        ));
    }

    #[tokio::test]
    async fn silent_server_times_out_and_disconnects() {
        let mut c = client(registered_config(), vec![]);
        c.transport.hang = true;
        assert!(matches!(c.logout().await, Err(ClientError::Timeout(_))));
        assert_eq!(c.transport.disconnects, 1);
    }

    #[tokio::test]
    async fn stalled_send_times_out_and_disconnects() {
        let mut c = client(registered_config(), vec![]);
        c.transport.stall_send = true;
        assert!(matches!(c.logout().await, Err(ClientError::Timeout(_))));
        assert_eq!(c.transport.disconnects, 1);
    }

    fn public_key_reply(id: &str, key: &str) -> Vec<u8> {
        let mut pk = pack_fixed(id, CLIENT_ID_SIZE);
        pk.extend(pack_fixed(key, PUBLIC_KEY_SIZE));
        response(OperationCode::PublicKeyResponse, &pk)
    }

    #[tokio::test]
    async fn send_without_key_only_resolves_the_peer() {
        let mut c = client(registered_config(), vec![public_key_reply("bob-id", "77")]);
        assert!(matches!(
            c.send_text("bob", "hi").await,
            Err(ClientError::Crypto(CryptoError::KeyMissing(id))) if id == "bob-id"
        ));
        assert_eq!(c.transport.sent.len(), 1);
        let sent = frame::decode(&c.transport.sent[0]).unwrap();
        assert_eq!(sent.code(), OperationCode::RequestPublicKey.as_u16());
    }

    #[tokio::test]
    async fn send_by_name_after_exchange_by_name() {
        let replies = vec![
            public_key_reply("bob-id", "77"),
            response(OperationCode::SendSymmetricKeySuccess, &9u32.to_le_bytes()),
            public_key_reply("bob-id", "77"),
            response(OperationCode::SendMessageSuccess, &10u32.to_le_bytes()),
        ];
        let mut c = client(registered_config(), replies);

        assert_eq!(c.exchange_key("bob").await.unwrap(), ("bob-id".to_string(), 9));
        assert_eq!(c.send_text("bob", "hi bob").await.unwrap(), 10);

        let sent = frame::decode(&c.transport.sent[3]).unwrap();
        assert_eq!(sent.code(), OperationCode::SendMessageRequest.as_u16());
        assert_eq!(unpack_fixed(&sent.payload[..NAME_FIELD_SIZE]), "bob-id");

        let key = c.key_store().get("bob-id").unwrap();
        let bob_store = Arc::new(KeyStore::new());
        bob_store.put("alice-id", key);
        let reader = MessageCipher::new(bob_store, Arc::new(Aes128Cbc));
        let body = &sent.payload[NAME_FIELD_SIZE + 4..];
        assert_eq!(reader.decrypt_for_peer("alice-id", body).unwrap(), b"hi bob");
    }

    #[tokio::test]
    async fn send_to_known_id_skips_lookup() {
        let mut c = client(
            registered_config(),
            vec![response(OperationCode::SendMessageSuccess, &3u32.to_le_bytes())],
        );
        c.key_store().put("bob-id", [4u8; 16]);
        assert_eq!(c.send_text("bob-id", "hi").await.unwrap(), 3);
        assert_eq!(c.transport.sent.len(), 1);
    }

    #[tokio::test]
    async fn oversized_public_key_is_refused_locally() {
        let mut c = client(ClientConfig::default(), vec![]);
        let pem = "A".repeat(PUBLIC_KEY_SIZE + 1);
        assert!(matches!(
            c.register("alice", &pem).await,
            Err(ClientError::PublicKeyTooLong { len, max }) if len == PUBLIC_KEY_SIZE + 1 && max == PUBLIC_KEY_SIZE
        ));
        assert_eq!(c.transport.connects, 0);
    }

    #[tokio::test]
    async fn exchange_key_fetches_public_key_then_sends_envelope() {
        let replies = vec![
            public_key_reply("bob-id", "77"),
            response(OperationCode::SendSymmetricKeySuccess, &9u32.to_le_bytes()),
        ];
        let mut c = client(registered_config(), replies);

        assert_eq!(c.exchange_key("bob").await.unwrap(), ("bob-id".to_string(), 9));
        let key = c.key_store().get("bob-id").unwrap();

        let sent = frame::decode(&c.transport.sent[1]).unwrap();
        assert_eq!(sent.code(), OperationCode::SendSymmetricKeyRequest.as_u16());
        let envelope = &sent.payload[255 + 4..];
        assert_eq!(envelope[0], 0x77);
        let recovered: Vec<u8> = envelope[1..].iter().map(|b| b ^ 0x77).collect();
        assert_eq!(recovered, key.to_vec());
    }

    #[tokio::test]
    async fn fetched_messages_are_dispatched() {
        // key-exchange envelope addressed to us (xor secret 0x42), then text under that key
        let key = [5u8; 16];
        let mut envelope = vec![0x42];
        envelope.extend(key.iter().map(|b| b ^ 0x42));

        let peer_store = Arc::new(KeyStore::new());
        peer_store.put("alice-id", key);
        let text = MessageCipher::new(peer_store, Arc::new(Aes128Cbc))
            .encrypt_for_peer("alice-id", b"hello alice")
            .unwrap();

        let mut payload = 4u32.to_le_bytes().to_vec();
        for (id, kind, content) in [
            (1u32, 2u8, envelope),
            (2, 1, text),
            (3, 1, vec![0u8; 16]),
            (4, 7, vec![]),
        ] {
            let sender = if id == 3 { "stranger" } else { "carol" };
            payload.extend(pack_fixed(sender, CLIENT_ID_SIZE));
            payload.extend_from_slice(&id.to_le_bytes());
            payload.push(kind);
            put_variable(&mut payload, &content);
        }

        let mut c = client(registered_config(), vec![response(OperationCode::MessagesResponse, &payload)]);
        let deliveries = c.fetch_messages().await.unwrap();

        assert_eq!(deliveries[0], Delivery::KeyInstalled { from: "carol".into(), message_id: 1 });
        assert_eq!(
            deliveries[1],
            Delivery::Text { from: "carol".into(), message_id: 2, text: "hello alice".into() }
        );
        assert_eq!(
            deliveries[2],
            Delivery::Failed {
                from: "stranger".into(),
                message_id: 3,
                error: CryptoError::KeyMissing("stranger".into()),
            }
        );
        assert_eq!(
            deliveries[3],
            Delivery::Unsupported { from: "carol".into(), message_id: 4, message_type: 7 }
        );
        assert_eq!(c.key_store().get("carol"), Some(key));
    }
}
