use std::sync::{Arc, Mutex};

use tokio::net::TcpListener;

use relayc::config::ClientConfig;
use relayc::crypto::{Aes128Cbc, OsRandom, RsaOaepCipher};
use relayc::keys::KeyStore;
use relayc::protocol::fields::{pack_fixed, put_variable, FieldReader};
use relayc::protocol::frame;
use relayc::protocol::{OperationCode, CLIENT_ID_SIZE, NAME_FIELD_SIZE, PUBLIC_KEY_SIZE};
use relayc::transport::TcpTransport;
use relayc::utils::io::{read_frame_bytes, write_all};
use relayc::{Client, ClientError, Delivery};

struct Queued {
    sender: String,
    recipient: String,
    id: u32,
    kind: u8,
    content: Vec<u8>,
}

/// Minimal relay: login selects the acting user for later requests
#[derive(Default)]
struct Relay {
    users: Vec<(String, String, String)>,
    queue: Vec<Queued>,
    current: Option<String>,
    next_id: u32,
}

impl Relay {
    fn handle(&mut self, code: u16, payload: &[u8]) -> (OperationCode, Vec<u8>) {
        let mut r = FieldReader::new(payload);
        match OperationCode::try_from(code).unwrap() {
            OperationCode::RegistrationRequest => {
                let name = r.fixed(NAME_FIELD_SIZE, "name").unwrap();
                let key = r.fixed(PUBLIC_KEY_SIZE, "key").unwrap();
                if self.users.iter().any(|(_, n, _)| *n == name) {
                    return (OperationCode::RegistrationFailure, b"name taken".to_vec());
                }
                let id = format!("id{:014}", self.users.len() + 1);
                self.users.push((id.clone(), name, key));
                (OperationCode::RegistrationSuccess, pack_fixed(&id, CLIENT_ID_SIZE))
            }
            OperationCode::LoginRequest => {
                let name = r.fixed(NAME_FIELD_SIZE, "name").unwrap();
                match self.users.iter().find(|(_, n, _)| *n == name) {
                    Some((id, _, _)) => {
                        self.current = Some(id.clone());
                        (OperationCode::LoginSuccess, Vec::new())
                    }
                    None => (OperationCode::LoginFailure, b"unknown user".to_vec()),
                }
            }
            OperationCode::RequestUsers => {
                let mut out = (self.users.len() as u32).to_le_bytes().to_vec();
                for (id, name, _) in &self.users {
                    out.extend(pack_fixed(id, CLIENT_ID_SIZE));
                    out.extend(pack_fixed(name, NAME_FIELD_SIZE));
                }
                (OperationCode::UsersResponse, out)
            }
            OperationCode::RequestPublicKey => {
                let who = r.fixed(NAME_FIELD_SIZE, "id").unwrap();
                match self.users.iter().find(|(id, name, _)| *id == who || *name == who) {
                    Some((id, _, key)) => {
                        let mut out = pack_fixed(id, CLIENT_ID_SIZE);
                        out.extend(pack_fixed(key, PUBLIC_KEY_SIZE));
                        (OperationCode::PublicKeyResponse, out)
                    }
                    None => (OperationCode::RequestPublicKeyFailure, b"no such client".to_vec()),
                }
            }
            op @ (OperationCode::SendMessageRequest | OperationCode::SendSymmetricKeyRequest) => {
                let recipient = r.fixed(NAME_FIELD_SIZE, "recipient").unwrap();
                let content = r.variable("content").unwrap();
                self.next_id += 1;
                let (kind, ok) = if op == OperationCode::SendMessageRequest {
                    (1, OperationCode::SendMessageSuccess)
                } else {
                    (2, OperationCode::SendSymmetricKeySuccess)
                };
                self.queue.push(Queued {
                    sender: self.current.clone().unwrap_or_default(),
                    recipient,
                    id: self.next_id,
                    kind,
                    content,
                });
                (ok, self.next_id.to_le_bytes().to_vec())
            }
            OperationCode::RequestMessages => {
                let me = self.current.clone().unwrap_or_default();
                let (mine, rest): (Vec<_>, Vec<_>) =
                    self.queue.drain(..).partition(|m| m.recipient == me);
                self.queue = rest;
                let mut out = (mine.len() as u32).to_le_bytes().to_vec();
                for m in mine {
                    out.extend(pack_fixed(&m.sender, CLIENT_ID_SIZE));
                    out.extend_from_slice(&m.id.to_le_bytes());
                    out.push(m.kind);
                    put_variable(&mut out, &m.content);
                }
                (OperationCode::MessagesResponse, out)
            }
            OperationCode::LogoutRequest => {
                self.current = None;
                (OperationCode::LogoutSuccess, Vec::new())
            }
            _ => (OperationCode::GeneralFailure, b"unsupported".to_vec()),
        }
    }
}

async fn spawn_relay() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let relay = Arc::new(Mutex::new(Relay::default()));

    tokio::spawn(async move {
        loop {
            let (mut socket, _) = listener.accept().await.unwrap();
            let relay = Arc::clone(&relay);
            tokio::spawn(async move {
                let raw = read_frame_bytes(&mut socket).await.unwrap();
                let request = frame::decode(&raw).unwrap();
                let (code, payload) = relay.lock().unwrap().handle(request.code(), request.payload);
                let reply = frame::encode(code.as_u16(), &payload).unwrap();
                write_all(&mut socket, &reply).await.unwrap();
            });
        }
    });
    port
}

fn client(port: u16) -> (Client<TcpTransport>, String) {
    let rsa = RsaOaepCipher::generate(1024).unwrap();
    let public_key = rsa.public_key_pem().unwrap();
    let config = ClientConfig {
        server_host: "127.0.0.1".into(),
        server_port: port,
        timeout_secs: 5,
        key_store_path: None,
        ..ClientConfig::default()
    };
    let client = Client::new(
        config,
        TcpTransport::new(),
        Arc::new(KeyStore::new()),
        Arc::new(rsa),
        Arc::new(Aes128Cbc),
        Arc::new(OsRandom),
    );
    (client, public_key)
}

#[tokio::test]
async fn key_exchange_then_encrypted_message() {
    let port = spawn_relay().await;
    let (mut alice, alice_pk) = client(port);
    let (mut bob, bob_pk) = client(port);

    let alice_id = alice.register("alice", &alice_pk).await.unwrap().client_id;
    let bob_id = bob.register("bob", &bob_pk).await.unwrap().client_id;

    let users = alice.list_users().await.unwrap();
    assert_eq!(users.len(), 2);
    assert_eq!(users[1].name, "bob");

    bob.login().await.unwrap();
    let (resolved, _) = bob.exchange_key("alice").await.unwrap();
    assert_eq!(resolved, alice_id);
    let bob_key = bob.key_store().get(&alice_id).unwrap();

    alice.login().await.unwrap();
    let deliveries = alice.fetch_messages().await.unwrap();
    assert_eq!(deliveries.len(), 1);
    assert!(matches!(&deliveries[0], Delivery::KeyInstalled { from, .. } if *from == bob_id));
    assert_eq!(alice.key_store().get(&bob_id), Some(bob_key));

    bob.login().await.unwrap();
    bob.send_text("alice", "hi alice").await.unwrap();

    alice.login().await.unwrap();
    let deliveries = alice.fetch_messages().await.unwrap();
    assert!(matches!(
        &deliveries[..],
        [Delivery::Text { text, .. }] if text == "hi alice"
    ));

    alice.send_text("bob", "hi bob").await.unwrap();
    bob.login().await.unwrap();
    let deliveries = bob.fetch_messages().await.unwrap();
    assert!(matches!(
        &deliveries[..],
        [Delivery::Text { from, text, .. }] if text == "hi bob" && *from == alice_id
    ));

    alice.logout().await.unwrap();
}

#[tokio::test]
async fn server_rejection_is_reported() {
    let port = spawn_relay().await;
    let (mut first, pk) = client(port);
    let (mut second, _) = client(port);

    first.register("carol", &pk).await.unwrap();
    match second.register("carol", &pk).await {
        Err(ClientError::Rejected { code, reason }) => {
            assert_eq!(code, OperationCode::RegistrationFailure);
            assert_eq!(reason, "name taken");
        }
        other => panic!("expected rejection, got {:?}", other.map(|i| i.client_id)),
    }
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let (mut c, pk) = client(port);
    assert!(matches!(c.register("dan", &pk).await, Err(ClientError::Transport(_))));
}
