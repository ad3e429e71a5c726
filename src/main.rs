use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sha2::{Digest, Sha256};
use tracing::info;
use tracing_subscriber::EnvFilter;

use relayc::config::{ClientConfig, DEFAULT_CONFIG_FILE};
use relayc::crypto::rsa_oaep::DEFAULT_KEY_BITS;
use relayc::crypto::{Aes128Cbc, OsRandom, RsaOaepCipher};
use relayc::keys::KeyStore;
use relayc::transport::TcpTransport;
use relayc::{Client, Delivery};

#[derive(Parser)]
#[command(name = "relayc")]
#[command(about = "Message relay client")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, help = "Config file path")]
    config: Option<String>,

    #[arg(long, help = "Server address host:port (overrides config)")]
    server: Option<String>,

    #[arg(long, help = "Output as JSON")]
    json: bool,

    #[arg(short, long, help = "Debug logging")]
    verbose: bool,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Create an RSA key pair at the configured paths
    Keygen {
        #[arg(long, default_value_t = DEFAULT_KEY_BITS, help = "Key size in bits, at most 4096")]
        bits: usize,
    },
    /// Register a user name with the server
    Register { name: String },
    Login,
    /// List registered users
    Users,
    /// Fetch a peer's public key
    PublicKey { peer: String },
    /// Send a symmetric key to a peer
    ExchangeKey { peer: String },
    /// Send an encrypted text message
    Send {
        peer: String,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Fetch and decrypt waiting messages
    Messages,
    Logout,
    /// List locally stored symmetric keys
    Keys,
    GenerateConfig {
        #[arg(long, default_value = DEFAULT_CONFIG_FILE, help = "Config file path")]
        output: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "relayc=debug" } else { "relayc=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with_writer(std::io::stderr)
        .init();

    if let Commands::GenerateConfig { output } = &cli.command {
        ClientConfig::default().save(output)?;
        println!("Configuration written to {}", output);
        return Ok(());
    }

    let config_path = cli.config.clone().unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());
    let mut config = ClientConfig::load_or_create(Some(&config_path))?;
    if let Some(server) = &cli.server {
        config.set_server(server)?;
    }

    if let Commands::Keygen { bits } = cli.command {
        let rsa = RsaOaepCipher::generate(bits)?;
        rsa.save(&config.private_key_path, &config.public_key_path)?;
        if cli.json {
            println!("{}", serde_json::json!({
                "private_key": config.private_key_path,
                "public_key": config.public_key_path,
                "bits": bits,
            }));
        } else {
            println!("Key pair written to {:?}", config.private_key_path);
        }
        return Ok(());
    }

    let store = Arc::new(match &config.key_store_path {
        Some(path) => KeyStore::load(path)?,
        None => KeyStore::new(),
    });

    if let Commands::Keys = cli.command {
        print_keys(&store, cli.json);
        return Ok(());
    }

    let rsa = RsaOaepCipher::load(&config.private_key_path)
        .with_context(|| format!("cannot load {:?}; run `relayc keygen` first", config.private_key_path))?;

    let mut client = Client::new(
        config,
        TcpTransport::new(),
        Arc::clone(&store),
        Arc::new(rsa),
        Arc::new(Aes128Cbc),
        Arc::new(OsRandom),
    );

    let registering = matches!(cli.command, Commands::Register { .. });
    let outcome = run(&mut client, cli.command, cli.json).await;

    // keys installed before a failure are kept, matching the in-memory store
    if let Some(path) = &client.config().key_store_path {
        store.save(path)?;
    }
    if let (true, Some(identity)) = (registering, &client.config().identity) {
        client.config().save(&config_path)?;
        info!("Identity {} ({}) saved to {}", identity.name, identity.client_id, config_path);
    }
    outcome
}

async fn run(client: &mut Client<TcpTransport>, command: Commands, json: bool) -> Result<()> {
    match command {
        Commands::Register { name } => {
            let public_key = std::fs::read_to_string(&client.config().public_key_path)
                .with_context(|| format!("cannot read {:?}", client.config().public_key_path))?;
            let identity = client.register(&name, public_key.trim()).await?;
            if json {
                println!("{}", serde_json::json!({"name": identity.name, "client_id": identity.client_id}));
            } else {
                println!("Registered '{}' with client id {}", identity.name, identity.client_id);
            }
        }
        Commands::Login => {
            client.login().await?;
            report(json, "Logged in");
        }
        Commands::Users => {
            let users = client.list_users().await?;
            if json {
                let users: Vec<_> = users
                    .iter()
                    .map(|u| serde_json::json!({"id": u.id, "name": u.name}))
                    .collect();
                println!("{}", serde_json::json!({ "users": users }));
            } else if users.is_empty() {
                println!("No clients found.");
            } else {
                for user in users {
                    println!("{:<16}  {}", user.id, user.name);
                }
            }
        }
        Commands::PublicKey { peer } => {
            let (id, public_key) = client.public_key(&peer).await?;
            if json {
                println!("{}", serde_json::json!({"id": id, "public_key": public_key}));
            } else {
                println!("{}\n{}", id, public_key);
            }
        }
        Commands::ExchangeKey { peer } => {
            let (peer_id, message_id) = client.exchange_key(&peer).await?;
            if json {
                println!("{}", serde_json::json!({"peer": peer, "peer_id": peer_id, "message_id": message_id}));
            } else {
                println!("Symmetric key sent to {} ({}) as message {}", peer, peer_id, message_id);
            }
        }
        Commands::Send { peer, text } => {
            let message_id = client.send_text(&peer, &text.join(" ")).await?;
            report(json, &format!("Message {} queued for {}", message_id, peer));
        }
        Commands::Messages => {
            let deliveries = client.fetch_messages().await?;
            if json {
                let items: Vec<_> = deliveries.iter().map(delivery_json).collect();
                println!("{}", serde_json::json!({ "messages": items }));
            } else if deliveries.is_empty() {
                println!("No waiting messages.");
            } else {
                for delivery in &deliveries {
                    print_delivery(delivery);
                }
            }
        }
        Commands::Logout => {
            client.logout().await?;
            report(json, "Logged out");
        }
        Commands::Keygen { .. } | Commands::Keys | Commands::GenerateConfig { .. } => {}
    }
    Ok(())
}

fn report(json: bool, status: &str) {
    if json {
        println!("{}", serde_json::json!({ "status": status }));
    } else {
        println!("{}", status);
    }
}

fn fingerprint(key: &[u8]) -> String {
    hex::encode(&Sha256::digest(key)[..8])
}

fn print_keys(store: &KeyStore, json: bool) {
    let peers = store.peers();
    let rows: Vec<(String, String)> = peers
        .into_iter()
        .filter_map(|peer| store.get(&peer).map(|key| (peer, fingerprint(&key))))
        .collect();

    if json {
        let keys: Vec<_> = rows
            .iter()
            .map(|(peer, fp)| serde_json::json!({"peer": peer, "fingerprint": fp}))
            .collect();
        println!("{}", serde_json::json!({ "keys": keys }));
    } else if rows.is_empty() {
        println!("No symmetric keys stored.");
    } else {
        for (peer, fp) in rows {
            println!("{:<16}  {}", peer, fp);
        }
    }
}

fn delivery_json(delivery: &Delivery) -> serde_json::Value {
    match delivery {
        Delivery::KeyInstalled { from, message_id } =>
            serde_json::json!({"id": message_id, "from": from, "kind": "key"}),
        Delivery::Text { from, message_id, text } =>
            serde_json::json!({"id": message_id, "from": from, "kind": "text", "text": text}),
        Delivery::Failed { from, message_id, error } =>
            serde_json::json!({"id": message_id, "from": from, "kind": "error", "error": error.to_string()}),
        Delivery::Unsupported { from, message_id, message_type } =>
            serde_json::json!({"id": message_id, "from": from, "kind": "unsupported", "type": message_type}),
    }
}

fn print_delivery(delivery: &Delivery) {
    match delivery {
        Delivery::KeyInstalled { from, message_id } =>
            println!("[{}] {}: symmetric key received", message_id, from),
        Delivery::Text { from, message_id, text } =>
            println!("[{}] {}: {}", message_id, from, text),
        Delivery::Failed { from, message_id, error } =>
            println!("[{}] {}: can't decrypt message ({})", message_id, from, error),
        Delivery::Unsupported { from, message_id, message_type } =>
            println!("[{}] {}: unsupported message type {}", message_id, from, message_type),
    }
}
