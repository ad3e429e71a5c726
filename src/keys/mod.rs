pub mod cipher;
pub mod exchange;
pub mod store;

pub use cipher::MessageCipher;
pub use exchange::KeyExchangeManager;
pub use store::{KeyStore, SymmetricKey};
