//! The authentication sub-protocol: pluggable multi-round client/server
//! handshake and the wire-encryption capability objects it can bootstrap.

pub mod client_block;
pub mod plugin;
pub mod server_block;
pub mod srp;
pub mod wire_crypt;

pub use client_block::ClientAuthBlock;
pub use plugin::{client_plugin, server_plugin, AuthClientPlugin, AuthServerPlugin, UserStore};
pub use server_block::ServerAuthBlock;
pub use wire_crypt::{new_cipher, CryptKey, WireCipher};

/// Plugin list offered when the caller does not configure one.
pub const DEFAULT_PLUGIN_LIST: &str = "Srp256,Srp";

/// Name of the symmetric session key every SRP round yields.
pub const SYMMETRIC_KEY: &str = "Symmetric";

/// Default wire-encryption plugin.
pub const DEFAULT_CRYPT_PLUGIN: &str = "Arc4";
