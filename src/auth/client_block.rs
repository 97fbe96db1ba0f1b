//! Client-side authentication state: the ordered plugin iterator, the
//! conversation data shuttled between packets and plugins, and the crypt
//! keys accumulated for the port.

use crate::auth::plugin::{client_plugin, AuthClientPlugin};
use crate::auth::wire_crypt::CryptKey;
use crate::auth::SYMMETRIC_KEY;
use crate::protocol::clumplet::{ClumpletReader, ClumpletWriter};
use crate::{FbError, FbResult};
use secstr::SecUtf8;

// tags of the negotiated-keys blob carried by cond_accept/cont_auth
const TAG_KEY_TYPE: u8 = 1;
const TAG_PLUGIN_NAME: u8 = 2;

/// Packs the server's crypt-key offer: a key type plus the cipher plugins
/// able to use it.
pub fn pack_keys(key_type: &str, plugins: &[&str]) -> Vec<u8> {
    let mut w = ClumpletWriter::untagged();
    w.insert_str(TAG_KEY_TYPE, key_type);
    for plugin in plugins {
        w.insert_str(TAG_PLUGIN_NAME, plugin);
    }
    w.into_bytes()
}

/// The cipher plugins a keys blob offers.
pub fn known_plugins(blob: &[u8]) -> Vec<String> {
    ClumpletReader::untagged(blob)
        .flatten()
        .filter(|c| c.tag == TAG_PLUGIN_NAME)
        .map(|c| c.as_str())
        .collect()
}

/// Client half of the authentication handshake.
pub struct ClientAuthBlock {
    login: String,
    password: SecUtf8,
    plugin_names: Vec<String>,
    current: usize,
    plugin: Option<Box<dyn AuthClientPlugin>>,
    keys: Vec<CryptKey>,
    offered_ciphers: Vec<String>,
    complete: bool,
}

impl std::fmt::Debug for ClientAuthBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "ClientAuthBlock(login={}, plugins={:?}, complete={})",
            self.login, self.plugin_names, self.complete
        )
    }
}

impl ClientAuthBlock {
    pub fn new(login: &str, password: SecUtf8, plugin_list: &str) -> FbResult<Self> {
        let plugin_names: Vec<String> = plugin_list
            .split([',', ' ', '\t'])
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        if plugin_names.is_empty() {
            return Err(FbError::ConnParams("empty auth plugin list".to_owned()));
        }
        Ok(Self {
            login: login.to_owned(),
            password,
            plugin_names,
            current: 0,
            plugin: None,
            keys: Vec::new(),
            offered_ciphers: Vec::new(),
            complete: false,
        })
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    /// The comma-separated list sent in the connect offer.
    pub fn plugin_list(&self) -> String {
        self.plugin_names.join(",")
    }

    pub fn plugin_name(&self) -> Option<&str> {
        self.plugin.as_ref().map(|p| p.name())
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn set_complete(&mut self) {
        self.complete = true;
        self.harvest_key();
    }

    /// Instantiates the first usable plugin and returns its opening
    /// payload.
    pub fn initial_payload(&mut self) -> FbResult<Vec<u8>> {
        while self.current < self.plugin_names.len() {
            if let Some(mut plugin) = client_plugin(&self.plugin_names[self.current]) {
                let data = plugin.initial_data(&self.login, &self.password)?;
                self.plugin = Some(plugin);
                return Ok(data);
            }
            trace!(
                "skipping unavailable auth plugin {}",
                self.plugin_names[self.current]
            );
            self.current += 1;
        }
        Err(FbError::gds(crate::gds::LOGIN))
    }

    /// True when the server-named plugin appears in our own list.
    pub fn check_plugin_name(&self, name: &str) -> bool {
        self.plugin_names.iter().any(|p| p == name)
    }

    /// Switches the iterator to the server-named plugin; the name must be
    /// validated against our list first.
    pub fn switch_plugin(&mut self, name: &str) -> FbResult<()> {
        if self.plugin_name() == Some(name) {
            return Ok(());
        }
        let index = self
            .plugin_names
            .iter()
            .position(|p| p == name)
            .ok_or_else(|| FbError::gds(crate::gds::LOGIN))?;
        let plugin =
            client_plugin(name).ok_or_else(|| FbError::gds(crate::gds::LOGIN))?;
        self.current = index;
        self.plugin = Some(plugin);
        Ok(())
    }

    /// Opening payload of the currently selected plugin, for restarting
    /// the conversation after a server-demanded switch.
    pub fn initial_for_current(&mut self) -> FbResult<Vec<u8>> {
        let login = self.login.clone();
        let password = self.password.clone();
        let plugin = self
            .plugin
            .as_mut()
            .ok_or_else(|| FbError::gds(crate::gds::LOGIN))?;
        plugin.initial_data(&login, &password)
    }

    /// Hands server data to the current plugin and returns its next
    /// message.
    pub fn process(&mut self, server_data: &[u8]) -> FbResult<Vec<u8>> {
        let plugin = self
            .plugin
            .as_mut()
            .ok_or_else(|| FbError::gds(crate::gds::LOGIN))?;
        plugin.continue_auth(server_data, &self.login, &self.password)
    }

    /// Records which cipher plugins the server offered for the session key.
    pub fn store_server_keys(&mut self, blob: &[u8]) {
        for name in known_plugins(blob) {
            if !self.offered_ciphers.contains(&name) {
                self.offered_ciphers.push(name);
            }
        }
    }

    pub fn offered_ciphers(&self) -> &[String] {
        &self.offered_ciphers
    }

    /// The crypt keys accumulated over the handshake, in acquisition order.
    pub fn keys(&self) -> &[CryptKey] {
        &self.keys
    }

    fn harvest_key(&mut self) {
        if let Some(key) = self.plugin.as_ref().and_then(|p| p.session_key()) {
            self.keys.push(CryptKey {
                key_type: SYMMETRIC_KEY.to_owned(),
                key,
            });
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn plugin_list_parsing_and_switching() {
        let mut block =
            ClientAuthBlock::new("SYSDBA", SecUtf8::from("masterkey"), "Srp256, Srp").unwrap();
        assert_eq!(block.plugin_list(), "Srp256,Srp");

        let hello = block.initial_payload().unwrap();
        assert!(!hello.is_empty());
        assert_eq!(block.plugin_name(), Some("Srp256"));

        assert!(block.check_plugin_name("Srp"));
        assert!(!block.check_plugin_name("Legacy_Auth"));
        block.switch_plugin("Srp").unwrap();
        assert_eq!(block.plugin_name(), Some("Srp"));
        assert!(block.switch_plugin("Legacy_Auth").is_err());
    }

    #[test]
    fn keys_blob_round_trip() {
        let blob = pack_keys(crate::auth::SYMMETRIC_KEY, &["Arc4"]);
        assert_eq!(known_plugins(&blob), vec!["Arc4"]);
    }

    #[test]
    fn unknown_plugins_in_list_are_skipped() {
        let mut block =
            ClientAuthBlock::new("U", SecUtf8::from("p"), "NotAPlugin,Srp256").unwrap();
        block.initial_payload().unwrap();
        assert_eq!(block.plugin_name(), Some("Srp256"));
    }
}
