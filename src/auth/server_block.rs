//! Server-side authentication state: the mirror of the client handshake.

use crate::auth::plugin::{server_plugin, AuthServerPlugin, UserStore};
use crate::protocol::clumplet::{self, ClumpletReader};
use crate::{FbError, FbResult};
use std::sync::Arc;

/// What the server should put on the wire after digesting client data.
#[derive(Debug)]
pub enum ServerAuthStep {
    /// Send this challenge and wait for another round.
    Challenge(Vec<u8>),
    /// Ask the client to switch to the named plugin (empty challenge).
    Switch(String),
    /// Authentication finished successfully.
    Complete,
}

/// Server half of the authentication handshake for one session.
pub struct ServerAuthBlock {
    store: Arc<dyn UserStore>,
    registered: Vec<String>,
    login: Option<String>,
    plugin: Option<Box<dyn AuthServerPlugin>>,
    complete: bool,
}

impl std::fmt::Debug for ServerAuthBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "ServerAuthBlock(login={:?}, complete={})",
            self.login, self.complete
        )
    }
}

impl ServerAuthBlock {
    pub fn new(store: Arc<dyn UserStore>, plugin_list: &str) -> Self {
        Self {
            store,
            registered: plugin_list
                .split([',', ' ', '\t'])
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect(),
            login: None,
            plugin: None,
            complete: false,
        }
    }

    pub fn login(&self) -> Option<&str> {
        self.login.as_deref()
    }

    pub fn plugin_name(&self) -> Option<&str> {
        self.plugin.as_ref().map(|p| p.name())
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn session_key(&self) -> Option<Vec<u8>> {
        self.plugin.as_ref().and_then(|p| p.session_key())
    }

    /// Digests the connect packet's user identification block.
    pub fn start_from_connect(&mut self, user_id: &[u8]) -> FbResult<ServerAuthStep> {
        let login = ClumpletReader::find(user_id, false, clumplet::CNCT_LOGIN)
            .map(|c| c.as_str())
            .ok_or_else(|| FbError::gds(crate::gds::LOGIN))?;
        let client_plugin = ClumpletReader::find(user_id, false, clumplet::CNCT_PLUGIN_NAME)
            .map(|c| c.as_str())
            .unwrap_or_default();
        let client_list = ClumpletReader::find(user_id, false, clumplet::CNCT_PLUGIN_LIST)
            .map(|c| c.as_str())
            .unwrap_or_default();
        let data = ClumpletReader::collect_chunked(user_id, false, clumplet::CNCT_SPECIFIC_DATA);

        self.login = Some(login.clone());

        if self.registered.iter().any(|p| *p == client_plugin) {
            let mut plugin = server_plugin(&client_plugin)
                .ok_or_else(|| FbError::gds(crate::gds::LOGIN))?;
            let challenge = plugin.start(&login, &*self.store, &data)?;
            self.plugin = Some(plugin);
            return Ok(ServerAuthStep::Challenge(challenge));
        }

        // the client's preferred plugin is not ours; require one from its
        // list that we do implement
        for candidate in client_list.split([',', ' ', '\t']) {
            if !candidate.is_empty() && self.registered.iter().any(|p| p == candidate) {
                debug!("asking client to switch to auth plugin {candidate}");
                return Ok(ServerAuthStep::Switch(candidate.to_owned()));
            }
        }
        Err(FbError::gds(crate::gds::LOGIN))
    }

    /// Digests one `op_cont_auth` from the client.
    pub fn continue_rounds(&mut self, plugin_name: &str, data: &[u8]) -> FbResult<ServerAuthStep> {
        if self.complete {
            return Ok(ServerAuthStep::Complete);
        }
        let login = self
            .login
            .clone()
            .ok_or_else(|| FbError::gds(crate::gds::LOGIN))?;

        // a named plugin different from the running one restarts the
        // conversation there
        if !plugin_name.is_empty() && self.plugin_name() != Some(plugin_name) {
            if !self.registered.iter().any(|p| p == plugin_name) {
                return Err(FbError::gds(crate::gds::LOGIN));
            }
            let mut plugin =
                server_plugin(plugin_name).ok_or_else(|| FbError::gds(crate::gds::LOGIN))?;
            let challenge = plugin.start(&login, &*self.store, data)?;
            self.plugin = Some(plugin);
            return Ok(ServerAuthStep::Challenge(challenge));
        }

        let plugin = self
            .plugin
            .as_mut()
            .ok_or_else(|| FbError::gds(crate::gds::LOGIN))?;
        match plugin.continue_auth(data)? {
            None => {
                self.complete = true;
                Ok(ServerAuthStep::Complete)
            }
            Some(challenge) => Ok(ServerAuthStep::Challenge(challenge)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::auth::client_block::ClientAuthBlock;
    use crate::auth::srp;
    use crate::protocol::clumplet::ClumpletWriter;
    use secstr::SecUtf8;
    use std::collections::HashMap;

    struct MapStore(HashMap<String, (Vec<u8>, Vec<u8>)>);

    impl UserStore for MapStore {
        fn verifier(&self, login: &str) -> Option<(Vec<u8>, Vec<u8>)> {
            self.0.get(&login.to_uppercase()).cloned()
        }
    }

    fn store_with_sysdba() -> Arc<dyn UserStore> {
        let mut map = HashMap::new();
        map.insert(
            "SYSDBA".to_owned(),
            srp::compute_verifier("SYSDBA", "masterkey"),
        );
        Arc::new(MapStore(map))
    }

    fn user_id_block(block: &mut ClientAuthBlock) -> Vec<u8> {
        let data = block.initial_payload().unwrap();
        let mut w = ClumpletWriter::untagged();
        w.insert_str(clumplet::CNCT_LOGIN, block.login());
        w.insert_str(
            clumplet::CNCT_PLUGIN_NAME,
            block.plugin_name().unwrap_or_default(),
        );
        w.insert_str(clumplet::CNCT_PLUGIN_LIST, &block.plugin_list());
        w.insert_chunked(clumplet::CNCT_SPECIFIC_DATA, &data);
        w.into_bytes()
    }

    #[test]
    fn both_blocks_complete_the_handshake() {
        let mut client =
            ClientAuthBlock::new("SYSDBA", SecUtf8::from("masterkey"), "Srp256,Srp").unwrap();
        let mut server = ServerAuthBlock::new(store_with_sysdba(), "Srp256,Srp");

        let user_id = user_id_block(&mut client);
        let ServerAuthStep::Challenge(challenge) =
            server.start_from_connect(&user_id).unwrap()
        else {
            panic!("expected a challenge");
        };

        let proof = client.process(&challenge).unwrap();
        let step = server.continue_rounds("", &proof).unwrap();
        assert!(matches!(step, ServerAuthStep::Complete));

        client.set_complete();
        assert_eq!(
            client.keys()[0].key,
            server.session_key().unwrap(),
            "both sides must derive the same wire key"
        );
    }

    #[test]
    fn server_asks_for_a_switch_when_preferred_plugin_is_foreign() {
        let mut server = ServerAuthBlock::new(store_with_sysdba(), "Srp");
        let mut w = ClumpletWriter::untagged();
        w.insert_str(clumplet::CNCT_LOGIN, "SYSDBA");
        w.insert_str(clumplet::CNCT_PLUGIN_NAME, "Srp256");
        w.insert_str(clumplet::CNCT_PLUGIN_LIST, "Srp256,Srp");
        let step = server.start_from_connect(w.as_bytes()).unwrap();
        match step {
            ServerAuthStep::Switch(name) => assert_eq!(name, "Srp"),
            other => panic!("expected switch, got {other:?}"),
        }
    }

    #[test]
    fn no_common_plugin_is_a_single_login_error() {
        let mut server = ServerAuthBlock::new(store_with_sysdba(), "Srp");
        let mut w = ClumpletWriter::untagged();
        w.insert_str(clumplet::CNCT_LOGIN, "SYSDBA");
        w.insert_str(clumplet::CNCT_PLUGIN_NAME, "Legacy_Auth");
        w.insert_str(clumplet::CNCT_PLUGIN_LIST, "Legacy_Auth");
        let err = server.start_from_connect(w.as_bytes()).unwrap_err();
        assert!(matches!(err, FbError::Login { .. }));
    }
}
