//! Capability traits for authentication plugins and the registry of the
//! built-in ones.

use crate::auth::srp::{self, ProofHash, SrpClient, SrpServer};
use crate::{FbError, FbResult};
use secstr::SecUtf8;

/// Client side of one authentication plugin conversation.
pub trait AuthClientPlugin: Send {
    fn name(&self) -> &'static str;

    /// Payload for the opening offer (may be empty).
    fn initial_data(&mut self, login: &str, password: &SecUtf8) -> FbResult<Vec<u8>>;

    /// Digest server data and produce the next message.
    fn continue_auth(
        &mut self,
        server_data: &[u8],
        login: &str,
        password: &SecUtf8,
    ) -> FbResult<Vec<u8>>;

    /// The symmetric session key, once the conversation produced one.
    fn session_key(&self) -> Option<Vec<u8>>;
}

/// Server side of one authentication plugin conversation.
pub trait AuthServerPlugin: Send {
    fn name(&self) -> &'static str;

    /// Digest the client's opening payload and produce the challenge.
    fn start(
        &mut self,
        login: &str,
        store: &dyn UserStore,
        client_data: &[u8],
    ) -> FbResult<Vec<u8>>;

    /// Digest one continuation round. `Ok(None)` means the conversation
    /// completed successfully; `Ok(Some(data))` asks for another round.
    fn continue_auth(&mut self, client_data: &[u8]) -> FbResult<Option<Vec<u8>>>;

    fn session_key(&self) -> Option<Vec<u8>>;
}

/// Account lookup the server-side plugins authenticate against.
pub trait UserStore: Send + Sync {
    /// The stored `(salt, verifier)` of an account, or None when unknown.
    fn verifier(&self, login: &str) -> Option<(Vec<u8>, Vec<u8>)>;
}

/// Instantiates a client plugin by name.
pub fn client_plugin(name: &str) -> Option<Box<dyn AuthClientPlugin>> {
    match name {
        "Srp256" => Some(Box::new(SrpClientPlugin::new("Srp256", ProofHash::Sha256))),
        "Srp" => Some(Box::new(SrpClientPlugin::new("Srp", ProofHash::Sha1))),
        _ => None,
    }
}

/// Instantiates a server plugin by name.
pub fn server_plugin(name: &str) -> Option<Box<dyn AuthServerPlugin>> {
    match name {
        "Srp256" => Some(Box::new(SrpServerPlugin::new("Srp256", ProofHash::Sha256))),
        "Srp" => Some(Box::new(SrpServerPlugin::new("Srp", ProofHash::Sha1))),
        _ => None,
    }
}

struct SrpClientPlugin {
    name: &'static str,
    proof_hash: ProofHash,
    srp: SrpClient,
    done: bool,
}

impl SrpClientPlugin {
    fn new(name: &'static str, proof_hash: ProofHash) -> Self {
        Self {
            name,
            proof_hash,
            srp: SrpClient::new(),
            done: false,
        }
    }
}

impl AuthClientPlugin for SrpClientPlugin {
    fn name(&self) -> &'static str {
        self.name
    }

    fn initial_data(&mut self, _login: &str, _password: &SecUtf8) -> FbResult<Vec<u8>> {
        Ok(self.srp.public_hex())
    }

    fn continue_auth(
        &mut self,
        server_data: &[u8],
        login: &str,
        password: &SecUtf8,
    ) -> FbResult<Vec<u8>> {
        if self.done {
            return Err(FbError::Protocol(
                "authentication round after completion".to_owned(),
            ));
        }
        let proof =
            self.srp
                .client_proof(login, password.unsecure(), server_data, self.proof_hash)?;
        self.done = true;
        Ok(proof)
    }

    fn session_key(&self) -> Option<Vec<u8>> {
        self.srp.session_key().map(<[u8]>::to_vec)
    }
}

impl std::fmt::Debug for SrpClientPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "SrpClientPlugin({})", self.name)
    }
}

struct SrpServerPlugin {
    name: &'static str,
    proof_hash: ProofHash,
    srp: Option<SrpServer>,
    verified: bool,
}

impl SrpServerPlugin {
    fn new(name: &'static str, proof_hash: ProofHash) -> Self {
        Self {
            name,
            proof_hash,
            srp: None,
            verified: false,
        }
    }
}

impl AuthServerPlugin for SrpServerPlugin {
    fn name(&self) -> &'static str {
        self.name
    }

    fn start(
        &mut self,
        login: &str,
        store: &dyn UserStore,
        client_data: &[u8],
    ) -> FbResult<Vec<u8>> {
        // Unknown accounts get a throwaway verifier so the conversation
        // shape does not reveal whether the login exists.
        let (salt, verifier) = store
            .verifier(login)
            .unwrap_or_else(|| srp::compute_verifier(login, &random_password()));
        let srp = SrpServer::new(login, client_data, salt, &verifier)?;
        let challenge = srp.challenge();
        self.srp = Some(srp);
        Ok(challenge)
    }

    fn continue_auth(&mut self, client_data: &[u8]) -> FbResult<Option<Vec<u8>>> {
        let srp = self
            .srp
            .as_mut()
            .ok_or_else(|| FbError::Protocol("authentication round before start".to_owned()))?;
        if srp.verify(client_data, self.proof_hash) {
            self.verified = true;
            Ok(None)
        } else {
            Err(FbError::gds(crate::gds::LOGIN))
        }
    }

    fn session_key(&self) -> Option<Vec<u8>> {
        if self.verified {
            self.srp
                .as_ref()
                .and_then(SrpServer::session_key)
                .map(<[u8]>::to_vec)
        } else {
            None
        }
    }
}

impl std::fmt::Debug for SrpServerPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "SrpServerPlugin({})", self.name)
    }
}

fn random_password() -> String {
    use rand::RngCore;
    let mut bytes = [0_u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    struct MapStore(HashMap<String, (Vec<u8>, Vec<u8>)>);

    impl UserStore for MapStore {
        fn verifier(&self, login: &str) -> Option<(Vec<u8>, Vec<u8>)> {
            self.0.get(&login.to_uppercase()).cloned()
        }
    }

    #[test]
    fn client_and_server_plugins_complete_a_conversation() {
        let mut store = HashMap::new();
        store.insert(
            "SYSDBA".to_owned(),
            srp::compute_verifier("SYSDBA", "masterkey"),
        );
        let store = MapStore(store);

        for name in ["Srp256", "Srp"] {
            let mut client = client_plugin(name).unwrap();
            let mut server = server_plugin(name).unwrap();
            let password = SecUtf8::from("masterkey");

            let hello = client.initial_data("SYSDBA", &password).unwrap();
            let challenge = server.start("SYSDBA", &store, &hello).unwrap();
            let proof = client
                .continue_auth(&challenge, "SYSDBA", &password)
                .unwrap();
            assert!(server.continue_auth(&proof).unwrap().is_none());
            assert_eq!(client.session_key(), server.session_key());
        }
    }

    #[test]
    fn unknown_user_fails_like_a_bad_password() {
        let store = MapStore(HashMap::new());
        let mut client = client_plugin("Srp256").unwrap();
        let mut server = server_plugin("Srp256").unwrap();
        let password = SecUtf8::from("whatever");

        let hello = client.initial_data("GHOST", &password).unwrap();
        let challenge = server.start("GHOST", &store, &hello).unwrap();
        let proof = client.continue_auth(&challenge, "GHOST", &password).unwrap();
        let err = server.continue_auth(&proof).unwrap_err();
        assert!(matches!(err, FbError::Login { .. }));
    }
}
