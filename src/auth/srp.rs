//! SRP-6a over the 1024-bit group, in the shape the remote protocol uses:
//! public keys travel hex-encoded, the server challenge is the user's salt
//! plus the server public key, and the client proof hash distinguishes the
//! `Srp` (SHA-1) and `Srp256` (SHA-256) plugin variants. The session key
//! feeds the wire-encryption plugins.

use crate::{FbError, FbResult};
use num_bigint::BigUint;
use rand::RngCore;
use sha1::{Digest, Sha1};
use sha2::Sha256;

const PRIME_HEX: &str = "EEAF0AB9ADB38DD69C33F80AFA8FC5E86072618775FF3C0B9EA2314C\
                         9C256576D674DF7496EA81D3383B4813D692C6E0E0D5D8E250B98BE4\
                         8E495C1D6089DAD15DC7D7B46154D6B6CE8EF4AD69B15D4982559B29\
                         7BCF1885C529F566660E57EC68EDBC3C05726CC02FD4CBF4976EAA9A\
                         FD5138FE8376435B9FC61D2FC0EB06E3";
const GENERATOR: u32 = 2;

/// Length in bytes of the salt a server stores per account.
pub const SALT_LENGTH: usize = 32;

/// Which hash closes the client proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProofHash {
    Sha1,
    Sha256,
}

fn prime() -> BigUint {
    BigUint::parse_bytes(PRIME_HEX.as_bytes(), 16).unwrap(/* constant */)
}

fn generator() -> BigUint {
    BigUint::from(GENERATOR)
}

fn sha1_of(parts: &[&[u8]]) -> Vec<u8> {
    let mut h = Sha1::new();
    for p in parts {
        h.update(p);
    }
    h.finalize().to_vec()
}

fn sha256_of(parts: &[&[u8]]) -> Vec<u8> {
    let mut h = Sha256::new();
    for p in parts {
        h.update(p);
    }
    h.finalize().to_vec()
}

fn hash_to_int(parts: &[&[u8]]) -> BigUint {
    BigUint::from_bytes_be(&sha1_of(parts))
}

// k = H(N, g)
fn multiplier() -> BigUint {
    let n = prime();
    let g = generator();
    hash_to_int(&[&n.to_bytes_be(), &g.to_bytes_be()]) % n
}

// x = H(salt, H(user:password)), with the login uppercased as account
// names are case-insensitive
fn private_key(login: &str, password: &str, salt: &[u8]) -> BigUint {
    let identity = sha1_of(&[login.to_uppercase().as_bytes(), b":", password.as_bytes()]);
    hash_to_int(&[salt, &identity])
}

fn random_ephemeral() -> BigUint {
    let mut bytes = [0_u8; 128];
    rand::thread_rng().fill_bytes(&mut bytes);
    BigUint::from_bytes_be(&bytes) % prime()
}

/// Computes `(salt, verifier)` for storing a new account.
pub fn compute_verifier(login: &str, password: &str) -> (Vec<u8>, Vec<u8>) {
    let mut salt = vec![0_u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt);
    let x = private_key(login, password, &salt);
    let v = generator().modpow(&x, &prime());
    (salt, v.to_bytes_be())
}

/// Packs the server challenge: `{u16 len, salt} {u16 len, hex(B)}`.
pub fn pack_challenge(salt: &[u8], server_pub_hex: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + salt.len() + server_pub_hex.len());
    #[allow(clippy::cast_possible_truncation)]
    out.extend_from_slice(&(salt.len() as u16).to_le_bytes());
    out.extend_from_slice(salt);
    #[allow(clippy::cast_possible_truncation)]
    out.extend_from_slice(&(server_pub_hex.len() as u16).to_le_bytes());
    out.extend_from_slice(server_pub_hex);
    out
}

/// Splits a server challenge back into `(salt, hex(B))`.
pub fn unpack_challenge(data: &[u8]) -> FbResult<(Vec<u8>, Vec<u8>)> {
    let take = |data: &[u8]| -> FbResult<(Vec<u8>, usize)> {
        if data.len() < 2 {
            return Err(FbError::Protocol("short auth challenge".to_owned()));
        }
        let len = u16::from_le_bytes([data[0], data[1]]) as usize;
        if data.len() < 2 + len {
            return Err(FbError::Protocol("malformed auth challenge".to_owned()));
        }
        Ok((data[2..2 + len].to_vec(), 2 + len))
    };
    let (salt, used) = take(data)?;
    let (pub_hex, _) = take(&data[used..])?;
    Ok((salt, pub_hex))
}

/// Client half of one SRP conversation.
#[derive(Debug)]
pub struct SrpClient {
    secret: BigUint,
    public: BigUint,
    session_key: Option<Vec<u8>>,
}

impl SrpClient {
    pub fn new() -> Self {
        let secret = random_ephemeral();
        let public = generator().modpow(&secret, &prime());
        Self {
            secret,
            public,
            session_key: None,
        }
    }

    /// Hex-encoded `A`, the payload of the client's opening offer.
    pub fn public_hex(&self) -> Vec<u8> {
        hex::encode_upper(self.public.to_bytes_be()).into_bytes()
    }

    /// Digests the server challenge and produces the hex-encoded proof.
    pub fn client_proof(
        &mut self,
        login: &str,
        password: &str,
        challenge: &[u8],
        proof_hash: ProofHash,
    ) -> FbResult<Vec<u8>> {
        let (salt, server_pub_hex) = unpack_challenge(challenge)?;
        let server_pub = decode_pub(&server_pub_hex)?;
        let n = prime();
        if &server_pub % &n == BigUint::default() {
            return Err(FbError::Protocol("bad server public key".to_owned()));
        }

        let u = hash_to_int(&[&self.public.to_bytes_be(), &server_pub.to_bytes_be()]);
        let x = private_key(login, password, &salt);
        let k = multiplier();
        let v = generator().modpow(&x, &n);

        // S = (B - k*v) ^ (a + u*x)
        let base = (&server_pub + &n - (k * v) % &n) % &n;
        let exp = &self.secret + u * &x;
        let session = base.modpow(&exp, &n);
        let key = sha1_of(&[&session.to_bytes_be()]);

        let proof = proof(
            login,
            &salt,
            &self.public.to_bytes_be(),
            &server_pub.to_bytes_be(),
            &key,
            proof_hash,
        );
        self.session_key = Some(key);
        Ok(hex::encode_upper(proof).into_bytes())
    }

    pub fn session_key(&self) -> Option<&[u8]> {
        self.session_key.as_deref()
    }
}

impl Default for SrpClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Server half of one SRP conversation.
#[derive(Debug)]
pub struct SrpServer {
    secret: BigUint,
    public: BigUint,
    client_pub: BigUint,
    salt: Vec<u8>,
    verifier: BigUint,
    login: String,
    session_key: Option<Vec<u8>>,
}

impl SrpServer {
    /// Starts a conversation from the client's hex-encoded `A` and the
    /// account's stored `(salt, verifier)`.
    pub fn new(login: &str, client_pub_hex: &[u8], salt: Vec<u8>, verifier: &[u8]) -> FbResult<Self> {
        let n = prime();
        let client_pub = decode_pub(client_pub_hex)?;
        if &client_pub % &n == BigUint::default() {
            return Err(FbError::Protocol("bad client public key".to_owned()));
        }
        let verifier = BigUint::from_bytes_be(verifier);
        let secret = random_ephemeral();
        // B = k*v + g^b
        let public = ((multiplier() * &verifier) % &n + generator().modpow(&secret, &n)) % &n;
        Ok(Self {
            secret,
            public,
            client_pub,
            salt,
            verifier,
            login: login.to_owned(),
            session_key: None,
        })
    }

    /// The challenge blob handed to the client.
    pub fn challenge(&self) -> Vec<u8> {
        pack_challenge(
            &self.salt,
            hex::encode_upper(self.public.to_bytes_be()).as_bytes(),
        )
    }

    /// Verifies the hex-encoded client proof; success yields the session
    /// key.
    pub fn verify(&mut self, proof_hex: &[u8], proof_hash: ProofHash) -> bool {
        let n = prime();
        let u = hash_to_int(&[&self.client_pub.to_bytes_be(), &self.public.to_bytes_be()]);
        // S = (A * v^u) ^ b
        let session = ((&self.client_pub * self.verifier.modpow(&u, &n)) % &n)
            .modpow(&self.secret, &n);
        let key = sha1_of(&[&session.to_bytes_be()]);
        let expected = proof(
            &self.login,
            &self.salt,
            &self.client_pub.to_bytes_be(),
            &self.public.to_bytes_be(),
            &key,
            proof_hash,
        );
        let expected_hex = hex::encode_upper(expected).into_bytes();
        if expected_hex == proof_hex {
            self.session_key = Some(key);
            true
        } else {
            false
        }
    }

    pub fn session_key(&self) -> Option<&[u8]> {
        self.session_key.as_deref()
    }
}

// M = H(H(N) xor H(g), H(login), salt, A, B, K)
fn proof(
    login: &str,
    salt: &[u8],
    client_pub: &[u8],
    server_pub: &[u8],
    key: &[u8],
    proof_hash: ProofHash,
) -> Vec<u8> {
    let n_hash = sha1_of(&[&prime().to_bytes_be()]);
    let g_hash = sha1_of(&[&generator().to_bytes_be()]);
    let mixed: Vec<u8> = n_hash
        .iter()
        .zip(g_hash.iter())
        .map(|(a, b)| a ^ b)
        .collect();
    let login_hash = sha1_of(&[login.to_uppercase().as_bytes()]);
    let parts: [&[u8]; 6] = [&mixed, &login_hash, salt, client_pub, server_pub, key];
    match proof_hash {
        ProofHash::Sha1 => sha1_of(&parts),
        ProofHash::Sha256 => sha256_of(&parts),
    }
}

fn decode_pub(hex_bytes: &[u8]) -> FbResult<BigUint> {
    let raw = hex::decode(hex_bytes)
        .map_err(|_| FbError::Protocol("public key is not valid hex".to_owned()))?;
    Ok(BigUint::from_bytes_be(&raw))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn full_conversation_agrees_on_the_session_key() {
        let (salt, verifier) = compute_verifier("sysdba", "masterkey");

        let mut client = SrpClient::new();
        let mut server =
            SrpServer::new("SYSDBA", &client.public_hex(), salt, &verifier).unwrap();

        let proof = client
            .client_proof("SYSDBA", "masterkey", &server.challenge(), ProofHash::Sha256)
            .unwrap();
        assert!(server.verify(&proof, ProofHash::Sha256));
        assert_eq!(client.session_key(), server.session_key());
        assert!(!client.session_key().unwrap().is_empty());
    }

    #[test]
    fn wrong_password_fails_the_proof() {
        let (salt, verifier) = compute_verifier("sysdba", "masterkey");
        let mut client = SrpClient::new();
        let mut server =
            SrpServer::new("SYSDBA", &client.public_hex(), salt, &verifier).unwrap();
        let proof = client
            .client_proof("SYSDBA", "wrong", &server.challenge(), ProofHash::Sha256)
            .unwrap();
        assert!(!server.verify(&proof, ProofHash::Sha256));
    }

    #[test]
    fn sha1_and_sha256_proofs_differ() {
        let (salt, verifier) = compute_verifier("u", "p");
        let mut c1 = SrpClient::new();
        let server = SrpServer::new("U", &c1.public_hex(), salt, &verifier).unwrap();
        let challenge = server.challenge();
        let p1 = c1
            .client_proof("U", "p", &challenge, ProofHash::Sha1)
            .unwrap();
        let p256 = c1
            .client_proof("U", "p", &challenge, ProofHash::Sha256)
            .unwrap();
        assert_ne!(p1, p256);
    }

    #[test]
    fn challenge_packing_round_trip() {
        let packed = pack_challenge(b"salt-bytes", b"AABB");
        let (salt, pub_hex) = unpack_challenge(&packed).unwrap();
        assert_eq!(salt, b"salt-bytes");
        assert_eq!(pub_hex, b"AABB");
    }
}
