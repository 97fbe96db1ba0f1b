//! Wire-encryption capability objects.
//!
//! The engine treats ciphers as opaque per-direction transforms keyed by a
//! session key the authentication round produced. `Arc4` ships with the
//! engine; further plugins register by name through [`new_cipher`].

use crate::{FbError, FbResult};

/// One direction of an established wire cipher.
pub trait WireCipher: Send {
    fn name(&self) -> &'static str;

    /// Transforms bytes in place (stream ciphers encrypt and decrypt with
    /// the same operation).
    fn transform(&mut self, data: &mut [u8]);
}

impl std::fmt::Debug for dyn WireCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "WireCipher({})", self.name())
    }
}

/// A session key accumulated during authentication, identified by the key
/// type the peer advertised.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CryptKey {
    pub key_type: String,
    pub key: Vec<u8>,
}

/// Instantiates one direction of the named cipher.
pub fn new_cipher(plugin: &str, key: &[u8]) -> FbResult<Box<dyn WireCipher>> {
    match plugin {
        "Arc4" => Ok(Box::new(Arc4::new(key))),
        other => Err(FbError::Protocol(format!(
            "unknown wire crypt plugin {other}"
        ))),
    }
}

/// The alleged RC4 stream cipher.
struct Arc4 {
    s: [u8; 256],
    i: u8,
    j: u8,
}

impl Arc4 {
    fn new(key: &[u8]) -> Self {
        let mut s = [0_u8; 256];
        for (i, v) in s.iter_mut().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            {
                *v = i as u8;
            }
        }
        let mut j = 0_u8;
        if !key.is_empty() {
            for i in 0..256 {
                j = j
                    .wrapping_add(s[i])
                    .wrapping_add(key[i % key.len()]);
                s.swap(i, j as usize);
            }
        }
        Self { s, i: 0, j: 0 }
    }
}

impl WireCipher for Arc4 {
    fn name(&self) -> &'static str {
        "Arc4"
    }

    fn transform(&mut self, data: &mut [u8]) {
        for byte in data {
            self.i = self.i.wrapping_add(1);
            self.j = self.j.wrapping_add(self.s[self.i as usize]);
            self.s.swap(self.i as usize, self.j as usize);
            let k = self.s
                [(self.s[self.i as usize].wrapping_add(self.s[self.j as usize])) as usize];
            *byte ^= k;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn encrypt_then_decrypt_restores_the_stream() {
        let key = b"0123456789abcdef-session-key";
        let mut tx = new_cipher("Arc4", key).unwrap();
        let mut rx = new_cipher("Arc4", key).unwrap();

        let clear: Vec<u8> = (0..10_000_u32).map(|i| (i % 256) as u8).collect();
        let mut data = clear.clone();
        // transform in uneven slices to prove the key stream is continuous
        let (a, b) = data.split_at_mut(3_333);
        tx.transform(a);
        tx.transform(b);
        assert_ne!(data, clear);
        rx.transform(&mut data);
        assert_eq!(data, clear);
    }

    #[test]
    fn unknown_plugin_is_rejected() {
        assert!(new_cipher("ChaCha", b"k").is_err());
    }
}
