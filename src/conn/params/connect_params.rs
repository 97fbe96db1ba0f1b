//! An immutable set of connection parameters.

use crate::wire::transport::AddrFamily;
use crate::{FbError, FbResult};
use secstr::SecUtf8;
use std::time::Duration;

/// The transport named by the connection string scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    /// TCP, either address family.
    Inet,
    /// TCP over IPv4.
    Inet4,
    /// TCP over IPv6.
    Inet6,
    /// Named pipes; parsed but not connectable by this engine.
    Wnet,
    /// Shared memory; parsed but not connectable by this engine.
    Xnet,
}

impl TransportKind {
    pub(crate) fn addr_family(self) -> FbResult<AddrFamily> {
        match self {
            Self::Inet => Ok(AddrFamily::Any),
            Self::Inet4 => Ok(AddrFamily::V4),
            Self::Inet6 => Ok(AddrFamily::V6),
            Self::Wnet | Self::Xnet => {
                Err(FbError::VersionUnsupported("non-socket transport"))
            }
        }
    }

    /// Transports whose writes block symmetrically; fetch pipelining is
    /// suppressed on them.
    pub fn is_symmetric(self) -> bool {
        matches!(self, Self::Wnet | Self::Xnet)
    }

    pub(crate) fn scheme(self) -> &'static str {
        match self {
            Self::Inet => "inet",
            Self::Inet4 => "inet4",
            Self::Inet6 => "inet6",
            Self::Wnet => "wnet",
            Self::Xnet => "xnet",
        }
    }
}

/// Everything needed to establish one attachment or service session.
#[derive(Clone, Debug)]
pub struct ConnectParams {
    pub(crate) kind: TransportKind,
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) database: String,
    pub(crate) user: String,
    pub(crate) password: SecUtf8,
    pub(crate) role: Option<String>,
    pub(crate) charset: String,
    pub(crate) auth_plugin_list: String,
    pub(crate) wire_compression: bool,
    pub(crate) wire_crypt: bool,
    pub(crate) dummy_packet_interval: Option<Duration>,
    pub(crate) connect_timeout: Option<Duration>,
    pub(crate) expected_db: Option<String>,
    pub(crate) utf8_filename: bool,
}

impl ConnectParams {
    pub fn builder() -> super::ConnectParamsBuilder {
        super::ConnectParamsBuilder::new()
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub(crate) fn password(&self) -> &SecUtf8 {
        &self.password
    }

    pub fn role(&self) -> Option<&str> {
        self.role.as_deref()
    }

    pub fn charset(&self) -> &str {
        &self.charset
    }

    pub fn auth_plugin_list(&self) -> &str {
        &self.auth_plugin_list
    }

    pub fn wire_compression(&self) -> bool {
        self.wire_compression
    }

    pub fn wire_crypt(&self) -> bool {
        self.wire_crypt
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout
    }

    pub fn dummy_packet_interval(&self) -> Option<Duration> {
        self.dummy_packet_interval
    }
}

impl std::fmt::Display for ConnectParams {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}://{}@{}:{}/{}",
            self.kind.scheme(),
            self.user,
            self.host,
            self.port,
            self.database
        )
    }
}
