//! Builder for [`ConnectParams`].

use super::{ConnectParams, TransportKind};
use crate::auth::DEFAULT_PLUGIN_LIST;
use crate::{FbError, FbResult, DEFAULT_PORT};
use secstr::SecUtf8;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct ConnectParamsBuilder {
    kind: TransportKind,
    host: Option<String>,
    port: u16,
    database: Option<String>,
    user: Option<String>,
    password: SecUtf8,
    role: Option<String>,
    charset: String,
    auth_plugin_list: String,
    wire_compression: bool,
    wire_crypt: bool,
    dummy_packet_interval: Option<Duration>,
    connect_timeout: Option<Duration>,
    expected_db: Option<String>,
    utf8_filename: bool,
}

impl Default for ConnectParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectParamsBuilder {
    pub fn new() -> Self {
        Self {
            kind: TransportKind::Inet,
            host: None,
            port: DEFAULT_PORT,
            database: None,
            user: None,
            password: SecUtf8::from(""),
            role: None,
            charset: "UTF8".to_owned(),
            auth_plugin_list: DEFAULT_PLUGIN_LIST.to_owned(),
            wire_compression: false,
            wire_crypt: true,
            dummy_packet_interval: None,
            connect_timeout: Some(Duration::from_secs(10)),
            expected_db: None,
            utf8_filename: true,
        }
    }

    pub fn kind(&mut self, kind: TransportKind) -> &mut Self {
        self.kind = kind;
        self
    }

    pub fn host<S: AsRef<str>>(&mut self, host: S) -> &mut Self {
        self.host = Some(host.as_ref().to_owned());
        self
    }

    pub fn port(&mut self, port: u16) -> &mut Self {
        self.port = port;
        self
    }

    pub fn database<S: AsRef<str>>(&mut self, database: S) -> &mut Self {
        self.database = Some(database.as_ref().to_owned());
        self
    }

    pub fn user<S: AsRef<str>>(&mut self, user: S) -> &mut Self {
        self.user = Some(user.as_ref().to_owned());
        self
    }

    pub fn password<S: AsRef<str>>(&mut self, password: S) -> &mut Self {
        self.password = SecUtf8::from(password.as_ref());
        self
    }

    pub fn role<S: AsRef<str>>(&mut self, role: S) -> &mut Self {
        self.role = Some(role.as_ref().to_owned());
        self
    }

    pub fn charset<S: AsRef<str>>(&mut self, charset: S) -> &mut Self {
        self.charset = charset.as_ref().to_owned();
        self
    }

    pub fn auth_plugin_list<S: AsRef<str>>(&mut self, list: S) -> &mut Self {
        self.auth_plugin_list = list.as_ref().to_owned();
        self
    }

    pub fn wire_compression(&mut self, compress: bool) -> &mut Self {
        self.wire_compression = compress;
        self
    }

    pub fn wire_crypt(&mut self, crypt: bool) -> &mut Self {
        self.wire_crypt = crypt;
        self
    }

    pub fn dummy_packet_interval(&mut self, interval: Option<Duration>) -> &mut Self {
        self.dummy_packet_interval = interval;
        self
    }

    pub fn connect_timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn expected_db<S: AsRef<str>>(&mut self, expected: S) -> &mut Self {
        self.expected_db = Some(expected.as_ref().to_owned());
        self
    }

    pub fn build(&self) -> FbResult<ConnectParams> {
        let host = self
            .host
            .clone()
            .ok_or_else(|| FbError::ConnParams("no host given".to_owned()))?;
        let database = self
            .database
            .clone()
            .ok_or_else(|| FbError::ConnParams("no database path given".to_owned()))?;
        Ok(ConnectParams {
            kind: self.kind,
            host,
            port: self.port,
            database,
            user: self.user.clone().unwrap_or_else(default_user),
            password: self.password.clone(),
            role: self.role.clone(),
            charset: self.charset.clone(),
            auth_plugin_list: self.auth_plugin_list.clone(),
            wire_compression: self.wire_compression,
            wire_crypt: self.wire_crypt,
            dummy_packet_interval: self.dummy_packet_interval,
            connect_timeout: self.connect_timeout,
            expected_db: self.expected_db.clone(),
            utf8_filename: self.utf8_filename,
        })
    }
}

fn default_user() -> String {
    username::get_user_name().unwrap_or_default()
}
