//! Connection parameters: the target, the identity, and the per-connection
//! feature switches, plus parsing of the accepted connection-string forms.

mod connect_params;
mod connect_params_builder;
mod cp_url;

pub use connect_params::{ConnectParams, TransportKind};
pub use connect_params_builder::ConnectParamsBuilder;

use crate::FbResult;

/// A trait implemented by types that can be converted into
/// [`ConnectParams`].
pub trait IntoConnectParams {
    fn into_connect_params(self) -> FbResult<ConnectParams>;
}

impl IntoConnectParams for ConnectParams {
    fn into_connect_params(self) -> FbResult<ConnectParams> {
        Ok(self)
    }
}

impl IntoConnectParams for &str {
    fn into_connect_params(self) -> FbResult<ConnectParams> {
        cp_url::parse(self)?.build()
    }
}

impl IntoConnectParams for String {
    fn into_connect_params(self) -> FbResult<ConnectParams> {
        self.as_str().into_connect_params()
    }
}
