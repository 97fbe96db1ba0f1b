//! Service-manager sessions: a near-mirror of attachments whose parameter
//! and response encodings use the service parameter block tag set.

use crate::conn::params::{ConnectParams, IntoConnectParams};
use crate::port::RemotePort;
use crate::protocol::clumplet::{self, ClumpletWriter};
use crate::protocol::ops::OpCode;
use crate::protocol::packets::{AttachBody, ObjectRef, ServiceInfoRq, ServiceStart};
use crate::protocol::Packet;
use crate::FbResult;
use std::sync::atomic::{AtomicBool, Ordering};

/// An open service-manager session. The `database` part of the connection
/// string names the service (conventionally `service_mgr`).
#[derive(Debug)]
pub struct ServiceAttachment {
    port: RemotePort,
    id: u32,
    detached: AtomicBool,
}

impl ServiceAttachment {
    pub fn connect<P: IntoConnectParams>(params: P) -> FbResult<Self> {
        let params = params.into_connect_params()?;
        let port =
            crate::conn::attachment::establish(&params, OpCode::ServiceAttach, None)?;
        let response = port.exchange_response(&Packet::ServiceAttach(AttachBody {
            object: 0,
            path: params.database.clone(),
            pb: build_spb(&params),
        }))?;
        debug!("service attached as object {}", response.object);
        Ok(Self {
            port,
            id: response.object,
            detached: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Invokes a service action described by an SpbStart block.
    pub fn start(&self, spb: &[u8]) -> FbResult<()> {
        self.port
            .exchange_response(&Packet::ServiceStart(ServiceStart {
                object: self.id,
                spb: spb.to_vec(),
            }))
            .map(drop)
    }

    /// Runs a service query round trip and returns the reply buffer.
    pub fn query(
        &self,
        send_items: &[u8],
        recv_items: &[u8],
        buffer_length: u32,
    ) -> FbResult<Vec<u8>> {
        self.port
            .exchange_response(&Packet::ServiceInfo(ServiceInfoRq {
                object: self.id,
                incarnation: 0,
                send_items: send_items.to_vec(),
                recv_items: recv_items.to_vec(),
                buffer_length,
            }))
            .map(|r| r.data)
    }

    /// Detaches from the service manager; a second call is a local no-op.
    pub fn detach(&self) -> FbResult<()> {
        if self.detached.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let result = if self.port.is_usable() {
            self.port
                .exchange_response(&Packet::ServiceDetach(ObjectRef::new(self.id)))
                .map(drop)
        } else {
            Ok(())
        };
        self.port.disconnect();
        result
    }
}

impl Drop for ServiceAttachment {
    fn drop(&mut self) {
        let _ = self.detach();
    }
}

fn build_spb(params: &ConnectParams) -> Vec<u8> {
    let mut spb = ClumpletWriter::new(clumplet::SPB_CURRENT_VERSION);
    spb.insert_str(clumplet::SPB_USER_NAME, params.user());
    if let Some(expected) = &params.expected_db {
        spb.insert_str(clumplet::SPB_EXPECTED_DB, expected);
    }
    if params.utf8_filename {
        spb.insert_bytes(clumplet::SPB_UTF8_FILENAME, &[]);
    }
    spb.into_bytes()
}
