//! The auxiliary channel: a second port per attachment carrying event
//! notifications toward the client and cancellations toward the server.

use crate::conn::attachment::AttachCore;
use crate::conn::TransportKind;
use crate::port::{PortState, RemotePort};
use crate::protocol::packets::events::REQ_ASYNC;
use crate::protocol::packets::ConnectRequest;
use crate::protocol::versions::PTYPE_MASK;
use crate::protocol::Packet;
use crate::{gds, FbError, FbResult};
use std::net::TcpStream;

const AF_INET_TAG: u16 = 2;

/// Packs the server's auxiliary endpoint as an opaque address blob
/// (sockaddr shape: family, port, address, padding). The client rewrites
/// the host with the address it already dialed, so only the port matters
/// across NAT.
pub(crate) fn pack_aux_addr(port: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(16);
    out.extend_from_slice(&AF_INET_TAG.to_be_bytes());
    out.extend_from_slice(&port.to_be_bytes());
    out.extend_from_slice(&[0_u8; 12]);
    out
}

pub(crate) fn parse_aux_addr(data: &[u8]) -> FbResult<u16> {
    if data.len() < 4 {
        return Err(FbError::Protocol("short aux address blob".to_owned()));
    }
    Ok(u16::from_be_bytes([data[2], data[3]]))
}

/// Returns the attachment's auxiliary port, opening it (and its listener
/// thread) on first use.
pub(crate) fn ensure_aux(att: &AttachCore) -> FbResult<RemotePort> {
    if let Some(aux) = att.port.aux() {
        return Ok(aux);
    }
    let response = att
        .port
        .exchange_response(&Packet::ConnectRequest(ConnectRequest {
            req_type: REQ_ASYNC,
            object: att.id,
            partner: 0,
        }))?;
    let aux_port = parse_aux_addr(&response.data)?;

    let stream = TcpStream::connect((att.params.host(), aux_port)).map_err(|e| {
        let mut sv = crate::StatusVector::from_gds(gds::NET_EVENT_CONNECT_ERR);
        sv.push_str(e.to_string());
        FbError::from_status(sv)
    })?;
    let peer = format!("{}:{aux_port}", att.params.host());
    let aux = RemotePort::from_stream(stream, peer, TransportKind::Inet)?;

    // the aux channel speaks the negotiated version but stays plain: no
    // compression, no encryption
    let negotiated = att.port.negotiated();
    aux.apply_accept(negotiated.raw_version, negotiated.accept_type & PTYPE_MASK)?;

    att.port.set_aux(aux.clone());
    spawn_event_thread(att.port.clone(), aux.clone());
    Ok(aux)
}

fn spawn_event_thread(parent: RemotePort, aux: RemotePort) {
    let spawned = std::thread::Builder::new()
        .name("fbremote-events".to_owned())
        .spawn(move || event_loop(&parent, &aux));
    if let Err(e) = spawned {
        warn!("could not spawn the event thread: {e}");
    }
}

/// One thread per aux port: receive, decode, dispatch. Anything except an
/// event (`op_exit`, `op_disconnect`, an I/O error) means the server is
/// gone, and every still-registered event fires once with zero length.
fn event_loop(parent: &RemotePort, aux: &RemotePort) {
    loop {
        match aux.with_io(crate::port::PortIo::receive_packet) {
            Ok(Packet::Event(body)) => {
                trace!("event notification rid={}", body.rid);
                let entry = parent
                    .objects()
                    .ok()
                    .and_then(|mut objects| {
                        let entry = objects.event_by_rid(body.rid);
                        if entry.is_some() {
                            objects.remove(crate::conn::events::event_key(body.rid));
                        }
                        entry
                    });
                if let Some(entry) = entry {
                    entry.fire(body.items);
                }
            }
            Ok(Packet::Exit | Packet::Disconnect) => {
                if parent.state() == PortState::Pending {
                    parent.on_server_death();
                }
                return;
            }
            Ok(other) => {
                warn!("unexpected {:?} on the aux channel", other.op());
            }
            Err(_) => {
                if parent.state() == PortState::Pending {
                    parent.on_server_death();
                }
                return;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn aux_addr_round_trip() {
        let blob = pack_aux_addr(49_152);
        assert_eq!(blob.len(), 16);
        assert_eq!(parse_aux_addr(&blob).unwrap(), 49_152);
    }
}
