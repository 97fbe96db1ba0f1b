//! Compiled (BLR) requests with their per-message-number receive queues.

use crate::conn::attachment::AttachCore;
use crate::conn::transaction::Transaction;
use crate::port::RemotePort;
use crate::protocol::packets::{Compile, InfoRq, ObjectRef, RequestIo, RequestSend};
use crate::protocol::Packet;
use crate::{FbError, FbResult};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub(crate) struct RequestCore {
    port: RemotePort,
    id: u32,
    /// Inbound messages by message number, in arrival order.
    queues: Mutex<HashMap<i32, VecDeque<Vec<u8>>>>,
    released: AtomicBool,
}

impl std::fmt::Debug for RequestCore {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "RequestCore(id={})", self.id)
    }
}

/// A compiled request handle.
#[derive(Debug)]
pub struct Request {
    core: Arc<RequestCore>,
}

impl Request {
    pub(crate) fn compile(att: Arc<AttachCore>, blr: &[u8]) -> FbResult<Self> {
        let response = att.port.exchange_response(&Packet::Compile(Compile {
            database: att.id,
            blr: blr.to_vec(),
        }))?;
        Ok(Self {
            core: Arc::new(RequestCore {
                port: att.port.clone(),
                id: response.object,
                queues: Mutex::new(HashMap::new()),
                released: AtomicBool::new(false),
            }),
        })
    }

    pub fn id(&self) -> u32 {
        self.core.id
    }

    fn io(&self, transaction: &Transaction, message_number: i32, messages: i32) -> RequestIo {
        RequestIo {
            request: self.core.id,
            incarnation: 0,
            transaction: transaction.id(),
            message_number,
            messages,
        }
    }

    pub fn start(&self, transaction: &Transaction) -> FbResult<()> {
        self.core
            .port
            .exchange_response(&Packet::Start(self.io(transaction, 0, 0)))
            .map(drop)
    }

    pub fn start_and_send(
        &self,
        transaction: &Transaction,
        message_number: i32,
        data: &[u8],
    ) -> FbResult<()> {
        self.core
            .port
            .exchange_response(&Packet::StartAndSend(RequestSend {
                io: self.io(transaction, message_number, 1),
                data: data.to_vec(),
            }))
            .map(drop)
    }

    pub fn send(
        &self,
        transaction: &Transaction,
        message_number: i32,
        data: &[u8],
    ) -> FbResult<()> {
        self.core
            .port
            .exchange_response(&Packet::Send(RequestSend {
                io: self.io(transaction, message_number, 1),
                data: data.to_vec(),
            }))
            .map(drop)
    }

    /// Receives up to `count` messages of the given message number,
    /// satisfying the request from the local queue before asking the
    /// server for a batch.
    pub fn receive(
        &self,
        transaction: &Transaction,
        message_number: i32,
        count: usize,
    ) -> FbResult<Vec<Vec<u8>>> {
        let mut out = self.pop_queued(message_number, count);
        if out.len() == count {
            return Ok(out);
        }

        let missing = count - out.len();
        let reply = self.core.port.exchange(&Packet::Receive(self.io(
            transaction,
            message_number,
            i32::try_from(missing).unwrap_or(i32::MAX),
        )))?;
        let mut packet = reply;
        loop {
            match packet {
                Packet::Send(send) => {
                    let mut queues = self.core.queues.lock()?;
                    queues
                        .entry(send.io.message_number)
                        .or_default()
                        .push_back(send.data);
                }
                Packet::Response(_) | Packet::ResponsePiggyback(_) => {
                    self.core.port.expect_response(packet)?;
                    break;
                }
                other => {
                    return Err(FbError::Protocol(format!(
                        "request receive interrupted by {:?}",
                        other.op()
                    )));
                }
            }
            packet = self.core.port.receive_packet()?;
        }

        out.extend(self.pop_queued(message_number, count - out.len()));
        Ok(out)
    }

    pub fn unwind(&self) -> FbResult<()> {
        self.core
            .port
            .exchange_response(&Packet::Unwind(ObjectRef::new(self.core.id)))
            .map(drop)
    }

    pub fn info(&self, items: &[u8], buffer_length: u32) -> FbResult<Vec<u8>> {
        self.core
            .port
            .exchange_response(&Packet::InfoRequest(InfoRq {
                object: self.core.id,
                incarnation: 0,
                items: items.to_vec(),
                buffer_length,
            }))
            .map(|r| r.data)
    }

    pub fn release(&self) -> FbResult<()> {
        if self.core.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if !self.core.port.is_usable() {
            return Ok(());
        }
        self.core
            .port
            .exchange_response(&Packet::Release(ObjectRef::new(self.core.id)))
            .map(drop)
    }

    fn pop_queued(&self, message_number: i32, count: usize) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        if count == 0 {
            return out;
        }
        if let Ok(mut queues) = self.core.queues.lock() {
            if let Some(queue) = queues.get_mut(&message_number) {
                while out.len() < count {
                    match queue.pop_front() {
                        Some(msg) => out.push(msg),
                        None => break,
                    }
                }
            }
        }
        out
    }
}

impl Drop for Request {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
