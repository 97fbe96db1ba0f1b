//! Prepared statements: the cursor row queue, pipelined fetching, lazy
//! free, and the deferred-execute discipline.

use crate::conn::attachment::AttachCore;
use crate::conn::batch::Batch;
use crate::conn::transaction::Transaction;
use crate::port::object_map::ObjectEntry;
use crate::port::RemotePort;
use crate::protocol::info;
use crate::protocol::packets::sql::{DSQL_CLOSE, DSQL_DROP, DSQL_UNPREPARE};
use crate::protocol::packets::{
    AllocateStatement, Execute, Execute2, Fetch, FreeStatement, InfoRq, PrepareSql, SetCursor,
};
use crate::protocol::{Format, Packet};
use crate::{FbError, FbResult};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Info items requested with every prepare.
const PREPARE_ITEMS: [u8; 3] = [
    info::INFO_SQL_STMT_TYPE,
    info::INFO_SQL_BIND,
    info::INFO_SQL_SELECT,
];

#[derive(Debug, Default)]
struct StmtMeta {
    stmt_type: i32,
    in_fmt: Format,
    out_fmt: Format,
}

pub(crate) struct StatementCore {
    pub port: RemotePort,
    pub id: u32,
    meta: Mutex<StmtMeta>,
    rows: Mutex<VecDeque<Vec<u8>>>,
    eof: AtomicBool,
    fetched: AtomicBool,
    pending_fetch: AtomicBool,
    last_batch: AtomicUsize,
    saved: Mutex<Option<FbError>>,
    timeout_ms: AtomicU32,
    freed: AtomicBool,
}

impl std::fmt::Debug for StatementCore {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "StatementCore(id={}, eof={})",
            self.id,
            self.eof.load(Ordering::SeqCst)
        )
    }
}

impl StatementCore {
    /// The negotiated output format; the port's row absorption uses it to
    /// decode the stream.
    pub fn out_format(&self) -> Format {
        self.meta.lock().map(|m| m.out_fmt.clone()).unwrap_or_default()
    }

    pub fn in_format(&self) -> Format {
        self.meta.lock().map(|m| m.in_fmt.clone()).unwrap_or_default()
    }

    pub fn push_row(&self, row: Vec<u8>) {
        if let Ok(mut rows) = self.rows.lock() {
            rows.push_back(row);
        }
    }

    pub fn set_eof(&self) {
        self.eof.store(true, Ordering::SeqCst);
    }

    /// An error from a deferred packet lands here and surfaces on the
    /// statement's next operation, preserving cause-effect ordering.
    pub fn save_error(&self, e: FbError) {
        if let Ok(mut saved) = self.saved.lock() {
            if saved.is_none() {
                *saved = Some(e);
            }
        }
    }

    pub fn note_rows_settled(&self) {
        self.pending_fetch.store(false, Ordering::SeqCst);
    }

    fn take_saved(&self) -> Option<FbError> {
        self.saved.lock().ok().and_then(|mut s| s.take())
    }
}

/// A prepared SQL statement with its cursor.
#[derive(Debug)]
pub struct Statement {
    pub(crate) core: Arc<StatementCore>,
    att: Arc<AttachCore>,
}

impl Statement {
    pub(crate) fn prepare(
        att: Arc<AttachCore>,
        transaction: &Transaction,
        sql: &str,
    ) -> FbResult<Self> {
        let port = att.port.clone();
        let alloc = port.exchange_response(&Packet::AllocateStatement(AllocateStatement {
            database: att.id,
        }))?;
        let id = alloc.object;

        let response = port.exchange_response(&Packet::PrepareStatement(PrepareSql {
            transaction: transaction.id(),
            statement: id,
            dialect: 3,
            sql: sql.to_owned(),
            items: PREPARE_ITEMS.to_vec(),
            buffer_length: crate::WIRE_BUFFER_SIZE as u32,
        }))?;
        let (stmt_type, in_fmt, out_fmt) = info::parse_describe(&response.data)?;

        let core = Arc::new(StatementCore {
            port: port.clone(),
            id,
            meta: Mutex::new(StmtMeta {
                stmt_type,
                in_fmt,
                out_fmt,
            }),
            rows: Mutex::new(VecDeque::new()),
            eof: AtomicBool::new(false),
            fetched: AtomicBool::new(false),
            pending_fetch: AtomicBool::new(false),
            last_batch: AtomicUsize::new(0),
            saved: Mutex::new(None),
            timeout_ms: AtomicU32::new(0),
            freed: AtomicBool::new(false),
        });
        port.objects()?
            .register(id, ObjectEntry::Statement(Arc::downgrade(&core)));
        Ok(Self { core, att })
    }

    pub fn id(&self) -> u32 {
        self.core.id
    }

    pub fn statement_type(&self) -> i32 {
        self.core.meta.lock().map(|m| m.stmt_type).unwrap_or(0)
    }

    /// The format of parameter messages this statement expects.
    pub fn input_format(&self) -> Format {
        self.core
            .meta
            .lock()
            .map(|m| m.in_fmt.clone())
            .unwrap_or_default()
    }

    /// The format of the rows this statement produces.
    pub fn output_format(&self) -> Format {
        self.core.out_format()
    }

    /// Statement timeout in milliseconds, carried natively from protocol
    /// 16 on.
    pub fn set_timeout(&self, millis: u32) -> FbResult<()> {
        if self.core.port.protocol() < 16 {
            return Err(FbError::VersionUnsupported("statement timeout"));
        }
        self.core.timeout_ms.store(millis, Ordering::SeqCst);
        Ok(())
    }

    /// Executes the statement, optionally binding one parameter message
    /// (a buffer in [`Statement::input_format`] layout).
    ///
    /// Parameterless executes on a lazy-send connection are deferred: the
    /// packet rides ahead of the next synchronous operation and a failure
    /// surfaces on this statement's next call.
    pub fn execute(&self, transaction: &Transaction, params: Option<&[u8]>) -> FbResult<()> {
        self.raise_saved()?;
        self.reset_cursor();

        let (in_fmt, format_blob) = {
            let meta = self.core.meta.lock()?;
            (meta.in_fmt.clone(), info::pack_format(&meta.in_fmt))
        };
        let packet = Packet::Execute(Execute {
            statement: self.core.id,
            transaction: transaction.id(),
            format: if params.is_some() {
                format_blob
            } else {
                Vec::new()
            },
            message_number: 0,
            messages: i32::from(params.is_some()),
            timeout: self.core.timeout_ms.load(Ordering::SeqCst),
        });

        match params {
            Some(msg) => {
                let reply = self
                    .core
                    .port
                    .exchange_with_rows(&packet, &in_fmt, &[msg])?;
                self.core.port.expect_response(reply).map(drop)
            }
            None => {
                let lazy = self.core.port.with_io(|io| Ok(io.lazy_send))?;
                if lazy {
                    self.core.port.defer_unsent(packet)
                } else {
                    self.core.port.exchange_response(&packet).map(drop)
                }
            }
        }
    }

    /// Executes and reads the singleton output row (`execute2`), e.g. for
    /// procedures.
    pub fn execute_singleton(
        &self,
        transaction: &Transaction,
        params: Option<&[u8]>,
    ) -> FbResult<Option<Vec<u8>>> {
        self.raise_saved()?;
        self.reset_cursor();
        let (in_fmt, out_fmt, in_blob, out_blob) = {
            let meta = self.core.meta.lock()?;
            (
                meta.in_fmt.clone(),
                meta.out_fmt.clone(),
                info::pack_format(&meta.in_fmt),
                info::pack_format(&meta.out_fmt),
            )
        };
        let packet = Packet::Execute2(Execute2 {
            exec: Execute {
                statement: self.core.id,
                transaction: transaction.id(),
                format: if params.is_some() { in_blob } else { Vec::new() },
                message_number: 0,
                messages: i32::from(params.is_some()),
                timeout: self.core.timeout_ms.load(Ordering::SeqCst),
            },
            out_format: out_blob,
            out_message_number: 0,
        });

        let holder;
        let rows: &[&[u8]] = match params {
            Some(msg) => {
                holder = [msg];
                &holder
            }
            None => &[],
        };
        let reply = self.core.port.exchange_with_rows(&packet, &in_fmt, rows)?;
        let row = match reply {
            Packet::SqlResponse(sql) if sql.messages > 0 => Some(
                self.core
                    .port
                    .with_io(|io| io.read_row(&out_fmt))?,
            ),
            Packet::SqlResponse(_) => None,
            other => {
                self.core.port.expect_response(other)?;
                return Ok(None);
            }
        };
        // the closing response follows the data
        let trailer = self.core.port.receive_packet()?;
        self.core.port.expect_response(trailer)?;
        Ok(row)
    }

    /// Fetches the next row, or None at end of the cursor. Once the end
    /// was seen, no wire traffic happens until the statement is executed
    /// again.
    pub fn fetch(&self) -> FbResult<Option<Vec<u8>>> {
        self.raise_saved()?;
        loop {
            if let Some(row) = self.pop_row() {
                self.maybe_refill()?;
                return Ok(Some(row));
            }
            if self.core.eof.load(Ordering::SeqCst) {
                return Ok(None);
            }
            if self.core.pending_fetch.load(Ordering::SeqCst) {
                self.core.port.settle_expectations()?;
                self.raise_saved()?;
            } else {
                self.request_batch(true)?;
                self.raise_saved()?;
            }
        }
    }

    /// Gives the open cursor a name for positioned updates.
    pub fn set_cursor(&self, name: &str) -> FbResult<()> {
        self.core
            .port
            .exchange_response(&Packet::SetCursor(SetCursor {
                statement: self.core.id,
                name: name.to_owned(),
                cursor_type: 0,
            }))
            .map(drop)
    }

    pub fn info(&self, items: &[u8], buffer_length: u32) -> FbResult<Vec<u8>> {
        self.raise_saved()?;
        self.core
            .port
            .exchange_response(&Packet::InfoSql(InfoRq {
                object: self.core.id,
                incarnation: 0,
                items: items.to_vec(),
                buffer_length,
            }))
            .map(|r| r.data)
    }

    /// Opens a bulk-insert batch over this statement.
    pub fn create_batch(&self, pb: &[u8]) -> FbResult<Batch> {
        Batch::create(Arc::clone(&self.core), pb)
    }

    /// Closes the open cursor, keeping the statement prepared.
    pub fn close_cursor(&self) -> FbResult<()> {
        self.free(DSQL_CLOSE)
    }

    /// Unprepares the statement, keeping the handle for a new prepare.
    pub fn unprepare(&self) -> FbResult<()> {
        self.free(DSQL_UNPREPARE)
    }

    /// Releases the statement. On a lazy-send connection the packet is
    /// queued and its response consumed before the next synchronous
    /// operation's.
    pub fn free(&self, option: u32) -> FbResult<()> {
        if option == DSQL_DROP && self.core.freed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if !self.core.port.is_usable() {
            // broken connection: release client state only
            if let Ok(mut objects) = self.core.port.objects() {
                objects.remove(self.core.id);
            }
            return Ok(());
        }
        let packet = Packet::FreeStatement(FreeStatement {
            statement: self.core.id,
            option,
        });
        let lazy = self.core.port.with_io(|io| Ok(io.lazy_send))?;
        if lazy {
            self.core.port.defer_sent(packet)
        } else {
            let result = self.core.port.exchange_response(&packet).map(drop);
            if option == DSQL_DROP {
                if let Ok(mut objects) = self.core.port.objects() {
                    objects.remove(self.core.id);
                }
            }
            result
        }
    }

    fn raise_saved(&self) -> FbResult<()> {
        match self.core.take_saved() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn reset_cursor(&self) {
        if let Ok(mut rows) = self.core.rows.lock() {
            rows.clear();
        }
        self.core.eof.store(false, Ordering::SeqCst);
        self.core.fetched.store(false, Ordering::SeqCst);
    }

    fn pop_row(&self) -> Option<Vec<u8>> {
        self.core.rows.lock().ok().and_then(|mut r| r.pop_front())
    }

    fn queued_rows(&self) -> usize {
        self.core.rows.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Number of rows asked for per round trip: derived from the output
    /// row width, except on symmetric-write transports where pipelining
    /// would block the peer.
    fn batch_size(&self) -> usize {
        if self.core.port.kind().is_symmetric() {
            return 1;
        }
        let row_len = self.core.out_format().buffer_length().max(1);
        (crate::WIRE_BUFFER_SIZE / 2 / row_len).clamp(crate::DEFAULT_FETCH_ROWS / 4, 1_000)
    }

    fn request_batch(&self, wait: bool) -> FbResult<()> {
        let n = self.batch_size();
        self.core.port.send_packet(&Packet::Fetch(Fetch {
            statement: self.core.id,
            format: Vec::new(),
            message_number: 0,
            messages: i32::try_from(n).unwrap_or(i32::MAX),
        }))?;
        self.core.pending_fetch.store(true, Ordering::SeqCst);
        self.core.last_batch.store(n, Ordering::SeqCst);
        self.core.fetched.store(true, Ordering::SeqCst);
        self.core
            .port
            .expect_rows(Arc::clone(&self.core), n)?;
        if wait {
            self.core.port.settle_expectations()?;
        }
        Ok(())
    }

    /// Schedules an opportunistic refill once the queue drops below half
    /// of the last batch.
    fn maybe_refill(&self) -> FbResult<()> {
        if self.core.eof.load(Ordering::SeqCst)
            || self.core.pending_fetch.load(Ordering::SeqCst)
        {
            return Ok(());
        }
        let last = self.core.last_batch.load(Ordering::SeqCst);
        if last > 1 && self.queued_rows() < last / 2 {
            self.request_batch(false)?;
        }
        Ok(())
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        if !self.core.freed.load(Ordering::SeqCst) {
            let _ = self.free(DSQL_DROP);
        }
    }
}

impl Statement {
    pub fn attachment_id(&self) -> u32 {
        self.att.id
    }
}
