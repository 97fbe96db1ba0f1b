//! An in-memory [`Provider`] for tests and demos: canned query results,
//! a byte-store for blobs, echoing requests, and full batch bookkeeping.
//! It implements just enough engine behavior to exercise every protocol
//! path end-to-end without a storage engine.

use crate::auth::srp;
use crate::auth::UserStore;
use crate::protocol::clumplet::{self, ClumpletReader};
use crate::protocol::format::FieldType;
use crate::protocol::info;
use crate::protocol::packets::blob::unpack_segments;
use crate::protocol::packets::{BatchCompletion, BlobStreamHeader};
use crate::protocol::{Format, StatusVector};
use crate::srv::provider::{EventBoard, PreparedStatement, Provider, ServiceSession, Session};
use crate::{gds, FbError, FbResult};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct MemoryAccounts {
    users: Mutex<HashMap<String, (Vec<u8>, Vec<u8>)>>,
}

impl UserStore for MemoryAccounts {
    fn verifier(&self, login: &str) -> Option<(Vec<u8>, Vec<u8>)> {
        self.users
            .lock()
            .ok()
            .and_then(|u| u.get(&login.to_uppercase()).cloned())
    }
}

#[derive(Clone)]
struct CannedQuery {
    stmt_type: i32,
    in_format: Format,
    out_format: Format,
    rows: Vec<Vec<u8>>,
}

#[derive(Default)]
struct SharedState {
    canned: Mutex<HashMap<String, CannedQuery>>,
    ddl_log: Mutex<Vec<Vec<u8>>>,
}

/// The in-memory provider.
pub struct MemoryProvider {
    accounts: Arc<MemoryAccounts>,
    events: Arc<EventBoard>,
    state: Arc<SharedState>,
}

impl std::fmt::Debug for MemoryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "MemoryProvider")
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self {
            accounts: Arc::new(MemoryAccounts::default()),
            events: Arc::new(EventBoard::default()),
            state: Arc::new(SharedState::default()),
        }
    }

    /// Registers an account; the password is stored as an SRP verifier.
    pub fn add_user(&self, login: &str, password: &str) {
        let verifier = srp::compute_verifier(login, password);
        if let Ok(mut users) = self.accounts.users.lock() {
            users.insert(login.to_uppercase(), verifier);
        }
    }

    /// Registers a canned result for an SQL text (case-insensitive).
    pub fn set_query_result(
        &self,
        sql: &str,
        stmt_type: i32,
        in_format: Format,
        out_format: Format,
        rows: Vec<Vec<u8>>,
    ) {
        if let Ok(mut canned) = self.state.canned.lock() {
            canned.insert(
                normalize(sql),
                CannedQuery {
                    stmt_type,
                    in_format,
                    out_format,
                    rows,
                },
            );
        }
    }

    /// DDL blobs executed through any session, for assertions.
    pub fn ddl_log(&self) -> Vec<Vec<u8>> {
        self.state.ddl_log.lock().map(|l| l.clone()).unwrap_or_default()
    }

    /// The event fan-out board; engines post through it.
    pub fn events(&self) -> Arc<EventBoard> {
        Arc::clone(&self.events)
    }
}

impl Provider for MemoryProvider {
    fn accounts(&self) -> Arc<dyn UserStore> {
        Arc::clone(&self.accounts) as Arc<dyn UserStore>
    }

    fn events(&self) -> Arc<EventBoard> {
        Arc::clone(&self.events)
    }

    fn attach(&self, database: &str, user: &str) -> FbResult<Box<dyn Session>> {
        debug!("memory attach to {database} by {user}");
        Ok(Box::new(MemSession::new(Arc::clone(&self.state))))
    }

    fn create(&self, database: &str, user: &str) -> FbResult<Box<dyn Session>> {
        debug!("memory create of {database} by {user}");
        Ok(Box::new(MemSession::new(Arc::clone(&self.state))))
    }

    fn service_attach(&self, service: &str, _user: &str) -> FbResult<Box<dyn ServiceSession>> {
        Ok(Box::new(MemService {
            service: service.to_owned(),
            last_action: None,
        }))
    }
}

fn normalize(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase()
}

fn token_error() -> FbError {
    let mut sv = StatusVector::from_gds(gds::TOKEN_ERR);
    sv.push_str("unknown statement");
    FbError::from_status(sv)
}

struct MemStmt {
    canned: CannedQuery,
    cursor: VecDeque<Vec<u8>>,
}

struct MemBlob {
    blob_id: u64,
    writing: Vec<Vec<u8>>,
    reading: VecDeque<Vec<u8>>,
    readable: bool,
    /// Blob type from the BPB the handle was opened with.
    blob_type: u8,
}

fn bpb_blob_type(bpb: &[u8]) -> u8 {
    ClumpletReader::find(bpb, true, clumplet::BPB_TYPE)
        .map(|c| {
            #[allow(clippy::cast_possible_truncation)]
            #[allow(clippy::cast_sign_loss)]
            {
                c.as_int() as u8
            }
        })
        .unwrap_or(clumplet::BPB_TYPE_SEGMENTED)
}

#[derive(Default)]
struct MemBatch {
    msg_length: usize,
    messages: u32,
    blobs: u32,
    segmented: bool,
}

#[derive(Default)]
struct MemRequest {
    queues: HashMap<i32, VecDeque<Vec<u8>>>,
}

struct MemSession {
    state: Arc<SharedState>,
    next: u32,
    transactions: HashMap<u32, ()>,
    statements: HashMap<u32, MemStmt>,
    blobs: HashMap<u32, MemBlob>,
    blob_store: HashMap<u64, Vec<Vec<u8>>>,
    next_blob_id: u64,
    requests: HashMap<u32, MemRequest>,
    slices: HashMap<u64, Vec<u8>>,
    batches: HashMap<u32, MemBatch>,
}

impl MemSession {
    fn new(state: Arc<SharedState>) -> Self {
        Self {
            state,
            next: 1,
            transactions: HashMap::new(),
            statements: HashMap::new(),
            blobs: HashMap::new(),
            blob_store: HashMap::new(),
            next_blob_id: 1,
            requests: HashMap::new(),
            slices: HashMap::new(),
            batches: HashMap::new(),
        }
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next;
        self.next += 1;
        id
    }

    fn analyze(&self, sql: &str) -> FbResult<CannedQuery> {
        let key = normalize(sql);
        if let Some(canned) = self.state.canned.lock().ok().and_then(|c| c.get(&key).cloned()) {
            return Ok(canned);
        }
        if key == "SELECT 1 FROM RDB$DATABASE" {
            let out_format = Format::new(vec![(FieldType::Long, 4, 0, 0)]);
            let mut row = out_format.alloc_buffer();
            out_format.set_field_bytes(&mut row, 0, &1_i32.to_le_bytes());
            return Ok(CannedQuery {
                stmt_type: info::STMT_SELECT,
                in_format: Format::default(),
                out_format,
                rows: vec![row],
            });
        }
        if key.starts_with("SELECT") {
            return Ok(CannedQuery {
                stmt_type: info::STMT_SELECT,
                in_format: Format::default(),
                out_format: Format::new(vec![(FieldType::Long, 4, 0, 0)]),
                rows: Vec::new(),
            });
        }
        if key.starts_with("INSERT") || key.starts_with("UPDATE") || key.starts_with("DELETE") {
            let stmt_type = if key.starts_with("INSERT") {
                info::STMT_INSERT
            } else if key.starts_with("UPDATE") {
                info::STMT_UPDATE
            } else {
                info::STMT_DELETE
            };
            return Ok(CannedQuery {
                stmt_type,
                in_format: Format::default(),
                out_format: Format::default(),
                rows: Vec::new(),
            });
        }
        if key.starts_with("CREATE") || key.starts_with("ALTER") || key.starts_with("DROP") {
            return Ok(CannedQuery {
                stmt_type: info::STMT_DDL,
                in_format: Format::default(),
                out_format: Format::default(),
                rows: Vec::new(),
            });
        }
        Err(token_error())
    }

    fn tran(&self, tran: u32) -> FbResult<()> {
        if self.transactions.contains_key(&tran) {
            Ok(())
        } else {
            Err(FbError::gds(gds::BAD_TRANS_HANDLE))
        }
    }

    fn stmt(&mut self, stmt: u32) -> FbResult<&mut MemStmt> {
        self.statements
            .get_mut(&stmt)
            .ok_or_else(|| FbError::gds(gds::BAD_STMT_HANDLE))
    }

    fn blob(&mut self, blob: u32) -> FbResult<&mut MemBlob> {
        self.blobs
            .get_mut(&blob)
            .ok_or_else(|| FbError::gds(gds::BAD_SEGSTR_HANDLE))
    }
}

impl Session for MemSession {
    fn database_info(&mut self, items: &[u8], buffer_length: usize) -> FbResult<Vec<u8>> {
        let mut builder = info::InfoReplyBuilder::new(buffer_length);
        for &item in items {
            match item {
                info::INFO_END => break,
                info::INFO_FIREBIRD_VERSION | info::INFO_VERSION => {
                    builder.append(item, &info::version_payload(&["ME-V4.0 memory provider"]));
                }
                info::INFO_IMPLEMENTATION => {
                    builder.append(item, b"memory");
                }
                info::INFO_PAGE_SIZE => {
                    builder.append_int(item, 8_192);
                }
                info::INFO_ODS_VERSION => {
                    builder.append_int(item, 13);
                }
                other => {
                    trace!("ignoring unknown db info item {other}");
                }
            }
        }
        Ok(builder.finish())
    }

    fn start_transaction(&mut self, _tpb: &[u8]) -> FbResult<u32> {
        let id = self.next_id();
        self.transactions.insert(id, ());
        Ok(id)
    }

    fn reconnect_transaction(&mut self, _id: &[u8]) -> FbResult<u32> {
        let id = self.next_id();
        self.transactions.insert(id, ());
        Ok(id)
    }

    fn transaction_info(
        &mut self,
        tran: u32,
        items: &[u8],
        buffer_length: usize,
    ) -> FbResult<Vec<u8>> {
        self.tran(tran)?;
        let mut builder = info::InfoReplyBuilder::new(buffer_length);
        for &item in items {
            if item == info::INFO_TRA_ID {
                #[allow(clippy::cast_possible_wrap)]
                builder.append_int(item, tran as i32);
            }
        }
        Ok(builder.finish())
    }

    fn commit(&mut self, tran: u32, retaining: bool) -> FbResult<()> {
        self.tran(tran)?;
        if !retaining {
            self.transactions.remove(&tran);
        }
        Ok(())
    }

    fn rollback(&mut self, tran: u32, retaining: bool) -> FbResult<()> {
        self.tran(tran)?;
        if !retaining {
            self.transactions.remove(&tran);
        }
        Ok(())
    }

    fn prepare_2pc(&mut self, tran: u32, _data: &[u8]) -> FbResult<()> {
        self.tran(tran)
    }

    fn prepare_statement(&mut self, tran: u32, sql: &str) -> FbResult<PreparedStatement> {
        self.tran(tran)?;
        let canned = self.analyze(sql)?;
        let id = self.next_id();
        let prepared = PreparedStatement {
            handle: id,
            stmt_type: canned.stmt_type,
            in_format: canned.in_format.clone(),
            out_format: canned.out_format.clone(),
        };
        self.statements.insert(
            id,
            MemStmt {
                canned,
                cursor: VecDeque::new(),
            },
        );
        Ok(prepared)
    }

    fn execute(&mut self, stmt: u32, tran: u32, _params: Option<Vec<u8>>) -> FbResult<()> {
        self.tran(tran)?;
        let entry = self.stmt(stmt)?;
        entry.cursor = entry.canned.rows.iter().cloned().collect();
        Ok(())
    }

    fn execute_singleton(
        &mut self,
        stmt: u32,
        tran: u32,
        _params: Option<Vec<u8>>,
    ) -> FbResult<Option<Vec<u8>>> {
        self.tran(tran)?;
        let entry = self.stmt(stmt)?;
        Ok(entry.canned.rows.first().cloned())
    }

    fn exec_immediate(&mut self, tran: u32, sql: &str) -> FbResult<()> {
        self.tran(tran)?;
        self.analyze(sql).map(drop)
    }

    fn exec_immediate2(
        &mut self,
        tran: u32,
        sql: &str,
        _params: Option<Vec<u8>>,
    ) -> FbResult<Option<Vec<u8>>> {
        self.tran(tran)?;
        let canned = self.analyze(sql)?;
        Ok(canned.rows.first().cloned())
    }

    fn fetch(&mut self, stmt: u32, max: usize) -> FbResult<(Vec<Vec<u8>>, bool)> {
        let entry = self.stmt(stmt)?;
        let mut rows = Vec::new();
        while rows.len() < max {
            match entry.cursor.pop_front() {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        let eof = entry.cursor.is_empty();
        Ok((rows, eof))
    }

    fn free_statement(&mut self, stmt: u32, option: u32) -> FbResult<()> {
        match option {
            crate::protocol::packets::sql::DSQL_DROP => {
                self.statements.remove(&stmt);
                self.batches.remove(&stmt);
            }
            _ => {
                if let Ok(entry) = self.stmt(stmt) {
                    entry.cursor.clear();
                }
            }
        }
        Ok(())
    }

    fn statement_info(
        &mut self,
        stmt: u32,
        items: &[u8],
        buffer_length: usize,
    ) -> FbResult<Vec<u8>> {
        let entry = self.stmt(stmt)?;
        let stmt_type = entry.canned.stmt_type;
        let mut builder = info::InfoReplyBuilder::new(buffer_length);
        for &item in items {
            if item == info::INFO_SQL_STMT_TYPE {
                builder.append_int(item, stmt_type);
            }
        }
        Ok(builder.finish())
    }

    fn create_blob(&mut self, tran: u32, bpb: &[u8]) -> FbResult<(u32, u64)> {
        self.tran(tran)?;
        let blob_id = self.next_blob_id;
        self.next_blob_id += 1;
        let handle = self.next_id();
        self.blobs.insert(
            handle,
            MemBlob {
                blob_id,
                writing: Vec::new(),
                reading: VecDeque::new(),
                readable: false,
                blob_type: bpb_blob_type(bpb),
            },
        );
        Ok((handle, blob_id))
    }

    fn open_blob(&mut self, tran: u32, blob_id: u64, bpb: &[u8]) -> FbResult<u32> {
        self.tran(tran)?;
        let segments = self
            .blob_store
            .get(&blob_id)
            .cloned()
            .ok_or_else(|| FbError::gds(gds::BAD_SEGSTR_HANDLE))?;
        let handle = self.next_id();
        self.blobs.insert(
            handle,
            MemBlob {
                blob_id,
                writing: Vec::new(),
                reading: segments.into_iter().collect(),
                readable: true,
                blob_type: bpb_blob_type(bpb),
            },
        );
        Ok(handle)
    }

    fn put_segments(&mut self, blob: u32, segments: Vec<Vec<u8>>) -> FbResult<()> {
        let entry = self.blob(blob)?;
        if entry.readable {
            return Err(FbError::gds(gds::BAD_SEGSTR_HANDLE));
        }
        entry.writing.extend(segments);
        Ok(())
    }

    fn get_segments(&mut self, blob: u32, max_bytes: usize) -> FbResult<(Vec<Vec<u8>>, bool)> {
        let entry = self.blob(blob)?;
        if !entry.readable {
            return Err(FbError::gds(gds::BAD_SEGSTR_HANDLE));
        }
        let mut out = Vec::new();
        let mut used = 0_usize;
        while let Some(front) = entry.reading.front() {
            let cost = front.len() + 2;
            if !out.is_empty() && used + cost > max_bytes {
                break;
            }
            used += cost;
            out.push(entry.reading.pop_front().unwrap(/* front checked */));
        }
        Ok((out, entry.reading.is_empty()))
    }

    fn seek_blob(&mut self, blob: u32, _mode: i32, offset: i32) -> FbResult<u32> {
        let blob_id = self.blob(blob)?.blob_id;
        let flat: Vec<u8> = self
            .blob_store
            .get(&blob_id)
            .map(|segments| segments.concat())
            .unwrap_or_default();
        let offset = usize::try_from(offset).unwrap_or(0).min(flat.len());
        let entry = self.blob(blob)?;
        entry.reading.clear();
        if offset < flat.len() {
            entry.reading.push_back(flat[offset..].to_vec());
        }
        #[allow(clippy::cast_possible_truncation)]
        Ok(offset as u32)
    }

    fn close_blob(&mut self, blob: u32, cancel: bool) -> FbResult<()> {
        let entry = self
            .blobs
            .remove(&blob)
            .ok_or_else(|| FbError::gds(gds::BAD_SEGSTR_HANDLE))?;
        if !cancel && !entry.readable {
            self.blob_store.insert(entry.blob_id, entry.writing);
        }
        Ok(())
    }

    fn blob_info(&mut self, blob: u32, items: &[u8], buffer_length: usize) -> FbResult<Vec<u8>> {
        let (total, count, largest, blob_type) = {
            let entry = self.blob(blob)?;
            // info over the remaining read queue is good enough here
            let lens: Vec<usize> = if entry.readable {
                entry.reading.iter().map(Vec::len).collect()
            } else {
                entry.writing.iter().map(Vec::len).collect()
            };
            (
                lens.iter().sum::<usize>(),
                lens.len(),
                lens.iter().copied().max().unwrap_or(0),
                entry.blob_type,
            )
        };
        let mut builder = info::InfoReplyBuilder::new(buffer_length);
        for &item in items {
            match item {
                info::INFO_BLOB_TOTAL_LENGTH => {
                    #[allow(clippy::cast_possible_truncation)]
                    #[allow(clippy::cast_possible_wrap)]
                    builder.append_int(item, total as i32);
                }
                info::INFO_BLOB_NUM_SEGMENTS => {
                    #[allow(clippy::cast_possible_truncation)]
                    #[allow(clippy::cast_possible_wrap)]
                    builder.append_int(item, count as i32);
                }
                info::INFO_BLOB_MAX_SEGMENT => {
                    #[allow(clippy::cast_possible_truncation)]
                    #[allow(clippy::cast_possible_wrap)]
                    builder.append_int(item, largest as i32);
                }
                info::INFO_BLOB_TYPE => {
                    builder.append_int(item, i32::from(blob_type));
                }
                _ => {}
            }
        }
        Ok(builder.finish())
    }

    fn put_slice(
        &mut self,
        tran: u32,
        id: u64,
        _sdl: &[u8],
        _param: &[u8],
        data: &[u8],
    ) -> FbResult<u64> {
        self.tran(tran)?;
        let id = if id == 0 {
            let id = self.next_blob_id;
            self.next_blob_id += 1;
            id
        } else {
            id
        };
        self.slices.insert(id, data.to_vec());
        Ok(id)
    }

    fn get_slice(
        &mut self,
        tran: u32,
        id: u64,
        _sdl: &[u8],
        _param: &[u8],
        length: usize,
    ) -> FbResult<(Vec<u8>, u32)> {
        self.tran(tran)?;
        let data = self
            .slices
            .get(&id)
            .cloned()
            .ok_or_else(|| FbError::gds(gds::BAD_SEGSTR_HANDLE))?;
        let truncated = data[..data.len().min(length)].to_vec();
        #[allow(clippy::cast_possible_truncation)]
        let elements = (truncated.len() / 4) as u32;
        Ok((truncated, elements))
    }

    fn ddl(&mut self, tran: u32, data: &[u8]) -> FbResult<()> {
        self.tran(tran)?;
        if let Ok(mut log) = self.state.ddl_log.lock() {
            log.push(data.to_vec());
        }
        Ok(())
    }

    fn transact(&mut self, tran: u32, _blr: &[u8], in_msg: &[u8]) -> FbResult<Vec<u8>> {
        self.tran(tran)?;
        Ok(in_msg.to_vec())
    }

    fn compile(&mut self, _blr: &[u8]) -> FbResult<u32> {
        let id = self.next_id();
        self.requests.insert(id, MemRequest::default());
        Ok(id)
    }

    fn start_request(&mut self, req: u32, tran: u32) -> FbResult<()> {
        self.tran(tran)?;
        if self.requests.contains_key(&req) {
            Ok(())
        } else {
            Err(FbError::gds(gds::BAD_REQ_HANDLE))
        }
    }

    fn send_message(&mut self, req: u32, message_number: i32, data: Vec<u8>) -> FbResult<()> {
        let request = self
            .requests
            .get_mut(&req)
            .ok_or_else(|| FbError::gds(gds::BAD_REQ_HANDLE))?;
        request
            .queues
            .entry(message_number)
            .or_default()
            .push_back(data);
        Ok(())
    }

    fn receive_messages(
        &mut self,
        req: u32,
        message_number: i32,
        count: usize,
    ) -> FbResult<Vec<Vec<u8>>> {
        let request = self
            .requests
            .get_mut(&req)
            .ok_or_else(|| FbError::gds(gds::BAD_REQ_HANDLE))?;
        let queue = request.queues.entry(message_number).or_default();
        let mut out = Vec::new();
        while out.len() < count {
            match queue.pop_front() {
                Some(msg) => out.push(msg),
                None => break,
            }
        }
        Ok(out)
    }

    fn unwind_request(&mut self, req: u32) -> FbResult<()> {
        self.requests
            .get_mut(&req)
            .map(|r| r.queues.clear())
            .ok_or_else(|| FbError::gds(gds::BAD_REQ_HANDLE))
    }

    fn release_request(&mut self, req: u32) -> FbResult<()> {
        self.requests
            .remove(&req)
            .map(drop)
            .ok_or_else(|| FbError::gds(gds::BAD_REQ_HANDLE))
    }

    fn request_info(&mut self, req: u32, _items: &[u8], buffer_length: usize) -> FbResult<Vec<u8>> {
        if !self.requests.contains_key(&req) {
            return Err(FbError::gds(gds::BAD_REQ_HANDLE));
        }
        Ok(info::InfoReplyBuilder::new(buffer_length).finish())
    }

    fn batch_create(&mut self, stmt: u32, _format: &[u8], msg_length: u32, _pb: &[u8]) -> FbResult<()> {
        if !self.statements.contains_key(&stmt) {
            return Err(FbError::gds(gds::BAD_STMT_HANDLE));
        }
        self.batches.insert(
            stmt,
            MemBatch {
                msg_length: msg_length as usize,
                messages: 0,
                blobs: 0,
                segmented: true,
            },
        );
        Ok(())
    }

    fn batch_msg(&mut self, stmt: u32, messages: u32, data: &[u8]) -> FbResult<()> {
        let batch = self
            .batches
            .get_mut(&stmt)
            .ok_or_else(|| FbError::gds(gds::BAD_STMT_HANDLE))?;
        if batch.msg_length != 0 && data.len() != batch.msg_length * messages as usize {
            return Err(FbError::gds(gds::RANDOM));
        }
        batch.messages += messages;
        Ok(())
    }

    fn batch_blob_stream(&mut self, stmt: u32, data: &[u8]) -> FbResult<()> {
        let segmented = self
            .batches
            .get(&stmt)
            .map(|b| b.segmented)
            .ok_or_else(|| FbError::gds(gds::BAD_STMT_HANDLE))?;
        let (header, used) = BlobStreamHeader::parse(data)?;
        let payload = &data[used..];
        let segments = if segmented {
            unpack_segments(payload)
        } else {
            vec![payload.to_vec()]
        };
        self.blob_store.insert(header.blob_id, segments);
        if let Some(batch) = self.batches.get_mut(&stmt) {
            batch.blobs += 1;
        }
        Ok(())
    }

    fn batch_regblob(&mut self, stmt: u32, existing_id: u64, batch_id: u64) -> FbResult<()> {
        let segments = self
            .blob_store
            .get(&existing_id)
            .cloned()
            .ok_or_else(|| FbError::gds(gds::BAD_SEGSTR_HANDLE))?;
        self.blob_store.insert(batch_id, segments);
        if let Some(batch) = self.batches.get_mut(&stmt) {
            batch.blobs += 1;
        }
        Ok(())
    }

    fn batch_set_bpb(&mut self, stmt: u32, bpb: &[u8]) -> FbResult<()> {
        let batch = self
            .batches
            .get_mut(&stmt)
            .ok_or_else(|| FbError::gds(gds::BAD_STMT_HANDLE))?;
        batch.segmented = ClumpletReader::find(bpb, true, clumplet::BPB_TYPE)
            .map(|c| c.as_int() != i32::from(clumplet::BPB_TYPE_STREAM))
            .unwrap_or(true);
        Ok(())
    }

    fn batch_exec(&mut self, stmt: u32, tran: u32) -> FbResult<BatchCompletion> {
        self.tran(tran)?;
        let batch = self
            .batches
            .get_mut(&stmt)
            .ok_or_else(|| FbError::gds(gds::BAD_STMT_HANDLE))?;
        let total = batch.messages;
        batch.messages = 0;
        Ok(BatchCompletion {
            statement: stmt,
            total,
            updated: total,
            errors: Vec::new(),
        })
    }

    fn batch_release(&mut self, stmt: u32) -> FbResult<()> {
        self.batches.remove(&stmt);
        Ok(())
    }
}

struct MemService {
    service: String,
    last_action: Option<Vec<u8>>,
}

impl ServiceSession for MemService {
    fn start(&mut self, spb: &[u8]) -> FbResult<()> {
        self.last_action = Some(spb.to_vec());
        Ok(())
    }

    fn query(
        &mut self,
        _send_items: &[u8],
        recv_items: &[u8],
        buffer_length: usize,
    ) -> FbResult<Vec<u8>> {
        let mut builder = info::InfoReplyBuilder::new(buffer_length);
        for &item in recv_items {
            match item {
                info::INFO_SVC_VERSION => {
                    builder.append_int(item, 2);
                }
                info::INFO_SVC_SERVER_VERSION => {
                    builder.append(item, b"ME-V4.0 memory provider");
                }
                info::INFO_SVC_IMPLEMENTATION => {
                    builder.append(item, self.service.as_bytes());
                }
                _ => {}
            }
        }
        Ok(builder.finish())
    }
}
