//! In-process server and connections.
//!
//! [`MemoryServer`] keeps inserted batches per table and honours idempotent
//! ids the way a real server does: a second insert with an id it has already
//! applied for that table is acknowledged but not stored again. Faults can be
//! scripted to exercise the retry paths.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{Connection, ConnectionFactory};
use crate::core::{Error, ErrorCode, Result};

/// A scripted failure for the next insert.
#[derive(Debug, Clone)]
pub enum Fault {
    /// Fail before anything is stored.
    Reject(Error),
    /// Store the batch, then fail as if the acknowledgement was lost.
    LoseAck(Error),
}

/// Call counters, for assertions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub connects: usize,
    pub inserts: usize,
    pub executes: usize,
    pub pings: usize,
    pub resets: usize,
}

struct ServerState<B> {
    tables: HashMap<String, Vec<B>>,
    applied_ids: HashSet<(String, String)>,
    attempts_by_id: HashMap<String, usize>,
    insert_faults: VecDeque<Fault>,
    connect_faults: VecDeque<Error>,
    ping_faults: VecDeque<Error>,
    queries: Vec<String>,
    calls: CallCounts,
    insert_delay: Duration,
    active_inserts: usize,
    peak_active_inserts: usize,
}

impl<B> Default for ServerState<B> {
    fn default() -> Self {
        Self {
            tables: HashMap::new(),
            applied_ids: HashSet::new(),
            attempts_by_id: HashMap::new(),
            insert_faults: VecDeque::new(),
            connect_faults: VecDeque::new(),
            ping_faults: VecDeque::new(),
            queries: Vec::new(),
            calls: CallCounts::default(),
            insert_delay: Duration::ZERO,
            active_inserts: 0,
            peak_active_inserts: 0,
        }
    }
}

/// Shared in-memory server. Cloning yields another handle to the same state.
pub struct MemoryServer<B> {
    state: Arc<Mutex<ServerState<B>>>,
    next_conn_id: Arc<AtomicUsize>,
}

impl<B> Clone for MemoryServer<B> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            next_conn_id: Arc::clone(&self.next_conn_id),
        }
    }
}

impl<B> Default for MemoryServer<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> MemoryServer<B> {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState::default())),
            next_conn_id: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create an empty table. No-op if it exists.
    pub fn create_table(&self, name: &str) {
        self.state.lock().tables.entry(name.to_string()).or_default();
    }

    /// Drop a table and everything stored in it.
    pub fn drop_table(&self, name: &str) {
        let mut state = self.state.lock();
        state.tables.remove(name);
        state.applied_ids.retain(|(table, _)| table != name);
    }

    /// Queue a fault for an upcoming insert. Faults are consumed in order.
    pub fn push_insert_fault(&self, fault: Fault) {
        self.state.lock().insert_faults.push_back(fault);
    }

    /// Queue a failure for an upcoming connect or endpoint reset.
    pub fn push_connect_fault(&self, err: Error) {
        self.state.lock().connect_faults.push_back(err);
    }

    /// Queue a failure for an upcoming ping.
    pub fn push_ping_fault(&self, err: Error) {
        self.state.lock().ping_faults.push_back(err);
    }

    /// Make every insert take at least `delay`.
    pub fn set_insert_delay(&self, delay: Duration) {
        self.state.lock().insert_delay = delay;
    }

    /// Number of batches stored in `table`.
    pub fn batch_count(&self, table: &str) -> usize {
        self.state.lock().tables.get(table).map_or(0, Vec::len)
    }

    /// Number of insert calls made with `idempotent_id`, applied or not.
    pub fn attempts_for(&self, idempotent_id: &str) -> usize {
        self.state
            .lock()
            .attempts_by_id
            .get(idempotent_id)
            .copied()
            .unwrap_or(0)
    }

    /// Snapshot of call counters.
    pub fn calls(&self) -> CallCounts {
        self.state.lock().calls
    }

    /// Highest number of inserts observed running at the same time.
    pub fn peak_concurrent_inserts(&self) -> usize {
        self.state.lock().peak_active_inserts
    }

    /// Statements received through [`Connection::execute`].
    pub fn queries(&self) -> Vec<String> {
        self.state.lock().queries.clone()
    }
}

impl<B: Clone> MemoryServer<B> {
    /// Copy of the batches stored in `table`.
    pub fn batches(&self, table: &str) -> Vec<B> {
        self.state
            .lock()
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }
}

/// Factory producing [`MemoryConnection`]s to one server.
pub struct MemoryConnector<B> {
    server: MemoryServer<B>,
}

impl<B> MemoryConnector<B> {
    pub fn new(server: MemoryServer<B>) -> Self {
        Self { server }
    }

    pub fn server(&self) -> &MemoryServer<B> {
        &self.server
    }
}

impl<B> ConnectionFactory for MemoryConnector<B>
where
    B: Clone + Send + Sync + 'static,
{
    type Connection = MemoryConnection<B>;

    fn connect(&self) -> Result<MemoryConnection<B>> {
        {
            let mut state = self.server.state.lock();
            state.calls.connects += 1;
            if let Some(err) = state.connect_faults.pop_front() {
                return Err(err);
            }
        }

        let id = self.server.next_conn_id.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(conn = id, "memory connection opened");

        Ok(MemoryConnection {
            server: self.server.clone(),
            id,
            connected: true,
        })
    }
}

/// Connection to a [`MemoryServer`].
///
/// A network failure leaves the connection closed until
/// [`Connection::reset_endpoint`] succeeds.
pub struct MemoryConnection<B> {
    server: MemoryServer<B>,
    id: usize,
    connected: bool,
}

impl<B> MemoryConnection<B> {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    fn check_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(Error::Network(format!("connection {} is closed", self.id)))
        }
    }

    fn note_failure(&mut self, err: &Error) {
        if matches!(err, Error::Network(_)) {
            self.connected = false;
        }
    }
}

impl<B> Connection for MemoryConnection<B>
where
    B: Clone + Send + Sync + 'static,
{
    type Batch = B;

    fn insert(&mut self, table: &str, batch: &B, idempotent_id: Option<&str>) -> Result<()> {
        let delay = {
            let mut state = self.server.state.lock();
            state.calls.inserts += 1;
            if let Some(id) = idempotent_id {
                *state.attempts_by_id.entry(id.to_string()).or_insert(0) += 1;
            }
            state.active_inserts += 1;
            state.peak_active_inserts = state.peak_active_inserts.max(state.active_inserts);
            state.insert_delay
        };

        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut state = self.server.state.lock();
        state.active_inserts -= 1;
        self.check_connected()?;

        let lost_ack = match state.insert_faults.pop_front() {
            Some(Fault::Reject(err)) => {
                drop(state);
                self.note_failure(&err);
                return Err(err);
            }
            Some(Fault::LoseAck(err)) => Some(err),
            None => None,
        };

        if !state.tables.contains_key(table) {
            return Err(Error::server(
                ErrorCode::UNKNOWN_TABLE,
                format!("table {} doesn't exist", table),
            ));
        }

        let duplicate = match idempotent_id {
            Some(id) => !state
                .applied_ids
                .insert((table.to_string(), id.to_string())),
            None => false,
        };
        if !duplicate {
            if let Some(rows) = state.tables.get_mut(table) {
                rows.push(batch.clone());
            }
        }

        if let Some(err) = lost_ack {
            drop(state);
            self.note_failure(&err);
            return Err(err);
        }

        Ok(())
    }

    fn execute(&mut self, query: &str) -> Result<()> {
        self.check_connected()?;
        {
            let mut state = self.server.state.lock();
            state.calls.executes += 1;
            state.queries.push(query.to_string());
        }

        let words: Vec<&str> = query.split_whitespace().collect();
        match words.as_slice() {
            [verb, kind, rest @ ..]
                if verb.eq_ignore_ascii_case("create") && is_table_kind(kind) =>
            {
                let name = table_name(rest).ok_or_else(|| {
                    Error::server(ErrorCode::SYNTAX_ERROR, format!("syntax error: {}", query))
                })?;
                self.server.create_table(name);
            }
            [verb, kind, rest @ ..] if verb.eq_ignore_ascii_case("drop") && is_table_kind(kind) => {
                let name = table_name(rest).ok_or_else(|| {
                    Error::server(ErrorCode::SYNTAX_ERROR, format!("syntax error: {}", query))
                })?;
                self.server.drop_table(name);
            }
            _ => {}
        }
        Ok(())
    }

    fn ping(&mut self) -> Result<()> {
        let fault = {
            let mut state = self.server.state.lock();
            state.calls.pings += 1;
            state.ping_faults.pop_front()
        };
        self.check_connected()?;
        match fault {
            Some(err) => {
                self.note_failure(&err);
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn reset_endpoint(&mut self) -> Result<()> {
        let fault = {
            let mut state = self.server.state.lock();
            state.calls.resets += 1;
            state.connect_faults.pop_front()
        };
        match fault {
            Some(err) => {
                self.connected = false;
                Err(err)
            }
            None => {
                self.connected = true;
                Ok(())
            }
        }
    }
}

fn is_table_kind(word: &str) -> bool {
    word.eq_ignore_ascii_case("table") || word.eq_ignore_ascii_case("stream")
}

/// Table name after `CREATE TABLE` / `DROP TABLE`, skipping `IF [NOT] EXISTS`.
fn table_name<'a>(rest: &[&'a str]) -> Option<&'a str> {
    let mut words = rest.iter().copied().peekable();
    if words.peek().is_some_and(|w| w.eq_ignore_ascii_case("if")) {
        words.next();
        if words.peek().is_some_and(|w| w.eq_ignore_ascii_case("not")) {
            words.next();
        }
        words.next()?;
    }
    words
        .next()
        .map(|w| w.split('(').next().unwrap_or(w).trim_end_matches(';'))
        .filter(|w| !w.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect(server: &MemoryServer<u32>) -> MemoryConnection<u32> {
        MemoryConnector::new(server.clone()).connect().unwrap()
    }

    #[test]
    fn test_insert_into_unknown_table() {
        let server = MemoryServer::new();
        let mut conn = connect(&server);

        let err = conn.insert("missing", &1, None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UNKNOWN_TABLE);
    }

    #[test]
    fn test_idempotent_insert_applied_once() {
        let server = MemoryServer::new();
        server.create_table("t");
        let mut conn = connect(&server);

        conn.insert("t", &7, Some("k1")).unwrap();
        conn.insert("t", &7, Some("k1")).unwrap();
        conn.insert("t", &7, None).unwrap();

        assert_eq!(server.batches("t"), vec![7, 7]);
        assert_eq!(server.attempts_for("k1"), 2);
    }

    #[test]
    fn test_lost_ack_stores_batch() {
        let server = MemoryServer::new();
        server.create_table("t");
        server.push_insert_fault(Fault::LoseAck(Error::Network("reset by peer".into())));
        let mut conn = connect(&server);

        assert!(conn.insert("t", &1, Some("k")).is_err());
        assert!(!conn.is_connected());
        assert_eq!(server.batch_count("t"), 1);

        // Closed until reset.
        assert!(conn.insert("t", &1, Some("k")).is_err());
        conn.reset_endpoint().unwrap();
        conn.insert("t", &1, Some("k")).unwrap();
        assert_eq!(server.batch_count("t"), 1);
    }

    #[test]
    fn test_reject_fault_consumed_in_order() {
        let server = MemoryServer::new();
        server.create_table("t");
        server.push_insert_fault(Fault::Reject(Error::Protocol("garbled".into())));
        let mut conn = connect(&server);

        assert!(matches!(conn.insert("t", &1, None), Err(Error::Protocol(_))));
        assert!(conn.is_connected());
        conn.insert("t", &1, None).unwrap();
        assert_eq!(server.calls().inserts, 2);
    }

    #[test]
    fn test_connect_fault() {
        let server: MemoryServer<u32> = MemoryServer::new();
        server.push_connect_fault(Error::Network("refused".into()));
        let connector = MemoryConnector::new(server.clone());

        assert!(connector.connect().is_err());
        assert!(connector.connect().is_ok());
        assert_eq!(server.calls().connects, 2);
    }

    #[test]
    fn test_execute_ddl() {
        let server: MemoryServer<u32> = MemoryServer::new();
        let mut conn = connect(&server);

        conn.execute("CREATE STREAM IF NOT EXISTS events(id uint64)")
            .unwrap();
        conn.insert("events", &1, None).unwrap();
        conn.execute("DROP TABLE IF EXISTS events;").unwrap();
        assert!(conn.insert("events", &1, None).is_err());
        assert_eq!(server.queries().len(), 2);
    }
}
