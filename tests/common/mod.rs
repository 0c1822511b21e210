//! Scripted in-memory driver shared by the integration tests.
//!
//! Statements are answered by substring rules: queued responses are consumed
//! in order, fixed responses answer every match, anything else gets an empty
//! result. Every executed statement is recorded.

#![allow(dead_code)]

use mysql_keeper::config::RuntimeConfig;
use mysql_keeper::db::{Database, Driver, DriverConnection, format_query};
use mysql_keeper::error::{DbError, DbResult, DriverError, ErrorCode};
use mysql_keeper::hooks::LifecycleHooks;
use mysql_keeper::models::{
    ConnectionConfig, QueryOutput, QueryParam, Row, SessionInfo, ZombieSession,
};
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

type Response = Result<QueryOutput, DriverError>;

#[derive(Default)]
pub struct MockState {
    pub connect_attempts: usize,
    pub connects: usize,
    pub connect_failures: VecDeque<DriverError>,
    queued: Vec<(String, VecDeque<Response>)>,
    fixed: Vec<(String, Response)>,
    pub executed: Vec<String>,
    pub runtime_errors: Vec<DriverError>,
    pub reconnects: usize,
    pub reconnect_failures: VecDeque<DriverError>,
    pub connecting: bool,
    pub ended: usize,
    pub destroyed: usize,
}

#[derive(Clone, Default)]
pub struct MockDriver {
    pub state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `times` connect attempts fail with `code`.
    pub fn fail_connect(&self, code: ErrorCode, times: usize) {
        let mut state = self.state.lock().unwrap();
        for i in 0..times {
            state
                .connect_failures
                .push_back(DriverError::new(code, format!("connect failure {}", i + 1)));
        }
    }

    /// Answer the next statement containing `pattern` with `response`.
    pub fn respond(&self, pattern: &str, response: Response) {
        let mut state = self.state.lock().unwrap();
        match state.queued.iter_mut().find(|(p, _)| p == pattern) {
            Some((_, responses)) => responses.push_back(response),
            None => state
                .queued
                .push((pattern.to_string(), VecDeque::from([response]))),
        }
    }

    /// Answer every statement containing `pattern` with `response`.
    pub fn respond_always(&self, pattern: &str, response: Response) {
        self.state.lock().unwrap().fixed.push((pattern.to_string(), response));
    }

    /// Make the live connection report `code` asynchronously.
    pub fn inject_runtime_error(&self, code: ErrorCode) {
        self.state
            .lock()
            .unwrap()
            .runtime_errors
            .push(DriverError::new(code, "socket closed by server"));
    }

    /// The next `times` reconnects on a live handle fail with `code`.
    pub fn fail_reconnect(&self, code: ErrorCode, times: usize) {
        let mut state = self.state.lock().unwrap();
        for _ in 0..times {
            state
                .reconnect_failures
                .push_back(DriverError::new(code, "reconnect failed"));
        }
    }

    /// Make live handles report a handshake in progress.
    pub fn set_connecting(&self, connecting: bool) {
        self.state.lock().unwrap().connecting = connecting;
    }

    pub fn reconnects(&self) -> usize {
        self.state.lock().unwrap().reconnects
    }

    pub fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }

    pub fn executed_matching(&self, pattern: &str) -> usize {
        self.executed().iter().filter(|sql| sql.contains(pattern)).count()
    }

    pub fn connect_attempts(&self) -> usize {
        self.state.lock().unwrap().connect_attempts
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn ended(&self) -> usize {
        self.state.lock().unwrap().ended
    }

    pub fn destroyed(&self) -> usize {
        self.state.lock().unwrap().destroyed
    }
}

impl Driver for MockDriver {
    type Connection = MockConnection;

    async fn connect(&self, _config: &ConnectionConfig) -> Result<MockConnection, DriverError> {
        let mut state = self.state.lock().unwrap();
        state.connect_attempts += 1;
        if let Some(err) = state.connect_failures.pop_front() {
            return Err(err);
        }
        state.connects += 1;
        Ok(MockConnection {
            state: self.state.clone(),
            session_id: state.connects as u64,
        })
    }
}

pub struct MockConnection {
    state: Arc<Mutex<MockState>>,
    session_id: u64,
}

impl DriverConnection for MockConnection {
    fn session_id(&self) -> Option<u64> {
        Some(self.session_id)
    }

    fn is_connecting(&self) -> bool {
        self.state.lock().unwrap().connecting
    }

    async fn reconnect(&mut self) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.reconnects += 1;
        match state.reconnect_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn format(&self, sql: &str, params: &[QueryParam]) -> Result<String, DriverError> {
        format_query(sql, params)
    }

    async fn execute(&mut self, sql: &str) -> Result<QueryOutput, DriverError> {
        let mut state = self.state.lock().unwrap();
        state.executed.push(sql.to_string());

        let queued = state
            .queued
            .iter_mut()
            .find(|(pattern, responses)| sql.contains(pattern.as_str()) && !responses.is_empty())
            .and_then(|(_, responses)| responses.pop_front());
        if let Some(response) = queued {
            return response;
        }

        state
            .fixed
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| Ok(QueryOutput::default()))
    }

    fn take_runtime_errors(&mut self) -> Vec<DriverError> {
        std::mem::take(&mut self.state.lock().unwrap().runtime_errors)
    }

    async fn end(self) -> Result<(), DriverError> {
        self.state.lock().unwrap().ended += 1;
        Ok(())
    }

    fn destroy(self) {
        self.state.lock().unwrap().destroyed += 1;
    }
}

/// Hooks that record every callback and optionally swallow errors.
#[derive(Clone, Default)]
pub struct RecordingHooks {
    pub events: Arc<Mutex<Vec<String>>>,
    pub swallow_connect_error: bool,
    pub swallow_clear_error: bool,
    pub swallow_error: bool,
}

impl RecordingHooks {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }

    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl LifecycleHooks for RecordingHooks {
    fn on_connect(&self, session: &SessionInfo) {
        self.record(format!("connect:{}", session.session_id.unwrap_or_default()));
    }

    fn on_connect_error(&self, err: DbError) -> DbResult<()> {
        self.record(format!("connect_error:{}", err));
        if self.swallow_connect_error {
            Ok(())
        } else {
            Err(err)
        }
    }

    fn on_clear(&self, zombie: &ZombieSession) {
        self.record(format!("clear:{}:{}", zombie.id, zombie.idle_secs));
    }

    fn on_clear_error(&self, err: DbError) -> DbResult<()> {
        self.record(format!("clear_error:{}", err));
        if self.swallow_clear_error {
            Ok(())
        } else {
            Err(err)
        }
    }

    fn on_error(&self, err: DbError) -> DbResult<()> {
        self.record(format!("error:{}", err));
        if self.swallow_error {
            Ok(())
        } else {
            Err(err)
        }
    }

    fn on_close(&self) {
        self.record("close".to_string());
    }
}

pub fn connection_config() -> ConnectionConfig {
    ConnectionConfig::new("localhost", "app").with_database("shop")
}

/// A database over `driver` with `hooks` and the given config tweaks.
pub fn database(
    driver: &MockDriver,
    hooks: &RecordingHooks,
    configure: impl FnOnce(&mut RuntimeConfig),
) -> Database<MockDriver> {
    let mut config = RuntimeConfig::default().with_hooks(hooks.clone());
    configure(&mut config);
    Database::new(driver.clone(), connection_config(), config)
}

pub fn driver_error(code: ErrorCode) -> DriverError {
    DriverError::new(code, format!("{} from mock", code))
}

/// Build a result from a JSON array of row objects.
pub fn rows(value: JsonValue) -> QueryOutput {
    let rows: Vec<Row> = value
        .as_array()
        .expect("rows must be a JSON array")
        .iter()
        .map(|row| row.as_object().expect("row must be an object").clone())
        .collect();
    QueryOutput::from_rows(rows)
}
