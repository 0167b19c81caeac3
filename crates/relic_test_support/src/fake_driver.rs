use async_trait::async_trait;
use relic_core::{DbError, DialectFamily, Driver, DriverTransaction, QueryOutput, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// What the fake returns for a statement.
#[derive(Debug, Clone)]
pub enum FakeOutcome {
    Success(QueryOutput),
    Error(DbError),
}

impl FakeOutcome {
    fn into_result(&self) -> Result<QueryOutput, DbError> {
        match self {
            Self::Success(output) => Ok(output.clone()),
            Self::Error(error) => Err(error.clone()),
        }
    }
}

/// Everything the fake observed, for assertions.
#[derive(Debug, Clone, Default)]
pub struct FakeDriverStats {
    /// `(sql, params)` for every executed statement, in order.
    pub executed: Vec<(String, Vec<Value>)>,
    pub begin_calls: usize,
    pub commit_calls: usize,
    pub rollback_calls: usize,
    pub close_calls: usize,
}

#[derive(Default)]
struct FakeDriverState {
    /// Outcomes matched by SQL substring, first match wins.
    outcomes: RwLock<Vec<(String, FakeOutcome)>>,
    default_outcome: RwLock<Option<FakeOutcome>>,
    executed: Mutex<Vec<(String, Vec<Value>)>>,
    begin_calls: AtomicUsize,
    commit_calls: AtomicUsize,
    rollback_calls: AtomicUsize,
    close_calls: AtomicUsize,
    healthy: RwLock<bool>,
}

/// Programmable in-memory driver: statements are matched by SQL prefix and
/// replayed from a registered outcome, while everything executed is
/// recorded for assertions (statement counts, parameter contents, ordering).
#[derive(Clone)]
pub struct FakeDriver {
    family: DialectFamily,
    state: Arc<FakeDriverState>,
}

impl FakeDriver {
    pub fn new(family: DialectFamily) -> Self {
        let state = FakeDriverState {
            healthy: RwLock::new(true),
            ..FakeDriverState::default()
        };
        Self {
            family,
            state: Arc::new(state),
        }
    }

    /// Register an outcome for statements whose SQL contains `pattern`.
    pub fn with_outcome(self, pattern: impl Into<String>, outcome: FakeOutcome) -> Self {
        rwlock_write(&self.state.outcomes).push((pattern.into(), outcome));
        self
    }

    pub fn with_result(self, pattern: impl Into<String>, output: QueryOutput) -> Self {
        self.with_outcome(pattern, FakeOutcome::Success(output))
    }

    pub fn with_error(self, pattern: impl Into<String>, error: DbError) -> Self {
        self.with_outcome(pattern, FakeOutcome::Error(error))
    }

    pub fn with_default_result(self, output: QueryOutput) -> Self {
        *rwlock_write(&self.state.default_outcome) = Some(FakeOutcome::Success(output));
        self
    }

    pub fn with_default_error(self, error: DbError) -> Self {
        *rwlock_write(&self.state.default_outcome) = Some(FakeOutcome::Error(error));
        self
    }

    pub fn set_healthy(&self, healthy: bool) {
        *rwlock_write(&self.state.healthy) = healthy;
    }

    pub fn stats(&self) -> FakeDriverStats {
        FakeDriverStats {
            executed: mutex_lock(&self.state.executed).clone(),
            begin_calls: self.state.begin_calls.load(Ordering::Relaxed),
            commit_calls: self.state.commit_calls.load(Ordering::Relaxed),
            rollback_calls: self.state.rollback_calls.load(Ordering::Relaxed),
            close_calls: self.state.close_calls.load(Ordering::Relaxed),
        }
    }

    /// Executed statements whose SQL contains the given pattern.
    pub fn executed_matching(&self, pattern: &str) -> Vec<(String, Vec<Value>)> {
        mutex_lock(&self.state.executed)
            .iter()
            .filter(|(sql, _)| sql.contains(pattern))
            .cloned()
            .collect()
    }

    pub fn as_driver_arc(self) -> Arc<dyn Driver> {
        Arc::new(self)
    }

    fn respond(&self, sql: &str, params: &[Value]) -> Result<QueryOutput, DbError> {
        mutex_lock(&self.state.executed).push((sql.to_string(), params.to_vec()));

        let outcomes = rwlock_read(&self.state.outcomes);
        if let Some((_, outcome)) = outcomes.iter().find(|(pattern, _)| sql.contains(pattern.as_str())) {
            return outcome.into_result();
        }
        drop(outcomes);

        if let Some(outcome) = rwlock_read(&self.state.default_outcome).as_ref() {
            return outcome.into_result();
        }
        Ok(QueryOutput::empty())
    }
}

#[async_trait]
impl Driver for FakeDriver {
    fn family(&self) -> DialectFamily {
        self.family
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryOutput, DbError> {
        self.respond(sql, params)
    }

    async fn begin(&self) -> Result<Box<dyn DriverTransaction>, DbError> {
        self.state.begin_calls.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(FakeTransaction {
            driver: self.clone(),
        }))
    }

    async fn close(&self) -> Result<(), DbError> {
        self.state.close_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn is_healthy(&self) -> bool {
        *rwlock_read(&self.state.healthy)
    }
}

struct FakeTransaction {
    driver: FakeDriver,
}

#[async_trait]
impl DriverTransaction for FakeTransaction {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryOutput, DbError> {
        self.driver.respond(sql, params)
    }

    async fn commit(self: Box<Self>) -> Result<(), DbError> {
        self.driver
            .state
            .commit_calls
            .fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), DbError> {
        self.driver
            .state
            .rollback_calls
            .fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

fn mutex_lock<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn rwlock_read<'a, T>(lock: &'a RwLock<T>) -> RwLockReadGuard<'a, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn rwlock_write<'a, T>(lock: &'a RwLock<T>) -> RwLockWriteGuard<'a, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
