//! The client façade: per-model delegates over one driver, raw SQL, health
//! and lifecycle, plus read-only internals for policy layers.

use crate::convert::ValueConverter;
use crate::dialect::{Dialect, dialect_for};
use crate::driver::{Driver, DriverTransaction, Exec, QueryOutput};
use crate::engine::{DEFAULT_INSERT_BATCH_SIZE, EngineContext, ModelHandle};
use crate::error::DbError;
use crate::schema::ModelRegistry;
use crate::sql::{Casing, Fragment};
use crate::tenant::TenantGraph;
use std::sync::Arc;

/// Client construction options.
pub struct DatabaseOptions {
    pub driver: Arc<dyn Driver>,
    pub registry: ModelRegistry,
    pub casing: Casing,
    /// Maximum rows per generated INSERT statement.
    pub insert_batch_size: usize,
}

impl DatabaseOptions {
    pub fn new(driver: Arc<dyn Driver>, registry: ModelRegistry) -> Self {
        Self {
            driver,
            registry,
            casing: Casing::default(),
            insert_batch_size: DEFAULT_INSERT_BATCH_SIZE,
        }
    }

    pub fn casing(mut self, casing: Casing) -> Self {
        self.casing = casing;
        self
    }

    pub fn insert_batch_size(mut self, size: usize) -> Self {
        self.insert_batch_size = size;
        self
    }
}

/// Read-only view of the assembled client, for layers that need to inspect
/// the schema rather than query through it.
pub struct Internals<'a> {
    pub registry: &'a ModelRegistry,
    pub dialect: &'a dyn Dialect,
    pub tenant_graph: &'a TenantGraph,
}

/// The assembled client.
///
/// Model-name validation happened at registry build time; the façade only
/// wires the registry, the dialect matching the driver's family, and the
/// value converter together. Cheap to share behind an `Arc`; all state is
/// immutable except the driver's own pool.
pub struct Database {
    driver: Arc<dyn Driver>,
    ctx: EngineContext,
}

impl Database {
    pub fn new(options: DatabaseOptions) -> Self {
        let family = options.driver.family();
        log::info!(
            "assembling client: {} models, {:?} backend",
            options.registry.models().len(),
            family
        );
        Self {
            driver: options.driver,
            ctx: EngineContext {
                dialect: dialect_for(family),
                converter: ValueConverter::new(family),
                registry: options.registry,
                casing: options.casing,
                insert_batch_size: options.insert_batch_size,
            },
        }
    }

    /// The operation surface for one registered model.
    pub fn model(&self, name: &str) -> Result<ModelHandle<'_>, DbError> {
        let (_, key, model) = self
            .ctx
            .registry
            .models()
            .get_full(name)
            .ok_or_else(|| DbError::validation(format!("unknown model {}", name)))?;
        Ok(ModelHandle::new(
            &self.ctx,
            Exec::Driver(self.driver.as_ref()),
            key,
            model,
        ))
    }

    /// Run a raw SQL fragment. Results are untyped and skip the value
    /// converter; the caller owns interpretation of the rows.
    pub async fn query(&self, fragment: &Fragment) -> Result<QueryOutput, DbError> {
        let statement = fragment.render(self.ctx.dialect.as_ref());
        log::debug!("raw query: {}", statement.text.replace('\n', " "));
        self.driver.execute(&statement.text, &statement.params).await
    }

    /// Open a transaction; every operation on the handle shares one
    /// connection.
    pub async fn begin(&self) -> Result<Transaction<'_>, DbError> {
        let tx = self.driver.begin().await?;
        Ok(Transaction { tx, ctx: &self.ctx })
    }

    pub async fn close(&self) -> Result<(), DbError> {
        self.driver.close().await
    }

    pub async fn is_healthy(&self) -> bool {
        self.driver.is_healthy().await
    }

    pub fn internals(&self) -> Internals<'_> {
        Internals {
            registry: &self.ctx.registry,
            dialect: self.ctx.dialect.as_ref(),
            tenant_graph: self.ctx.registry.tenant_graph(),
        }
    }
}

/// An open transaction. Dropping without `commit` leaves the rollback to
/// the driver's connection teardown.
pub struct Transaction<'a> {
    tx: Box<dyn DriverTransaction>,
    ctx: &'a EngineContext,
}

impl Transaction<'_> {
    pub fn model(&self, name: &str) -> Result<ModelHandle<'_>, DbError> {
        let (_, key, model) = self
            .ctx
            .registry
            .models()
            .get_full(name)
            .ok_or_else(|| DbError::validation(format!("unknown model {}", name)))?;
        Ok(ModelHandle::new(
            self.ctx,
            Exec::Transaction(self.tx.as_ref()),
            key,
            model,
        ))
    }

    pub async fn query(&self, fragment: &Fragment) -> Result<QueryOutput, DbError> {
        let statement = fragment.render(self.ctx.dialect.as_ref());
        self.tx.execute(&statement.text, &statement.params).await
    }

    pub async fn commit(self) -> Result<(), DbError> {
        self.tx.commit().await
    }

    pub async fn rollback(self) -> Result<(), DbError> {
        self.tx.rollback().await
    }
}
