//! Database module
//!
//! This module handles database connections and the transactional unit of
//! work every message is processed in. One message gets one unit of work:
//! the orchestrator commits it after the dialogue ran and rolls it back on
//! any failure.

pub mod connection;
pub mod memory;
pub mod repositories;
pub mod service;

use async_trait::async_trait;

use crate::models::{
    Bill, BillQuery, BillyMood, Category, CreateCategoryRequest, CreateUserRequest, NewBill, Tenant, User,
};
use crate::utils::errors::Result;

// Re-export commonly used database components
pub use connection::{create_pool, health_check, run_migrations, DatabasePool};
pub use memory::MemoryDomainStore;
pub use repositories::{BillRepository, CategoryRepository, TenantRepository, UserRepository};
pub use service::{PgDomainStore, PgUnitOfWork};

/// Opens units of work against the domain persistence layer
#[async_trait]
pub trait DomainStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;
}

/// Transactional access to users, tenants, categories and bills.
///
/// Nothing written through a unit of work is visible to other units until
/// `commit` succeeds. Dropping a unit of work without committing discards it.
#[async_trait]
pub trait UnitOfWork: Send {
    async fn find_user_by_phone(&mut self, phone_number: &str) -> Result<Option<User>>;
    async fn create_user(&mut self, request: CreateUserRequest) -> Result<User>;
    async fn update_user_name(&mut self, user_id: i64, name: &str) -> Result<User>;
    async fn set_send_notification(&mut self, user_id: i64, enabled: bool) -> Result<()>;
    async fn update_billy_mood(&mut self, user_id: i64, mood: BillyMood) -> Result<User>;

    async fn find_tenant(&mut self, tenant_id: i64) -> Result<Option<Tenant>>;
    async fn create_tenant(&mut self) -> Result<Tenant>;
    async fn mark_fake_bills_generated(&mut self, tenant_id: i64) -> Result<()>;

    async fn create_category(&mut self, request: CreateCategoryRequest) -> Result<Category>;
    async fn list_categories(&mut self, tenant_id: i64) -> Result<Vec<Category>>;

    async fn create_bill(&mut self, bill: NewBill) -> Result<Bill>;
    async fn create_bills(&mut self, bills: Vec<NewBill>) -> Result<u64>;
    async fn find_bill_by_message_id(&mut self, tenant_id: i64, message_id: &str) -> Result<Option<Bill>>;
    async fn delete_bill(&mut self, bill_id: i64) -> Result<()>;
    async fn delete_fake_bills(&mut self, tenant_id: i64) -> Result<u64>;
    async fn sum_bills(&mut self, query: &BillQuery) -> Result<f64>;
    async fn list_bills(&mut self, query: &BillQuery) -> Result<Vec<Bill>>;

    async fn commit(self: Box<Self>) -> Result<()>;
    async fn rollback(self: Box<Self>) -> Result<()>;
}
