//! Database service layer
//!
//! PostgreSQL binding of the unit of work: one database transaction per
//! processed message, with the repositories running inside it.

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};

use super::repositories::{BillRepository, CategoryRepository, TenantRepository, UserRepository};
use super::{DatabasePool, DomainStore, UnitOfWork};
use crate::models::*;
use crate::utils::errors::Result;

#[derive(Debug, Clone)]
pub struct PgDomainStore {
    pool: DatabasePool,
}

impl PgDomainStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DomainStore for PgDomainStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

/// A database transaction; dropped without commit it rolls back
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn find_user_by_phone(&mut self, phone_number: &str) -> Result<Option<User>> {
        UserRepository::find_by_phone_number(&mut self.tx, phone_number).await
    }

    async fn create_user(&mut self, request: CreateUserRequest) -> Result<User> {
        UserRepository::create(&mut self.tx, request).await
    }

    async fn update_user_name(&mut self, user_id: i64, name: &str) -> Result<User> {
        UserRepository::update_name(&mut self.tx, user_id, name).await
    }

    async fn set_send_notification(&mut self, user_id: i64, enabled: bool) -> Result<()> {
        UserRepository::set_send_notification(&mut self.tx, user_id, enabled).await
    }

    async fn update_billy_mood(&mut self, user_id: i64, mood: BillyMood) -> Result<User> {
        UserRepository::update_billy_mood(&mut self.tx, user_id, mood).await
    }

    async fn find_tenant(&mut self, tenant_id: i64) -> Result<Option<Tenant>> {
        TenantRepository::find_by_id(&mut self.tx, tenant_id).await
    }

    async fn create_tenant(&mut self) -> Result<Tenant> {
        TenantRepository::create(&mut self.tx).await
    }

    async fn mark_fake_bills_generated(&mut self, tenant_id: i64) -> Result<()> {
        TenantRepository::mark_fake_bills_generated(&mut self.tx, tenant_id).await
    }

    async fn create_category(&mut self, request: CreateCategoryRequest) -> Result<Category> {
        CategoryRepository::create(&mut self.tx, request).await
    }

    async fn list_categories(&mut self, tenant_id: i64) -> Result<Vec<Category>> {
        CategoryRepository::find_by_tenant(&mut self.tx, tenant_id).await
    }

    async fn create_bill(&mut self, bill: NewBill) -> Result<Bill> {
        BillRepository::create(&mut self.tx, bill).await
    }

    async fn create_bills(&mut self, bills: Vec<NewBill>) -> Result<u64> {
        BillRepository::create_many(&mut self.tx, bills).await
    }

    async fn find_bill_by_message_id(&mut self, tenant_id: i64, message_id: &str) -> Result<Option<Bill>> {
        BillRepository::find_by_message_id(&mut self.tx, tenant_id, message_id).await
    }

    async fn delete_bill(&mut self, bill_id: i64) -> Result<()> {
        BillRepository::delete(&mut self.tx, bill_id).await
    }

    async fn delete_fake_bills(&mut self, tenant_id: i64) -> Result<u64> {
        BillRepository::delete_fake(&mut self.tx, tenant_id).await
    }

    async fn sum_bills(&mut self, query: &BillQuery) -> Result<f64> {
        BillRepository::sum(&mut self.tx, query).await
    }

    async fn list_bills(&mut self, query: &BillQuery) -> Result<Vec<Bill>> {
        BillRepository::find_many(&mut self.tx, query).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
