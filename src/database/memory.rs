//! In-process domain store.
//!
//! Each unit of work operates on a private copy of the data and publishes it
//! on commit, so uncommitted writes are never observed and a rollback (or a
//! drop) leaves the shared data untouched. Used by tests and local runs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use super::{DomainStore, UnitOfWork};
use crate::models::user::DEFAULT_TOKENS_PER_HOUR;
use crate::models::*;
use crate::utils::errors::{BillyError, Result};

#[derive(Debug, Clone, Default)]
struct Data {
    next_id: i64,
    tenants: Vec<Tenant>,
    users: Vec<User>,
    categories: Vec<Category>,
    bills: Vec<Bill>,
}

impl Data {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryDomainStore {
    data: Arc<Mutex<Data>>,
    failing_commits: Arc<AtomicBool>,
}

impl MemoryDomainStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent commit fail, leaving the shared data untouched
    pub fn set_failing_commits(&self, failing: bool) {
        self.failing_commits.store(failing, Ordering::SeqCst);
    }

    fn snapshot(&self) -> Data {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Committed users
    pub fn users(&self) -> Vec<User> {
        self.snapshot().users
    }

    /// Committed tenants
    pub fn tenants(&self) -> Vec<Tenant> {
        self.snapshot().tenants
    }

    /// Committed categories of a tenant
    pub fn categories(&self, tenant_id: i64) -> Vec<Category> {
        self.snapshot()
            .categories
            .into_iter()
            .filter(|c| c.tenant_id == tenant_id)
            .collect()
    }

    /// Committed bills of a tenant
    pub fn bills(&self, tenant_id: i64) -> Vec<Bill> {
        self.snapshot()
            .bills
            .into_iter()
            .filter(|b| b.tenant_id == tenant_id)
            .collect()
    }

    /// Seed a registered user with a fresh tenant and the default category
    pub fn seed_user(&self, name: &str, phone_number: &str) -> User {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        let tenant_id = data.next_id();
        data.tenants.push(Tenant {
            id: tenant_id,
            generated_fake_bills: false,
            created_at: Utc::now(),
        });
        let category_id = data.next_id();
        data.categories.push(Category {
            id: category_id,
            name: DEFAULT_CATEGORY.0.to_string(),
            description: Some(DEFAULT_CATEGORY.1.to_string()),
            tenant_id,
        });
        let user = User {
            id: data.next_id(),
            name: name.to_string(),
            phone_number: phone_number.to_string(),
            tenant_id,
            tokens_per_hour: DEFAULT_TOKENS_PER_HOUR,
            send_notification: true,
            billy_mood: BillyMood::Neutral,
            created_at: Utc::now(),
        };
        data.users.push(user.clone());
        user
    }
}

#[async_trait]
impl DomainStore for MemoryDomainStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        Ok(Box::new(MemoryUnitOfWork {
            shared: Arc::clone(&self.data),
            failing_commits: Arc::clone(&self.failing_commits),
            working: self.snapshot(),
        }))
    }
}

pub struct MemoryUnitOfWork {
    shared: Arc<Mutex<Data>>,
    failing_commits: Arc<AtomicBool>,
    working: Data,
}

impl MemoryUnitOfWork {
    fn user_mut(&mut self, user_id: i64) -> Result<&mut User> {
        self.working
            .users
            .iter_mut()
            .find(|u| u.id == user_id)
            .ok_or_else(|| BillyError::InvalidInput(format!("User {} not found", user_id)))
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn find_user_by_phone(&mut self, phone_number: &str) -> Result<Option<User>> {
        Ok(self
            .working
            .users
            .iter()
            .find(|u| u.phone_number == phone_number)
            .cloned())
    }

    async fn create_user(&mut self, request: CreateUserRequest) -> Result<User> {
        if self.working.users.iter().any(|u| u.phone_number == request.phone_number) {
            return Err(BillyError::InvalidInput(format!(
                "Phone number {} already registered",
                request.phone_number
            )));
        }
        let user = User {
            id: self.working.next_id(),
            name: request.name,
            phone_number: request.phone_number,
            tenant_id: request.tenant_id,
            tokens_per_hour: request.tokens_per_hour.unwrap_or(DEFAULT_TOKENS_PER_HOUR),
            send_notification: true,
            billy_mood: BillyMood::Neutral,
            created_at: Utc::now(),
        };
        self.working.users.push(user.clone());
        Ok(user)
    }

    async fn update_user_name(&mut self, user_id: i64, name: &str) -> Result<User> {
        let user = self.user_mut(user_id)?;
        user.name = name.to_string();
        Ok(user.clone())
    }

    async fn update_billy_mood(&mut self, user_id: i64, mood: BillyMood) -> Result<User> {
        let user = self.user_mut(user_id)?;
        user.billy_mood = mood;
        Ok(user.clone())
    }

    async fn set_send_notification(&mut self, user_id: i64, enabled: bool) -> Result<()> {
        self.user_mut(user_id)?.send_notification = enabled;
        Ok(())
    }

    async fn find_tenant(&mut self, tenant_id: i64) -> Result<Option<Tenant>> {
        Ok(self.working.tenants.iter().find(|t| t.id == tenant_id).cloned())
    }

    async fn create_tenant(&mut self) -> Result<Tenant> {
        let tenant = Tenant {
            id: self.working.next_id(),
            generated_fake_bills: false,
            created_at: Utc::now(),
        };
        self.working.tenants.push(tenant.clone());
        Ok(tenant)
    }

    async fn mark_fake_bills_generated(&mut self, tenant_id: i64) -> Result<()> {
        if let Some(tenant) = self.working.tenants.iter_mut().find(|t| t.id == tenant_id) {
            tenant.generated_fake_bills = true;
        }
        Ok(())
    }

    async fn create_category(&mut self, request: CreateCategoryRequest) -> Result<Category> {
        let category = Category {
            id: self.working.next_id(),
            name: request.name,
            description: request.description,
            tenant_id: request.tenant_id,
        };
        self.working.categories.push(category.clone());
        Ok(category)
    }

    async fn list_categories(&mut self, tenant_id: i64) -> Result<Vec<Category>> {
        Ok(self
            .working
            .categories
            .iter()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    async fn create_bill(&mut self, bill: NewBill) -> Result<Bill> {
        let bill = Bill {
            id: self.working.next_id(),
            value: bill.value,
            date: bill.date,
            original_prompt: bill.original_prompt,
            category_id: bill.category_id,
            tenant_id: bill.tenant_id,
            message_id: bill.message_id,
            fake: bill.fake,
        };
        self.working.bills.push(bill.clone());
        Ok(bill)
    }

    async fn create_bills(&mut self, bills: Vec<NewBill>) -> Result<u64> {
        let mut created = 0;
        for bill in bills {
            self.create_bill(bill).await?;
            created += 1;
        }
        Ok(created)
    }

    async fn find_bill_by_message_id(&mut self, tenant_id: i64, message_id: &str) -> Result<Option<Bill>> {
        Ok(self
            .working
            .bills
            .iter()
            .find(|b| b.tenant_id == tenant_id && b.message_id == message_id && !b.fake)
            .cloned())
    }

    async fn delete_bill(&mut self, bill_id: i64) -> Result<()> {
        self.working.bills.retain(|b| b.id != bill_id);
        Ok(())
    }

    async fn delete_fake_bills(&mut self, tenant_id: i64) -> Result<u64> {
        let before = self.working.bills.len();
        self.working
            .bills
            .retain(|b| !(b.tenant_id == tenant_id && b.fake));
        Ok((before - self.working.bills.len()) as u64)
    }

    async fn sum_bills(&mut self, query: &BillQuery) -> Result<f64> {
        Ok(self
            .working
            .bills
            .iter()
            .filter(|b| query.matches(b))
            .map(|b| b.value)
            .sum())
    }

    async fn list_bills(&mut self, query: &BillQuery) -> Result<Vec<Bill>> {
        let mut bills: Vec<Bill> = self
            .working
            .bills
            .iter()
            .filter(|b| query.matches(b))
            .cloned()
            .collect();
        bills.sort_by_key(|b| (b.date, b.id));
        Ok(bills)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryUnitOfWork {
            shared,
            failing_commits,
            working,
        } = *self;
        if failing_commits.load(Ordering::SeqCst) {
            return Err(BillyError::ServiceUnavailable("Commit refused".to_string()));
        }
        *shared.lock().unwrap_or_else(PoisonError::into_inner) = working;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
