//! Data models module
//!
//! This module contains all data structures used throughout the application

pub mod expense;
pub mod message;
pub mod user;

// Re-export commonly used models
pub use expense::{Bill, BillQuery, Category, CreateCategoryRequest, NewBill, BASIC_CATEGORIES, DEFAULT_CATEGORY};
pub use message::{InboundMessage, OutboundMessage, TEXT_MESSAGE_TYPE};
pub use user::{BillyMood, CreateUserRequest, Tenant, User, DEFAULT_TOKENS_PER_HOUR};
