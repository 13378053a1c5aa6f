//! Database repositories module
//!
//! Repositories run their queries on a borrowed connection so the caller
//! decides the transaction they belong to.

pub mod bill;
pub mod category;
pub mod tenant;
pub mod user;

// Re-export repositories
pub use bill::BillRepository;
pub use category::CategoryRepository;
pub use tenant::TenantRepository;
pub use user::UserRepository;
