//! Tenant repository implementation

use sqlx::PgConnection;

use crate::models::user::Tenant;
use crate::utils::errors::BillyError;

#[derive(Debug, Clone, Copy, Default)]
pub struct TenantRepository;

impl TenantRepository {
    pub async fn create(conn: &mut PgConnection) -> Result<Tenant, BillyError> {
        let tenant = sqlx::query_as::<_, Tenant>(
            "INSERT INTO tenant DEFAULT VALUES RETURNING id, generated_fake_bills, created_at",
        )
        .fetch_one(conn)
        .await?;

        Ok(tenant)
    }

    pub async fn find_by_id(conn: &mut PgConnection, id: i64) -> Result<Option<Tenant>, BillyError> {
        let tenant = sqlx::query_as::<_, Tenant>(
            "SELECT id, generated_fake_bills, created_at FROM tenant WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;

        Ok(tenant)
    }

    pub async fn mark_fake_bills_generated(conn: &mut PgConnection, id: i64) -> Result<(), BillyError> {
        sqlx::query("UPDATE tenant SET generated_fake_bills = TRUE WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await?;

        Ok(())
    }
}
