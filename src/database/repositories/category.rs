//! Category repository implementation

use sqlx::PgConnection;

use crate::models::expense::{Category, CreateCategoryRequest};
use crate::utils::errors::BillyError;

#[derive(Debug, Clone, Copy, Default)]
pub struct CategoryRepository;

impl CategoryRepository {
    pub async fn create(conn: &mut PgConnection, request: CreateCategoryRequest) -> Result<Category, BillyError> {
        let category = sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO category (name, description, tenant_id)
            VALUES ($1, $2, $3)
            RETURNING id, name, description, tenant_id
            "#,
        )
        .bind(request.name)
        .bind(request.description)
        .bind(request.tenant_id)
        .fetch_one(conn)
        .await?;

        Ok(category)
    }

    /// All categories of a tenant in creation order
    pub async fn find_by_tenant(conn: &mut PgConnection, tenant_id: i64) -> Result<Vec<Category>, BillyError> {
        let categories = sqlx::query_as::<_, Category>(
            "SELECT id, name, description, tenant_id FROM category WHERE tenant_id = $1 ORDER BY id",
        )
        .bind(tenant_id)
        .fetch_all(conn)
        .await?;

        Ok(categories)
    }
}
