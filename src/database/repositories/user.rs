//! User repository implementation

use sqlx::PgConnection;

use crate::models::user::{BillyMood, CreateUserRequest, User, DEFAULT_TOKENS_PER_HOUR};
use crate::utils::errors::BillyError;

const USER_COLUMNS: &str =
    "id, name, phone_number, tenant_id, tokens_per_hour, send_notification, billy_mood, created_at";

#[derive(Debug, Clone, Copy, Default)]
pub struct UserRepository;

impl UserRepository {
    /// Create a new user
    pub async fn create(conn: &mut PgConnection, request: CreateUserRequest) -> Result<User, BillyError> {
        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO user_account (name, phone_number, tenant_id, tokens_per_hour)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(request.name)
        .bind(request.phone_number)
        .bind(request.tenant_id)
        .bind(request.tokens_per_hour.unwrap_or(DEFAULT_TOKENS_PER_HOUR))
        .fetch_one(conn)
        .await?;

        Ok(user)
    }

    /// Find user by phone number
    pub async fn find_by_phone_number(conn: &mut PgConnection, phone_number: &str) -> Result<Option<User>, BillyError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM user_account WHERE phone_number = $1"
        ))
        .bind(phone_number)
        .fetch_optional(conn)
        .await?;

        Ok(user)
    }

    /// Rename a user
    pub async fn update_name(conn: &mut PgConnection, id: i64, name: &str) -> Result<User, BillyError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE user_account SET name = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(name)
        .fetch_one(conn)
        .await?;

        Ok(user)
    }

    /// Change the tone replies are written in
    pub async fn update_billy_mood(conn: &mut PgConnection, id: i64, mood: BillyMood) -> Result<User, BillyError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE user_account SET billy_mood = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(mood)
        .fetch_one(conn)
        .await?;

        Ok(user)
    }

    /// Toggle release notifications for a user
    pub async fn set_send_notification(conn: &mut PgConnection, id: i64, enabled: bool) -> Result<(), BillyError> {
        let result = sqlx::query("UPDATE user_account SET send_notification = $2 WHERE id = $1")
            .bind(id)
            .bind(enabled)
            .execute(conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(BillyError::InvalidInput(format!("User {} not found", id)));
        }

        Ok(())
    }
}
