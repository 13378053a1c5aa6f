//! Bill repository implementation

use sqlx::{PgConnection, Postgres, QueryBuilder};

use crate::models::expense::{Bill, BillQuery, NewBill};
use crate::utils::errors::BillyError;

const BILL_COLUMNS: &str =
    "id, value, date, original_prompt, category_id, tenant_id, message_id, fake";

#[derive(Debug, Clone, Copy, Default)]
pub struct BillRepository;

impl BillRepository {
    pub async fn create(conn: &mut PgConnection, bill: NewBill) -> Result<Bill, BillyError> {
        let bill = sqlx::query_as::<_, Bill>(&format!(
            r#"
            INSERT INTO bill (value, date, original_prompt, category_id, tenant_id, message_id, fake)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {BILL_COLUMNS}
            "#
        ))
        .bind(bill.value)
        .bind(bill.date)
        .bind(bill.original_prompt)
        .bind(bill.category_id)
        .bind(bill.tenant_id)
        .bind(bill.message_id)
        .bind(bill.fake)
        .fetch_one(conn)
        .await?;

        Ok(bill)
    }

    /// Insert many bills with a single statement
    pub async fn create_many(conn: &mut PgConnection, bills: Vec<NewBill>) -> Result<u64, BillyError> {
        if bills.is_empty() {
            return Ok(0);
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO bill (value, date, original_prompt, category_id, tenant_id, message_id, fake) ",
        );
        builder.push_values(bills, |mut row, bill| {
            row.push_bind(bill.value)
                .push_bind(bill.date)
                .push_bind(bill.original_prompt)
                .push_bind(bill.category_id)
                .push_bind(bill.tenant_id)
                .push_bind(bill.message_id)
                .push_bind(bill.fake);
        });

        let result = builder.build().execute(conn).await?;
        Ok(result.rows_affected())
    }

    pub async fn find_by_message_id(
        conn: &mut PgConnection,
        tenant_id: i64,
        message_id: &str,
    ) -> Result<Option<Bill>, BillyError> {
        let bill = sqlx::query_as::<_, Bill>(&format!(
            "SELECT {BILL_COLUMNS} FROM bill WHERE tenant_id = $1 AND message_id = $2 AND NOT fake ORDER BY id LIMIT 1"
        ))
        .bind(tenant_id)
        .bind(message_id)
        .fetch_optional(conn)
        .await?;

        Ok(bill)
    }

    pub async fn delete(conn: &mut PgConnection, id: i64) -> Result<(), BillyError> {
        sqlx::query("DELETE FROM bill WHERE id = $1")
            .bind(id)
            .execute(conn)
            .await?;

        Ok(())
    }

    pub async fn delete_fake(conn: &mut PgConnection, tenant_id: i64) -> Result<u64, BillyError> {
        let result = sqlx::query("DELETE FROM bill WHERE tenant_id = $1 AND fake")
            .bind(tenant_id)
            .execute(conn)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn sum(conn: &mut PgConnection, query: &BillQuery) -> Result<f64, BillyError> {
        let total = sqlx::query_scalar::<_, f64>(
            r#"
            SELECT COALESCE(SUM(value), 0)::float8 FROM bill
            WHERE tenant_id = $1
              AND date BETWEEN $2 AND $3
              AND ($4::bigint IS NULL OR category_id = $4)
            "#,
        )
        .bind(query.tenant_id)
        .bind(query.from)
        .bind(query.to)
        .bind(query.category_id)
        .fetch_one(conn)
        .await?;

        Ok(total)
    }

    pub async fn find_many(conn: &mut PgConnection, query: &BillQuery) -> Result<Vec<Bill>, BillyError> {
        let bills = sqlx::query_as::<_, Bill>(&format!(
            r#"
            SELECT {BILL_COLUMNS} FROM bill
            WHERE tenant_id = $1
              AND date BETWEEN $2 AND $3
              AND ($4::bigint IS NULL OR category_id = $4)
            ORDER BY date, id
            "#
        ))
        .bind(query.tenant_id)
        .bind(query.from)
        .bind(query.to)
        .bind(query.category_id)
        .fetch_all(conn)
        .await?;

        Ok(bills)
    }
}
