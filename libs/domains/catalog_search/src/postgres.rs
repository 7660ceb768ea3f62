//! Read-only order history backed by the orders database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, DbBackend, FromQueryResult, Statement, Value};
use std::str::FromStr;

use crate::error::{CatalogError, CatalogResult};
use crate::models::{OrderLine, OrderStatus, ProductId, UserId};
use crate::repository::OrderHistoryRepository;

const FULFILLED: &str = "o.status IN ('shipped', 'delivered')";

const LINE_COLUMNS: &str = r#"
    o.id AS order_id,
    o.user_id,
    oi.product_id,
    p.vendor_id,
    p.category_id,
    CAST(oi.price AS DOUBLE PRECISION) AS price,
    oi.quantity,
    o.status,
    o.created_at AS ordered_at
"#;

const LINE_JOINS: &str = r#"
    FROM order_items oi
    JOIN orders o ON o.id = oi.order_id
    JOIN products p ON p.id = oi.product_id
"#;

pub struct PgOrderHistory {
    db: DatabaseConnection,
}

impl PgOrderHistory {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[derive(Debug, FromQueryResult)]
struct OrderLineRow {
    order_id: i64,
    user_id: i64,
    product_id: i64,
    vendor_id: i64,
    category_id: i64,
    price: f64,
    quantity: i32,
    status: String,
    ordered_at: DateTime<Utc>,
}

impl TryFrom<OrderLineRow> for OrderLine {
    type Error = CatalogError;

    fn try_from(row: OrderLineRow) -> Result<Self, Self::Error> {
        let status = OrderStatus::from_str(&row.status).map_err(|_| {
            CatalogError::OrderHistory(format!("Unknown order status '{}'", row.status))
        })?;

        Ok(Self {
            order_id: row.order_id,
            user_id: row.user_id,
            product_id: row.product_id,
            vendor_id: row.vendor_id,
            category_id: row.category_id,
            price: row.price,
            quantity: row.quantity,
            status,
            ordered_at: row.ordered_at,
        })
    }
}

#[derive(Debug, FromQueryResult)]
struct BuyerRow {
    user_id: i64,
}

/// `$start, $start+1, ...` for `count` values
fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!("${}", i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn into_lines(rows: Vec<OrderLineRow>) -> CatalogResult<Vec<OrderLine>> {
    rows.into_iter().map(OrderLine::try_from).collect()
}

#[async_trait]
impl OrderHistoryRepository for PgOrderHistory {
    async fn recent_purchases(&self, user_id: UserId, limit: usize) -> CatalogResult<Vec<OrderLine>> {
        let sql = format!(
            "SELECT {LINE_COLUMNS} {LINE_JOINS}
             WHERE o.user_id = $1 AND {FULFILLED}
             ORDER BY o.created_at DESC, o.id DESC
             LIMIT $2"
        );

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            [user_id.into(), (limit as i64).into()],
        );

        let rows = OrderLineRow::find_by_statement(stmt).all(&self.db).await?;
        into_lines(rows)
    }

    async fn buyers_of(
        &self,
        product_id: ProductId,
        exclude_user: Option<UserId>,
        limit: usize,
    ) -> CatalogResult<Vec<UserId>> {
        let sql = format!(
            "SELECT o.user_id {LINE_JOINS}
             WHERE oi.product_id = $1 AND {FULFILLED}
               AND ($2::BIGINT IS NULL OR o.user_id <> $2)
             GROUP BY o.user_id
             ORDER BY MAX(o.created_at) DESC, o.user_id
             LIMIT $3"
        );

        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            sql,
            [product_id.into(), exclude_user.into(), (limit as i64).into()],
        );

        let rows = BuyerRow::find_by_statement(stmt).all(&self.db).await?;
        Ok(rows.into_iter().map(|row| row.user_id).collect())
    }

    async fn purchases_by_users(
        &self,
        user_ids: &[UserId],
        exclude_product: ProductId,
        limit: usize,
    ) -> CatalogResult<Vec<OrderLine>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT {LINE_COLUMNS} {LINE_JOINS}
             WHERE o.user_id IN ({}) AND oi.product_id <> $1 AND {FULFILLED}
             ORDER BY o.created_at DESC, o.id DESC
             LIMIT $2",
            placeholders(3, user_ids.len())
        );

        let mut values: Vec<Value> = vec![exclude_product.into(), (limit as i64).into()];
        values.extend(user_ids.iter().map(|id| Value::from(*id)));

        let stmt = Statement::from_sql_and_values(DbBackend::Postgres, sql, values);

        let rows = OrderLineRow::find_by_statement(stmt).all(&self.db).await?;
        into_lines(rows)
    }
}
