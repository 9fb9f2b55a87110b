use super::{OrderPersistence, PersistenceError, PersistenceResult};
use crate::models::Order;
use crate::state_machine::OrderState;
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Postgres-backed order persistence.
///
/// Orders are stored whole as JSONB keyed by id, with the state denormalized
/// into its own column so recovery can select per state without decoding
/// every row. Queries are bound at runtime, so no live database is needed to
/// compile the crate.
pub struct PgOrderPersistence {
    pool: PgPool,
}

impl PgOrderPersistence {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the backing table when it does not exist yet.
    pub async fn ensure_schema(&self) -> PersistenceResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS broker_orders (
                id UUID PRIMARY KEY,
                state TEXT NOT NULL,
                payload JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Database {
            operation: "ensure_schema".to_string(),
            message: e.to_string(),
        })?;

        sqlx::query("CREATE INDEX IF NOT EXISTS broker_orders_state_idx ON broker_orders (state)")
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::Database {
                operation: "ensure_schema".to_string(),
                message: e.to_string(),
            })?;

        Ok(())
    }
}

#[async_trait]
impl OrderPersistence for PgOrderPersistence {
    async fn persist(&self, order: &Order) -> PersistenceResult<()> {
        let payload = serde_json::to_value(order)?;

        sqlx::query(
            r#"
            INSERT INTO broker_orders (id, state, payload, updated_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (id) DO UPDATE
            SET state = EXCLUDED.state,
                payload = EXCLUDED.payload,
                updated_at = now()
            "#,
        )
        .bind(order.id)
        .bind(order.state().to_string())
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::Database {
            operation: "persist".to_string(),
            message: e.to_string(),
        })?;

        Ok(())
    }

    async fn load_by_state(&self, state: OrderState) -> PersistenceResult<Vec<Order>> {
        let rows =
            sqlx::query("SELECT id, payload FROM broker_orders WHERE state = $1 ORDER BY updated_at")
                .bind(state.to_string())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| PersistenceError::Database {
                    operation: "load_by_state".to_string(),
                    message: e.to_string(),
                })?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let id: Uuid = row.try_get("id").map_err(|e| PersistenceError::Database {
                operation: "load_by_state".to_string(),
                message: e.to_string(),
            })?;
            let payload: serde_json::Value =
                row.try_get("payload").map_err(|e| PersistenceError::Database {
                    operation: "load_by_state".to_string(),
                    message: e.to_string(),
                })?;
            let order: Order =
                serde_json::from_value(payload).map_err(|e| PersistenceError::CorruptRecord {
                    order_id: id,
                    message: e.to_string(),
                })?;
            orders.push(order);
        }
        Ok(orders)
    }

    async fn delete(&self, order_id: Uuid) -> PersistenceResult<()> {
        sqlx::query("DELETE FROM broker_orders WHERE id = $1")
            .bind(order_id)
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::Database {
                operation: "delete".to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }
}
