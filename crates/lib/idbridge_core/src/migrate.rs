//! Database migration support.
//!
//! Embeds and runs the control-plane migrations from `idbridge_core/migrations/`.

use sqlx::AnyPool;

/// Run all embedded control-plane migrations against the given pool.
pub async fn migrate(pool: &AnyPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_create_control_plane_tables() {
        let pool = crate::db::connect("sqlite::memory:", 1).await.unwrap();
        migrate(&pool).await.unwrap();
        // Idempotent on a second run.
        migrate(&pool).await.unwrap();

        for table in [
            "connected_databases",
            "schema_mappings",
            "auth_tokens",
            "user_bans",
            "audit_events",
        ] {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = $1",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .unwrap();
            assert_eq!(count, 1, "missing table {table}");
        }
    }
}
