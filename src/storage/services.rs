use chrono::Utc;

use super::schema::Database;
use super::types::DatabaseError;

impl Database {
    // ========================================================================
    // Service Config Operations
    // ========================================================================

    /// Load the stored config document for a service, if any.
    pub async fn load_service_config(
        &self,
        service_id: &str,
    ) -> Result<Option<String>, DatabaseError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT config FROM services WHERE id = ?")
            .bind(service_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(config,)| config))
    }

    /// Store a service's config document. Whole-document upsert; the
    /// store never writes a partial config.
    pub async fn store_service_config(
        &self,
        service_id: &str,
        service_type: &str,
        config_json: &str,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO services (id, service_type, config, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                service_type = excluded.service_type,
                config = excluded.config,
                updated_at = excluded.updated_at
        "#,
        )
        .bind(service_id)
        .bind(service_type)
        .bind(config_json)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
