use {async_trait::async_trait, sqlx::SqlitePool, switchboard_common::unix_now};

use switchboard_sessions::{
    Error, Result, TenantConfig, TenantConfigPatch, TenantConfigProvider, TenantId,
};

/// Internal row type for sqlx mapping.
#[derive(sqlx::FromRow)]
struct TenantConfigRow {
    is_paused: bool,
    debounce_ms: i64,
    settings: String,
}

impl TryFrom<TenantConfigRow> for TenantConfig {
    type Error = Error;

    fn try_from(r: TenantConfigRow) -> Result<Self> {
        Ok(Self {
            is_paused: r.is_paused,
            debounce_ms: u64::try_from(r.debounce_ms).unwrap_or_default(),
            settings: serde_json::from_str(&r.settings)
                .map_err(|e| Error::external("decoding tenant settings", e))?,
        })
    }
}

fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> Error {
    move |e| Error::external(context, e)
}

/// SQLite-backed tenant configuration store.
pub struct SqliteTenantConfigStore {
    pool: SqlitePool,
}

impl SqliteTenantConfigStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the `tenant_configs` table.
    ///
    /// Production databases get the schema from migrations; this is for
    /// in-memory databases in tests.
    #[doc(hidden)]
    pub async fn init(pool: &SqlitePool) -> anyhow::Result<()> {
        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS tenant_configs (
                tenant_id   TEXT    PRIMARY KEY,
                is_paused   INTEGER NOT NULL DEFAULT 0,
                debounce_ms INTEGER NOT NULL DEFAULT 1500,
                settings    TEXT    NOT NULL DEFAULT '{}',
                created_at  INTEGER NOT NULL,
                updated_at  INTEGER NOT NULL
            )"#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn fetch(&self, tenant_id: &TenantId) -> Result<Option<TenantConfig>> {
        let row = sqlx::query_as::<_, TenantConfigRow>(
            "SELECT is_paused, debounce_ms, settings FROM tenant_configs WHERE tenant_id = ?",
        )
        .bind(tenant_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("loading tenant config"))?;
        row.map(TryInto::try_into).transpose()
    }
}

#[async_trait]
impl TenantConfigProvider for SqliteTenantConfigStore {
    async fn get_tenant_config(&self, tenant_id: &TenantId) -> Result<TenantConfig> {
        self.fetch(tenant_id)
            .await?
            .ok_or_else(|| Error::config(tenant_id, "no configuration stored"))
    }

    async fn set_tenant_config(
        &self,
        tenant_id: &TenantId,
        patch: TenantConfigPatch,
    ) -> Result<()> {
        let mut config = self.get_tenant_config(tenant_id).await?;
        config.apply(&patch);
        let settings = serde_json::to_string(&config.settings)
            .map_err(|e| Error::external("encoding tenant settings", e))?;
        let debounce_ms = i64::try_from(config.debounce_ms).unwrap_or(i64::MAX);

        let result = sqlx::query(
            r#"UPDATE tenant_configs
               SET is_paused = ?, debounce_ms = ?, settings = ?, updated_at = ?
               WHERE tenant_id = ?"#,
        )
        .bind(config.is_paused)
        .bind(debounce_ms)
        .bind(&settings)
        .bind(unix_now())
        .bind(tenant_id.as_str())
        .execute(&self.pool)
        .await
        .map_err(db_error("updating tenant config"))?;

        if result.rows_affected() == 0 {
            return Err(Error::config(tenant_id, "no configuration stored"));
        }
        Ok(())
    }

    async fn ensure_tenant(&self, tenant_id: &TenantId, defaults: TenantConfig) -> Result<()> {
        let settings = serde_json::to_string(&defaults.settings)
            .map_err(|e| Error::external("encoding tenant settings", e))?;
        let now = unix_now();
        sqlx::query(
            r#"INSERT INTO tenant_configs
                   (tenant_id, is_paused, debounce_ms, settings, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?)
               ON CONFLICT(tenant_id) DO NOTHING"#,
        )
        .bind(tenant_id.as_str())
        .bind(defaults.is_paused)
        .bind(i64::try_from(defaults.debounce_ms).unwrap_or(i64::MAX))
        .bind(&settings)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_error("inserting tenant config"))?;
        Ok(())
    }
}
