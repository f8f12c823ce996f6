// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use sqlx::postgres::PgPool;

use crate::db::models::{Info, NewInfo};
use crate::db::schema::INFO_INIT;
use crate::error::Result;

#[derive(Clone)]
pub struct InfoStore {
    pool: PgPool,
}

impl InfoStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::raw_sql(INFO_INIT).execute(&self.pool).await?;
        Ok(())
    }

    /// Insert one row and return its id.
    pub async fn insert(&self, info: &NewInfo) -> Result<i32> {
        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO info (name, description, contributor, version, year, date_created)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&info.name)
        .bind(&info.description)
        .bind(&info.contributor)
        .bind(info.version)
        .bind(info.year)
        .bind(info.date_created)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    pub async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM info")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn latest(&self) -> Result<Option<Info>> {
        let row = sqlx::query_as::<_, Info>(
            r#"SELECT id, name, description, contributor, version, year, date_created
               FROM info ORDER BY id DESC LIMIT 1"#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}
