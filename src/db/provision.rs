// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 超级用户连接: 创建/更新角色, 创建数据库, 授权
// CREATE DATABASE 不能在事务中执行, 全部语句走 simple query 协议 (autocommit)

use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::Connection;
use tracing::{debug, info};

use crate::db::sql;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleOutcome {
    Created,
    /// role existed; its password was reset
    Updated,
}

pub struct Provisioner {
    conn: PgConnection,
}

impl Provisioner {
    pub async fn connect(opts: &PgConnectOptions) -> Result<Self> {
        let conn = PgConnection::connect_with(opts).await?;
        debug!(
            host = opts.get_host(),
            database = opts.get_database().unwrap_or_default(),
            "admin connection opened"
        );
        Ok(Self { conn })
    }

    async fn execute(&mut self, stmt: &str) -> Result<()> {
        sqlx::raw_sql(stmt).execute(&mut self.conn).await?;
        Ok(())
    }

    pub async fn role_exists(&mut self, user: &str) -> Result<bool> {
        let row: Option<i32> = sqlx::query_scalar("SELECT 1 FROM pg_roles WHERE rolname = $1")
            .bind(user)
            .fetch_optional(&mut self.conn)
            .await?;
        Ok(row.is_some())
    }

    pub async fn database_exists(&mut self, name: &str) -> Result<bool> {
        let row: Option<i32> =
            sqlx::query_scalar("SELECT 1 FROM pg_catalog.pg_database WHERE datname = $1")
                .bind(name)
                .fetch_optional(&mut self.conn)
                .await?;
        Ok(row.is_some())
    }

    /// Create the login role, or reset its password when it already exists.
    pub async fn ensure_role(&mut self, user: &str, password: &str) -> Result<RoleOutcome> {
        let outcome = if self.role_exists(user).await? {
            self.execute(&sql::alter_user_password(user, password)).await?;
            RoleOutcome::Updated
        } else {
            self.execute(&sql::create_user(user, password)).await?;
            RoleOutcome::Created
        };
        info!(user, ?outcome, "role ready");
        Ok(outcome)
    }

    /// Returns `true` when the database was created by this call.
    pub async fn ensure_database(&mut self, name: &str) -> Result<bool> {
        if self.database_exists(name).await? {
            info!(database = name, "database already exists");
            return Ok(false);
        }
        self.execute(&sql::create_database(name)).await?;
        info!(database = name, "database created");
        Ok(true)
    }

    pub async fn grant_database(&mut self, name: &str, user: &str) -> Result<()> {
        self.execute(&sql::grant_database(name, user)).await
    }

    /// Must run on a connection to the target database.
    pub async fn grant_schema(&mut self, user: &str) -> Result<()> {
        self.execute(&sql::grant_public_schema(user)).await
    }

    pub async fn close(self) -> Result<()> {
        self.conn.close().await?;
        Ok(())
    }
}
