// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Target database for active-learning labeling.
//!
//! Layout:
//! - `sql.rs`: quoting and DDL/DCL statement builders
//! - `provision.rs`: role/database creation over a superuser connection
//! - `schema.rs`: `info` table DDL
//! - `models.rs`: row structs
//! - `store.rs`: `info` table access over the app-user pool
//! - `coco.rs`: COCO Camera Traps metadata

pub mod coco;
pub mod models;
pub mod provision;
pub mod schema;
pub mod sql;
pub mod store;

use std::path::Path;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::info;

pub use coco::{CocoCameraTraps, CocoInfo};
pub use models::{Info, NewInfo};
pub use provision::{Provisioner, RoleOutcome};
pub use sql::{quote_ident, quote_literal};
pub use store::InfoStore;

use crate::config::InitDbArgs;
use crate::dataset::count_images;
use crate::error::{CamtrapError, Result};

/// Superuser connection to the maintenance database.
pub fn admin_options(args: &InitDbArgs) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&args.host)
        .port(args.port)
        .username(&args.admin_user)
        .password(&args.admin_password)
        .database(&args.admin_db)
}

/// App-user connection to the target database.
pub fn user_options(args: &InitDbArgs) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&args.host)
        .port(args.port)
        .username(&args.db_user)
        .password(&args.db_password)
        .database(&args.db_name)
}

fn check_source(source: &Path) -> Result<usize> {
    if !source.is_dir() {
        return Err(CamtrapError::Config(format!(
            "source {} is not a directory",
            source.display()
        )));
    }
    count_images(source, "JPG")
}

/// The `info` row this run will insert: COCO metadata when a file is given,
/// defaults otherwise.
pub fn info_record(args: &InitDbArgs, today: chrono::NaiveDate) -> Result<NewInfo> {
    match &args.coco_json {
        Some(path) => {
            let coco = CocoCameraTraps::load(path)?;
            info!(
                path = %path.display(),
                images = coco.images.len(),
                annotations = coco.annotations.len(),
                categories = coco.categories.len(),
                "COCO Camera Traps metadata loaded"
            );
            NewInfo::from_coco(&args.db_name, &coco.info)
        }
        None => Ok(NewInfo::defaults(&args.db_name, &args.db_user, today)),
    }
}

/// Provision role and database, create the schema and insert one `info` row.
/// Returns the new row id. Safe to re-run against an existing role/database.
pub async fn initialize_target_db(args: &InitDbArgs) -> Result<i32> {
    if let Some(source) = &args.source {
        let n = check_source(source)?;
        info!(source = %source.display(), images = n, "dataset source checked");
    }
    // COCO 文件先解析, 出错时不触碰数据库
    let record = info_record(args, chrono::Local::now().date_naive())?;

    let admin = admin_options(args);
    let mut provisioner = Provisioner::connect(&admin).await?;
    provisioner
        .ensure_role(&args.db_user, &args.db_password)
        .await?;
    provisioner.ensure_database(&args.db_name).await?;
    provisioner
        .grant_database(&args.db_name, &args.db_user)
        .await?;
    provisioner.close().await?;

    let mut provisioner = Provisioner::connect(&admin.clone().database(&args.db_name)).await?;
    provisioner.grant_schema(&args.db_user).await?;
    provisioner.close().await?;

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect_with(user_options(args))
        .await?;
    let store = InfoStore::new(pool);
    store.init_schema().await?;
    let id = store.insert(&record).await?;
    info!(
        id,
        database = %args.db_name,
        contributor = %record.contributor,
        "info record inserted"
    );
    store.pool().close().await;
    Ok(id)
}
