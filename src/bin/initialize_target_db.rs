//! 主动学习目标数据库初始化
//!
//! 超级用户: 创建角色 → 创建数据库 → 授权
//! 应用用户: 建表 → 写入一条 info 记录 (COCO Camera Traps 元数据或默认值)

use anyhow::Result;
use clap::Parser;
use tracing::info;

use camtrap_rs::db::initialize_target_db;
use camtrap_rs::{init_tracing, InitDbArgs};

#[tokio::main]
async fn main() -> Result<()> {
    let args = InitDbArgs::parse();
    init_tracing(&args.log_level);

    info!(
        host = %args.host,
        port = args.port,
        database = %args.db_name,
        user = %args.db_user,
        "initializing target database"
    );
    let id = initialize_target_db(&args).await?;
    info!(id, "target database ready");
    Ok(())
}
