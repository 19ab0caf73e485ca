/*
 * FleetConf - AWS Inventory Configuration Agent
 * Copyright (c) 2024 FleetConf Project
 *
 * This work is licensed under CC BY-NC-SA 4.0
 * https://creativecommons.org/licenses/by-nc-sa/4.0/
 */

use clap::Parser;
use fleetconf::{config::Config, error::AppResult, services::Poller, services::TemplateWriter};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "fleetconf", version, about = "根据AWS实例清单维护配置文件并触发重载")]
struct Cli {
    /// 配置文件路径
    config: PathBuf,

    /// 启用调试日志
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let cli = Cli::parse();

    // 初始化日志，RUST_LOG优先于--debug
    let default_filter = if cli.debug {
        "fleetconf=debug"
    } else {
        "fleetconf=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    tracing::info!("正在加载配置文件: {}", cli.config.display());
    let config = match Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("加载配置文件 {} 失败: {}", cli.config.display(), e);
            std::process::exit(1);
        }
    };
    let config = Arc::new(config);

    let writer = TemplateWriter::new(config.clone()).await;

    Poller::new(config, writer).run().await
}
