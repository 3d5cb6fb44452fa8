//! Workspace Probe 主程序入口
//!
//! 工作区服务器存活/就绪探测工具

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, error, info};
use workspace_probe::cli::{command_for, Args, Commands};
use workspace_probe::config::{ConfigLoader, GlobalConfig, TomlConfigLoader};
use workspace_probe::logging::{parse_level, LogConfig, LoggingSystem};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let log_config = resolve_log_config(&args).await;
    let _logging_system = LoggingSystem::setup_logging(log_config).context("初始化日志系统失败")?;

    info!("{} v{} 启动", workspace_probe::APP_NAME, workspace_probe::VERSION);

    let command = command_for(&args);
    if let Err(e) = command.execute(&args).await {
        error!("命令执行失败: {}", e);
        eprintln!("错误: {e}");
        std::process::exit(1);
    }

    Ok(())
}

/// 确定日志配置
///
/// 长期运行的命令读取配置文件中的 `[global]` 日志设置，命令行参数优先。
async fn resolve_log_config(args: &Args) -> LogConfig {
    let global = match args.command {
        Commands::Run { .. } | Commands::Check { .. } => load_global_config(args.get_config_path())
            .await
            .unwrap_or_default(),
        _ => GlobalConfig::default(),
    };

    let level = match args.log_level {
        Some(level) => level.into(),
        None => parse_level(&global.log_level).unwrap_or(log::LevelFilter::Info),
    };

    LogConfig {
        level,
        file_path: global.log_file.as_ref().map(PathBuf::from),
        console: global.log_file.is_none(),
        json_format: global.json_logs,
        ..Default::default()
    }
}

/// 尽力读取全局配置，失败时交给具体命令报告
async fn load_global_config(path: PathBuf) -> Option<GlobalConfig> {
    let loader = TomlConfigLoader::new(true);
    match loader.load_from_file(&path).await {
        Ok(config) => Some(config.global),
        Err(e) => {
            debug!("读取日志配置失败，使用默认值: {}", e);
            None
        }
    }
}
