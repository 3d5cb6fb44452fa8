//! 命令行参数定义
//!
//! 使用clap定义应用程序的命令行接口

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Workspace Probe - 工作区服务器存活/就绪探测工具
#[derive(Parser, Debug, Clone)]
#[command(
    name = "workspace-probe",
    version = crate::VERSION,
    about = crate::APP_DESCRIPTION,
    long_about = None
)]
pub struct Args {
    /// 配置文件路径
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "配置文件路径",
        env = "WORKSPACE_PROBE_CONFIG"
    )]
    pub config: Option<PathBuf>,

    /// 日志级别，未指定时使用配置文件中的级别
    #[arg(
        short,
        long,
        value_enum,
        help = "日志级别",
        env = "WORKSPACE_PROBE_LOG_LEVEL"
    )]
    pub log_level: Option<LogLevel>,

    /// 是否启用详细输出
    #[arg(short, long, help = "启用详细输出")]
    pub verbose: bool,

    /// 子命令
    #[command(subcommand)]
    pub command: Commands,
}

/// 日志级别枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => log::LevelFilter::Trace,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

/// 子命令定义
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// 启动配置中的所有探针，持续输出状态事件直到收到 Ctrl+C
    Run {
        /// 事件输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "事件输出格式")]
        format: OutputFormat,

        /// 禁用配置热重载
        #[arg(long, help = "禁用配置热重载")]
        no_hot_reload: bool,
    },

    /// 对配置中的服务器执行一次性探测
    Check {
        /// 只探测指定工作区
        #[arg(short, long, value_name = "WORKSPACE", help = "工作区ID")]
        workspace: Option<String>,

        /// 输出格式
        #[arg(short, long, value_enum, default_value = "table", help = "输出格式")]
        format: OutputFormat,
    },

    /// 验证配置文件
    Validate {
        /// 配置文件路径
        #[arg(value_name = "FILE", help = "配置文件路径")]
        config_path: Option<PathBuf>,
    },

    /// 初始化配置文件
    Init {
        /// 配置文件路径
        #[arg(
            value_name = "FILE",
            help = "配置文件路径",
            default_value = "config.toml"
        )]
        config_path: PathBuf,

        /// 是否覆盖现有文件
        #[arg(short, long, help = "覆盖现有文件")]
        force: bool,
    },

    /// 显示版本信息
    Version {
        /// 输出格式
        #[arg(short, long, value_enum, default_value = "text", help = "输出格式")]
        format: OutputFormat,
    },
}

/// 输出格式枚举
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
pub enum OutputFormat {
    /// 文本格式
    Text,
    /// JSON格式
    Json,
    /// 表格格式
    Table,
}

impl Args {
    /// 解析命令行参数
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// 获取配置文件路径
    pub fn get_config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::loader::get_default_config_path)
    }

    /// 是否启用详细输出
    pub fn is_verbose(&self) -> bool {
        self.verbose || matches!(self.log_level, Some(LogLevel::Debug | LogLevel::Trace))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_command() {
        let args = Args::try_parse_from([
            "workspace-probe",
            "--config",
            "/tmp/probe.toml",
            "run",
            "--format",
            "json",
            "--no-hot-reload",
        ])
        .unwrap();

        assert_eq!(args.get_config_path(), PathBuf::from("/tmp/probe.toml"));
        match args.command {
            Commands::Run {
                format,
                no_hot_reload,
            } => {
                assert_eq!(format, OutputFormat::Json);
                assert!(no_hot_reload);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_check_command_defaults() {
        let args = Args::try_parse_from(["workspace-probe", "check", "-w", "ws-1"]).unwrap();

        match args.command {
            Commands::Check { workspace, format } => {
                assert_eq!(workspace.as_deref(), Some("ws-1"));
                assert_eq!(format, OutputFormat::Table);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_verbose_from_log_level() {
        let args =
            Args::try_parse_from(["workspace-probe", "--log-level", "debug", "version"]).unwrap();
        assert!(args.is_verbose());

        let args = Args::try_parse_from(["workspace-probe", "version"]).unwrap();
        assert!(!args.is_verbose());
    }
}
