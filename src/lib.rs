//! Workspace Probe - 工作区服务器存活/就绪探测工具
//!
//! 为远程开发工作区中的每个服务器维护周期性的HTTP探针：
//! - 按服务器类型构建带凭证的探针配置
//! - 按阈值把单次结果聚合为 就绪/未就绪/终止 状态
//! - 只在状态转换时对外发布事件
//! - 配置热重载
//! - 结构化日志记录

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod probe;
pub mod token;

// 重新导出主要类型
pub use config::{Config, GlobalConfig};
pub use error::{ConfigBuildError, ProbeError, ProbeFailure, TokenError};
pub use probe::{
    HttpProbe, Probe, ProbeConfig, ProbeConfigFactory, ProbeEvent, ProbeScheduler, ProbeStatus,
    Scheduler, ServerDescriptor, ServerKind,
};
pub use token::{StaticTokenProvider, TokenProvider};

/// 应用程序版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 应用程序名称
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// 应用程序描述
pub const APP_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
