//! 错误处理模块
//!
//! 定义应用程序的统一错误类型

use thiserror::Error;

/// Workspace Probe 应用程序的主要错误类型
#[derive(Error, Debug)]
pub enum ProbeError {
    /// 配置文件相关错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),

    /// 探针配置构建错误
    #[error("探针配置构建失败: {0}")]
    ConfigBuild(#[from] ConfigBuildError),

    /// 凭证相关错误
    #[error("凭证错误: {0}")]
    Token(#[from] TokenError),

    /// HTTP客户端初始化错误
    #[error("HTTP客户端初始化失败: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// IO错误
    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    /// JSON序列化/反序列化错误
    #[error("JSON错误: {0}")]
    Json(#[from] serde_json::Error),

    /// 其他错误
    #[error("其他错误: {0}")]
    Other(#[from] anyhow::Error),
}

/// 配置文件错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 配置文件解析错误
    #[error("配置文件解析失败: {0}")]
    ParseError(String),

    /// 配置验证错误
    #[error("配置验证失败: {0}")]
    ValidationError(String),

    /// 配置文件不存在
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    /// 环境变量替换错误
    #[error("环境变量替换失败: {var}")]
    EnvVarError { var: String },
}

/// 探针配置构建错误
///
/// 对单个 (工作区, 服务器) 组合是致命的，调度器不会自动重试。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigBuildError {
    /// 服务器URL无效
    #[error("服务器URL无效: {url} ({reason})")]
    InvalidUrl { url: String, reason: String },

    /// 无法获取工作区凭证
    #[error("获取工作区凭证失败: {0}")]
    Token(#[from] TokenError),

    /// 阈值或时间参数不合法
    #[error("探针参数不合法: {0}")]
    Invalid(String),
}

/// 凭证提供者错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// 工作区没有可用凭证（例如工作区未运行）
    #[error("工作区 {workspace_id} 没有可用凭证")]
    NotFound { workspace_id: String },

    /// 凭证签发失败
    #[error("凭证签发失败: {0}")]
    Issue(String),
}

/// 单次探测失败原因
///
/// 这些错误是暂时性的，只计入失败阈值，不单独对外暴露。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    /// 超过探测截止时间
    #[error("探测超时")]
    Timeout,

    /// 连接失败（拒绝连接、DNS、TLS等）
    #[error("连接失败: {0}")]
    Connection(String),

    /// 非预期的HTTP状态码
    #[error("非预期的HTTP状态码: {0}")]
    UnexpectedStatus(u16),
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, ProbeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_error_converts_into_build_error() {
        let err: ConfigBuildError = TokenError::NotFound {
            workspace_id: "ws-1".to_string(),
        }
        .into();

        assert!(matches!(err, ConfigBuildError::Token(_)));
        assert!(err.to_string().contains("ws-1"));
    }

    #[test]
    fn test_probe_failure_display() {
        assert_eq!(ProbeFailure::Timeout.to_string(), "探测超时");
        assert!(ProbeFailure::UnexpectedStatus(503).to_string().contains("503"));
    }
}
