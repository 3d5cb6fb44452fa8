//! 探针配置数据结构
//!
//! 描述一次HTTP检测的目标、阈值和时间参数，构建后不可变

use crate::error::ConfigBuildError;
use crate::probe::policy::{ProbeDefaults, ProbeMethod, ServerKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// 服务器描述，由工作区运行时提供
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// 服务器ID（在工作区内唯一）
    pub id: String,
    /// 服务器URL
    pub url: String,
    /// 服务器类型
    pub kind: ServerKind,
}

impl ServerDescriptor {
    /// 创建新的服务器描述
    pub fn new(id: impl Into<String>, url: impl Into<String>, kind: ServerKind) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            kind,
        }
    }
}

/// 探测协议
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    /// 协议的默认端口
    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Http => f.write_str("http"),
            Scheme::Https => f.write_str("https"),
        }
    }
}

/// 探测目标地址
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeTarget {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    /// 以 `/` 开头并以 `/` 结尾的路径
    pub path: String,
}

/// 单个探针的不可变配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeConfig {
    target: ProbeTarget,
    headers: BTreeMap<String, String>,
    method: ProbeMethod,
    success_threshold: u32,
    failure_threshold: u32,
    period_seconds: u64,
    timeout_seconds: u64,
    initial_delay_seconds: u64,
}

impl ProbeConfig {
    /// 创建探针配置，所有参数在这里校验
    ///
    /// # 参数
    /// * `target` - 探测目标
    /// * `headers` - 请求头
    /// * `defaults` - 阈值和时间参数
    ///
    /// # 返回
    /// * `Result<Self, ConfigBuildError>` - 配置或参数错误
    pub fn new(
        target: ProbeTarget,
        headers: BTreeMap<String, String>,
        defaults: &ProbeDefaults,
    ) -> Result<Self, ConfigBuildError> {
        if target.port == 0 {
            return Err(ConfigBuildError::Invalid("端口必须在1-65535之间".to_string()));
        }
        if target.host.trim().is_empty() {
            return Err(ConfigBuildError::Invalid("主机名不能为空".to_string()));
        }
        if !target.path.starts_with('/') || !target.path.ends_with('/') {
            return Err(ConfigBuildError::Invalid(format!(
                "路径必须以/开头和结尾: {}",
                target.path
            )));
        }
        defaults.validate().map_err(ConfigBuildError::Invalid)?;

        Ok(Self {
            target,
            headers,
            method: defaults.method,
            success_threshold: defaults.success_threshold,
            failure_threshold: defaults.failure_threshold,
            period_seconds: defaults.period_seconds,
            timeout_seconds: defaults.timeout_seconds,
            initial_delay_seconds: defaults.initial_delay_seconds,
        })
    }

    /// 完整的探测URL
    pub fn url(&self) -> String {
        format!(
            "{}://{}:{}{}",
            self.target.scheme, self.target.host, self.target.port, self.target.path
        )
    }

    pub fn scheme(&self) -> Scheme {
        self.target.scheme
    }

    pub fn host(&self) -> &str {
        &self.target.host
    }

    pub fn port(&self) -> u16 {
        self.target.port
    }

    pub fn path(&self) -> &str {
        &self.target.path
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn method(&self) -> ProbeMethod {
        self.method
    }

    pub fn success_threshold(&self) -> u32 {
        self.success_threshold
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn period_seconds(&self) -> u64 {
        self.period_seconds
    }

    pub fn timeout_seconds(&self) -> u64 {
        self.timeout_seconds
    }

    pub fn initial_delay_seconds(&self) -> u64 {
        self.initial_delay_seconds
    }

    /// 检测间隔
    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_seconds)
    }

    /// 单次检测截止时间
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// 首次检测延迟
    pub fn initial_delay(&self) -> Duration {
        Duration::from_secs(self.initial_delay_seconds)
    }
}
