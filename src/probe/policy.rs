//! 服务器类型与探测策略
//!
//! 每种服务器类型对应一组默认阈值/时间参数以及是否"失败即终止"，
//! 用一张策略表表达，而不是为每种类型实现单独的工厂

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// 工作区内的服务器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServerKind {
    /// IDE 代理（存活探针）
    WsAgent,
    /// 命令执行代理（就绪探针）
    ExecAgent,
    /// 终端服务（就绪探针）
    Terminal,
}

impl ServerKind {
    /// 所有已知的服务器类型
    pub const ALL: [ServerKind; 3] = [ServerKind::WsAgent, ServerKind::ExecAgent, ServerKind::Terminal];

    /// 配置文件中使用的名称
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerKind::WsAgent => "ws-agent",
            ServerKind::ExecAgent => "exec-agent",
            ServerKind::Terminal => "terminal",
        }
    }

    /// 内置的探测策略
    pub fn builtin_policy(&self) -> ProbePolicy {
        match self {
            ServerKind::WsAgent => ProbePolicy {
                defaults: ProbeDefaults {
                    success_threshold: 1,
                    failure_threshold: 3,
                    period_seconds: 10,
                    timeout_seconds: 8,
                    initial_delay_seconds: 120,
                    method: ProbeMethod::Get,
                },
                terminal_on_failure: true,
            },
            ServerKind::ExecAgent | ServerKind::Terminal => ProbePolicy {
                defaults: ProbeDefaults {
                    success_threshold: 1,
                    failure_threshold: 3,
                    period_seconds: 5,
                    timeout_seconds: 3,
                    initial_delay_seconds: 0,
                    method: ProbeMethod::Get,
                },
                terminal_on_failure: false,
            },
        }
    }
}

impl fmt::Display for ServerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ServerKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("未知的服务器类型: {s}"))
    }
}

/// 探测请求使用的HTTP方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProbeMethod {
    #[default]
    Get,
    Head,
}

impl fmt::Display for ProbeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeMethod::Get => f.write_str("GET"),
            ProbeMethod::Head => f.write_str("HEAD"),
        }
    }
}

/// 检测间隔和首次延迟的上限（秒）
pub const MAX_SCHEDULE_SECONDS: u64 = 7 * 24 * 60 * 60;

/// 探针的阈值与时间参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeDefaults {
    /// 判定就绪所需的连续成功次数
    pub success_threshold: u32,
    /// 判定未就绪所需的连续失败次数
    pub failure_threshold: u32,
    /// 检测间隔（秒）
    pub period_seconds: u64,
    /// 单次检测超时（秒），必须小于检测间隔
    pub timeout_seconds: u64,
    /// 首次检测前的延迟（秒）
    pub initial_delay_seconds: u64,
    /// HTTP方法
    #[serde(default)]
    pub method: ProbeMethod,
}

impl ProbeDefaults {
    /// 校验参数组合，非法组合直接报错而不是自动修正
    pub fn validate(&self) -> Result<(), String> {
        if self.success_threshold == 0 {
            return Err("成功阈值必须大于等于1".to_string());
        }
        if self.failure_threshold == 0 {
            return Err("失败阈值必须大于等于1".to_string());
        }
        if self.period_seconds == 0 {
            return Err("检测间隔必须大于0".to_string());
        }
        if self.timeout_seconds == 0 {
            return Err("检测超时必须大于0".to_string());
        }
        if self.period_seconds > MAX_SCHEDULE_SECONDS {
            return Err(format!(
                "检测间隔({}秒)不能超过{}秒",
                self.period_seconds, MAX_SCHEDULE_SECONDS
            ));
        }
        if self.initial_delay_seconds > MAX_SCHEDULE_SECONDS {
            return Err(format!(
                "首次延迟({}秒)不能超过{}秒",
                self.initial_delay_seconds, MAX_SCHEDULE_SECONDS
            ));
        }
        if self.timeout_seconds >= self.period_seconds {
            return Err(format!(
                "检测超时({}秒)必须小于检测间隔({}秒)",
                self.timeout_seconds, self.period_seconds
            ));
        }
        Ok(())
    }
}

/// 单个服务器类型的探测策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbePolicy {
    /// 默认参数
    pub defaults: ProbeDefaults,
    /// 达到失败阈值后是否终止探测
    pub terminal_on_failure: bool,
}

/// 服务器类型到探测策略的映射
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    /// 覆盖内置策略的条目
    overrides: HashMap<ServerKind, ProbePolicy>,
}

impl PolicyTable {
    /// 使用内置策略创建
    pub fn builtin() -> Self {
        Self::default()
    }

    /// 设置 ws-agent 存活探针的成功阈值
    pub fn with_ws_agent_success_threshold(mut self, success_threshold: u32) -> Self {
        let mut policy = self.policy(ServerKind::WsAgent);
        policy.defaults.success_threshold = success_threshold;
        self.overrides.insert(ServerKind::WsAgent, policy);
        self
    }

    /// 覆盖某种类型的策略
    pub fn set(&mut self, kind: ServerKind, policy: ProbePolicy) {
        self.overrides.insert(kind, policy);
    }

    /// 获取某种类型的策略
    pub fn policy(&self, kind: ServerKind) -> ProbePolicy {
        self.overrides
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.builtin_policy())
    }
}
