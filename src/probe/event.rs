//! 探针对外事件
//!
//! 只有状态转换和配置失败会离开探测引擎，单次探测失败不会

use crate::probe::aggregator::Transition;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 配置失败原因
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ConfigFailureReason {
    /// 探针配置构建失败（URL无效、凭证不可用等）
    Build(String),
    /// 调度器内部故障，探针任务被中止
    InternalFault(String),
}

impl fmt::Display for ConfigFailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigFailureReason::Build(message) => write!(f, "配置构建失败: {message}"),
            ConfigFailureReason::InternalFault(message) => write!(f, "内部故障: {message}"),
        }
    }
}

/// 探针事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProbeEvent {
    BecameReady {
        workspace_id: String,
        server_id: String,
    },
    BecameNotReady {
        workspace_id: String,
        server_id: String,
    },
    ProbeTerminated {
        workspace_id: String,
        server_id: String,
    },
    ProbeConfigFailed {
        workspace_id: String,
        server_id: String,
        reason: ConfigFailureReason,
    },
}

impl ProbeEvent {
    /// 由状态转换构造事件
    pub fn from_transition(workspace_id: &str, server_id: &str, transition: Transition) -> Self {
        let workspace_id = workspace_id.to_string();
        let server_id = server_id.to_string();
        match transition {
            Transition::BecameReady => ProbeEvent::BecameReady {
                workspace_id,
                server_id,
            },
            Transition::BecameNotReady => ProbeEvent::BecameNotReady {
                workspace_id,
                server_id,
            },
            Transition::Terminated => ProbeEvent::ProbeTerminated {
                workspace_id,
                server_id,
            },
        }
    }

    /// 构造配置失败事件
    pub fn config_failed(workspace_id: &str, server_id: &str, reason: ConfigFailureReason) -> Self {
        ProbeEvent::ProbeConfigFailed {
            workspace_id: workspace_id.to_string(),
            server_id: server_id.to_string(),
            reason,
        }
    }

    pub fn workspace_id(&self) -> &str {
        match self {
            ProbeEvent::BecameReady { workspace_id, .. }
            | ProbeEvent::BecameNotReady { workspace_id, .. }
            | ProbeEvent::ProbeTerminated { workspace_id, .. }
            | ProbeEvent::ProbeConfigFailed { workspace_id, .. } => workspace_id,
        }
    }

    pub fn server_id(&self) -> &str {
        match self {
            ProbeEvent::BecameReady { server_id, .. }
            | ProbeEvent::BecameNotReady { server_id, .. }
            | ProbeEvent::ProbeTerminated { server_id, .. }
            | ProbeEvent::ProbeConfigFailed { server_id, .. } => server_id,
        }
    }

    /// 事件类型名称
    pub fn name(&self) -> &'static str {
        match self {
            ProbeEvent::BecameReady { .. } => "became_ready",
            ProbeEvent::BecameNotReady { .. } => "became_not_ready",
            ProbeEvent::ProbeTerminated { .. } => "probe_terminated",
            ProbeEvent::ProbeConfigFailed { .. } => "probe_config_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let event = ProbeEvent::config_failed(
            "ws-1",
            "terminal",
            ConfigFailureReason::Build("bad url".to_string()),
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "probe_config_failed");
        assert_eq!(json["workspace_id"], "ws-1");
        assert_eq!(json["reason"]["kind"], "build");
        assert_eq!(json["reason"]["message"], "bad url");
    }

    #[test]
    fn test_from_transition() {
        let event = ProbeEvent::from_transition("ws-1", "wsagent", Transition::Terminated);

        assert_eq!(event.name(), "probe_terminated");
        assert_eq!(event.workspace_id(), "ws-1");
        assert_eq!(event.server_id(), "wsagent");
    }
}
