//! 配置数据结构定义
//!
//! 定义应用程序的配置结构体和验证逻辑

use crate::probe::config::ServerDescriptor;
use crate::probe::policy::{PolicyTable, ProbeMethod, ProbePolicy, ServerKind};
use crate::probe::scheduler::ProbeKey;
use crate::token::StaticTokenProvider;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// 主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// 全局配置项
    #[serde(default)]
    pub global: GlobalConfig,
    /// 按服务器类型覆盖内置探测策略，键为 `ws-agent` / `exec-agent` / `terminal`
    #[serde(default)]
    pub probes: BTreeMap<String, ProbeOverride>,
    /// 工作区ID到静态凭证的映射
    #[serde(default)]
    pub tokens: HashMap<String, String>,
    /// 工作区列表
    #[serde(default)]
    pub workspaces: Vec<WorkspaceConfig>,
}

/// 全局配置结构
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GlobalConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 是否输出JSON格式日志
    #[serde(default)]
    pub json_logs: bool,
    /// 日志文件路径
    pub log_file: Option<String>,
    /// 是否启用配置热重载
    #[serde(default = "default_hot_reload")]
    pub hot_reload: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            log_file: None,
            hot_reload: default_hot_reload(),
        }
    }
}

/// 单个服务器类型的策略覆盖，未设置的字段沿用内置值
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProbeOverride {
    pub success_threshold: Option<u32>,
    pub failure_threshold: Option<u32>,
    pub period_seconds: Option<u64>,
    pub timeout_seconds: Option<u64>,
    pub initial_delay_seconds: Option<u64>,
    pub method: Option<ProbeMethod>,
    /// 达到失败阈值后是否终止探测
    pub terminal_on_failure: Option<bool>,
}

impl ProbeOverride {
    /// 将覆盖项应用到基础策略上
    pub fn apply(&self, mut policy: ProbePolicy) -> ProbePolicy {
        let defaults = &mut policy.defaults;
        if let Some(value) = self.success_threshold {
            defaults.success_threshold = value;
        }
        if let Some(value) = self.failure_threshold {
            defaults.failure_threshold = value;
        }
        if let Some(value) = self.period_seconds {
            defaults.period_seconds = value;
        }
        if let Some(value) = self.timeout_seconds {
            defaults.timeout_seconds = value;
        }
        if let Some(value) = self.initial_delay_seconds {
            defaults.initial_delay_seconds = value;
        }
        if let Some(value) = self.method {
            defaults.method = value;
        }
        if let Some(value) = self.terminal_on_failure {
            policy.terminal_on_failure = value;
        }
        policy
    }
}

/// 工作区配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceConfig {
    /// 工作区ID
    pub id: String,
    /// 工作区内的服务器
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// 服务器ID，工作区内唯一
    pub id: String,
    /// 服务器URL
    pub url: String,
    /// 服务器类型
    pub kind: ServerKind,
    /// 是否启用
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl ServerConfig {
    /// 转换为探针使用的服务器描述
    pub fn to_descriptor(&self) -> ServerDescriptor {
        ServerDescriptor::new(&self.id, &self.url, self.kind)
    }
}

impl Config {
    /// 根据 `[probes]` 覆盖项构建策略表
    pub fn policy_table(&self) -> Result<PolicyTable, String> {
        let mut table = PolicyTable::builtin();
        for (name, probe_override) in &self.probes {
            let kind: ServerKind = name.parse()?;
            table.set(kind, probe_override.apply(table.policy(kind)));
        }
        Ok(table)
    }

    /// 根据 `[tokens]` 构建静态凭证提供者
    pub fn token_provider(&self) -> StaticTokenProvider {
        StaticTokenProvider::new(self.tokens.clone())
    }

    /// 所有启用的 (工作区, 服务器) 组合，按键排序
    pub fn enabled_probes(&self) -> BTreeMap<ProbeKey, ServerDescriptor> {
        self.workspaces
            .iter()
            .flat_map(|workspace| {
                workspace
                    .servers
                    .iter()
                    .filter(|server| server.enabled)
                    .map(move |server| {
                        (
                            ProbeKey::new(&workspace.id, &server.id),
                            server.to_descriptor(),
                        )
                    })
            })
            .collect()
    }
}

// 默认值函数
fn default_log_level() -> String {
    "info".to_string()
}
fn default_hot_reload() -> bool {
    true
}
fn default_enabled() -> bool {
    true
}

/// 配置验证函数
///
/// URL 的合法性不在这里检查，由探针配置工厂在启动探针时判定。
///
/// # 参数
/// * `config` - 要验证的配置
///
/// # 返回
/// * `Result<(), String>` - 验证结果，错误时返回错误信息
pub fn validate_config(config: &Config) -> Result<(), String> {
    // 验证日志级别
    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&config.global.log_level.as_str()) {
        return Err(format!(
            "无效的日志级别: {}，支持的级别: {:?}",
            config.global.log_level, valid_log_levels
        ));
    }

    // 验证探测策略覆盖
    let table = config.policy_table()?;
    for kind in ServerKind::ALL {
        table
            .policy(kind)
            .defaults
            .validate()
            .map_err(|e| format!("{} 的探测策略无效: {}", kind, e))?;
    }

    // 验证工作区配置
    let mut workspace_ids = HashSet::new();
    for workspace in &config.workspaces {
        if workspace.id.trim().is_empty() {
            return Err("工作区ID不能为空".to_string());
        }
        if !workspace_ids.insert(workspace.id.as_str()) {
            return Err(format!("工作区ID重复: {}", workspace.id));
        }

        let mut server_ids = HashSet::new();
        for server in &workspace.servers {
            if server.id.trim().is_empty() {
                return Err(format!("工作区 {} 中存在空的服务器ID", workspace.id));
            }
            if !server_ids.insert(server.id.as_str()) {
                return Err(format!(
                    "工作区 {} 中服务器ID重复: {}",
                    workspace.id, server.id
                ));
            }
            if server.url.trim().is_empty() {
                return Err(format!(
                    "工作区 {} 的服务器 {} 缺少URL",
                    workspace.id, server.id
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        Config {
            global: GlobalConfig::default(),
            probes: BTreeMap::new(),
            tokens: HashMap::from([("ws-1".to_string(), "secret".to_string())]),
            workspaces: vec![WorkspaceConfig {
                id: "ws-1".to_string(),
                servers: vec![
                    ServerConfig {
                        id: "wsagent".to_string(),
                        url: "http://10.0.0.5:4401/api".to_string(),
                        kind: ServerKind::WsAgent,
                        enabled: true,
                    },
                    ServerConfig {
                        id: "terminal".to_string(),
                        url: "http://10.0.0.5:4411".to_string(),
                        kind: ServerKind::Terminal,
                        enabled: false,
                    },
                ],
            }],
        }
    }

    #[test]
    fn test_config_serialization() {
        let config = create_test_config();

        let serialized = toml::to_string(&config).expect("序列化失败");
        assert!(serialized.contains("kind = \"ws-agent\""));

        let deserialized: Config = toml::from_str(&serialized).expect("反序列化失败");
        assert_eq!(config, deserialized);
    }

    #[test]
    fn test_config_validation() {
        let config = create_test_config();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_config_validation_empty_is_valid() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_config_validation_duplicate_server() {
        let mut config = create_test_config();
        let duplicate = config.workspaces[0].servers[0].clone();
        config.workspaces[0].servers.push(duplicate);

        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("服务器ID重复"));
    }

    #[test]
    fn test_config_validation_duplicate_workspace() {
        let mut config = create_test_config();
        let duplicate = config.workspaces[0].clone();
        config.workspaces.push(duplicate);

        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("工作区ID重复"));
    }

    #[test]
    fn test_config_validation_invalid_log_level() {
        let mut config = create_test_config();
        config.global.log_level = "verbose".to_string();

        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("无效的日志级别"));
    }

    #[test]
    fn test_config_validation_unknown_probe_kind() {
        let mut config = create_test_config();
        config
            .probes
            .insert("database".to_string(), ProbeOverride::default());

        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("未知的服务器类型"));
    }

    #[test]
    fn test_config_validation_timeout_not_below_period() {
        let mut config = create_test_config();
        config.probes.insert(
            "terminal".to_string(),
            ProbeOverride {
                timeout_seconds: Some(5),
                ..Default::default()
            },
        );

        let result = validate_config(&config);
        assert!(result.unwrap_err().contains("必须小于检测间隔"));
    }

    #[test]
    fn test_policy_table_applies_overrides() {
        let mut config = create_test_config();
        config.probes.insert(
            "ws-agent".to_string(),
            ProbeOverride {
                success_threshold: Some(2),
                initial_delay_seconds: Some(30),
                ..Default::default()
            },
        );

        let table = config.policy_table().unwrap();
        let policy = table.policy(ServerKind::WsAgent);
        assert_eq!(policy.defaults.success_threshold, 2);
        assert_eq!(policy.defaults.initial_delay_seconds, 30);
        assert_eq!(policy.defaults.failure_threshold, 3);
        assert!(policy.terminal_on_failure);
    }

    #[test]
    fn test_enabled_probes_skips_disabled_servers() {
        let config = create_test_config();
        let probes = config.enabled_probes();

        assert_eq!(probes.len(), 1);
        let descriptor = &probes[&ProbeKey::new("ws-1", "wsagent")];
        assert_eq!(descriptor.kind, ServerKind::WsAgent);
    }

    #[test]
    fn test_default_values() {
        let global: GlobalConfig = toml::from_str("").unwrap();

        assert_eq!(global.log_level, "info");
        assert!(global.hot_reload);
        assert!(!global.json_logs);
    }
}
