//! 配置管理器模块
//!
//! 计算新旧配置的差异并将其应用到探针调度器

use crate::config::types::Config;
use crate::probe::config::ServerDescriptor;
use crate::probe::scheduler::{ProbeKey, Scheduler};
use crate::token::StaticTokenProvider;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// 配置差异类型
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigDiff {
    /// 新增探针
    ProbeAdded {
        key: ProbeKey,
        server: ServerDescriptor,
    },
    /// 移除探针（服务器删除或被禁用）
    ProbeRemoved(ProbeKey),
    /// 探针需要重建（服务器描述或工作区凭证变更）
    ProbeModified {
        key: ProbeKey,
        server: ServerDescriptor,
    },
    /// 全局配置修改
    GlobalConfigModified,
    /// 探测策略修改，需要重启进程才能生效
    PoliciesModified,
}

/// 一次配置应用的结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplySummary {
    /// 新启动或重启的探针数量
    pub started: usize,
    /// 停止的探针数量
    pub cancelled: usize,
    /// 配置构建失败的探针数量
    pub failed: usize,
}

/// 计算配置差异
///
/// 只比较启用的 (工作区, 服务器) 组合；工作区凭证变化时，该工作区的所有探针都视为修改。
pub fn calculate_config_diff(old_config: &Config, new_config: &Config) -> Vec<ConfigDiff> {
    let mut diffs = Vec::new();

    if old_config.global != new_config.global {
        diffs.push(ConfigDiff::GlobalConfigModified);
    }
    if old_config.probes != new_config.probes {
        diffs.push(ConfigDiff::PoliciesModified);
    }

    let changed_tokens: BTreeSet<&str> = old_config
        .tokens
        .keys()
        .chain(new_config.tokens.keys())
        .filter(|id| old_config.tokens.get(*id) != new_config.tokens.get(*id))
        .map(String::as_str)
        .collect();

    let old_probes = old_config.enabled_probes();
    let new_probes = new_config.enabled_probes();

    for (key, server) in &new_probes {
        match old_probes.get(key) {
            None => diffs.push(ConfigDiff::ProbeAdded {
                key: key.clone(),
                server: server.clone(),
            }),
            Some(old_server)
                if old_server != server
                    || changed_tokens.contains(key.workspace_id.as_str()) =>
            {
                diffs.push(ConfigDiff::ProbeModified {
                    key: key.clone(),
                    server: server.clone(),
                })
            }
            Some(_) => {}
        }
    }

    for key in old_probes.keys() {
        if !new_probes.contains_key(key) {
            diffs.push(ConfigDiff::ProbeRemoved(key.clone()));
        }
    }

    diffs
}

/// 检查是否需要重启进程
pub fn requires_restart(diffs: &[ConfigDiff]) -> bool {
    diffs
        .iter()
        .any(|diff| matches!(diff, ConfigDiff::PoliciesModified))
}

/// 将配置差异应用到调度器
///
/// 先停止移除的探针，再（重新）启动新增和修改的探针。
pub async fn apply_config_diff<S>(scheduler: &S, diffs: &[ConfigDiff]) -> ApplySummary
where
    S: Scheduler + ?Sized,
{
    let mut summary = ApplySummary::default();

    for diff in diffs {
        if let ConfigDiff::ProbeRemoved(key) = diff {
            if scheduler.cancel(&key.workspace_id, &key.server_id).await {
                summary.cancelled += 1;
            }
        }
    }

    for diff in diffs {
        let (key, server) = match diff {
            ConfigDiff::ProbeAdded { key, server } | ConfigDiff::ProbeModified { key, server } => {
                (key, server)
            }
            _ => continue,
        };
        // start 会先取消同名的旧探针
        match scheduler.start(&key.workspace_id, server.clone()).await {
            Ok(()) => summary.started += 1,
            Err(e) => {
                debug!("探针 {} 启动失败: {}", key, e);
                summary.failed += 1;
            }
        }
    }

    summary
}

/// 配置管理器
///
/// 持有当前生效的配置，负责把新配置同步到调度器和凭证提供者。
pub struct ConfigManager {
    /// 当前配置
    current_config: RwLock<Config>,
    /// 探针调度器
    scheduler: Arc<dyn Scheduler>,
    /// 凭证提供者
    token_provider: Arc<StaticTokenProvider>,
}

impl ConfigManager {
    /// 创建新的配置管理器
    ///
    /// # 参数
    /// * `scheduler` - 探针调度器
    /// * `token_provider` - 探针配置工厂使用的凭证提供者
    pub fn new(scheduler: Arc<dyn Scheduler>, token_provider: Arc<StaticTokenProvider>) -> Self {
        Self {
            current_config: RwLock::new(Config::default()),
            scheduler,
            token_provider,
        }
    }

    /// 应用新配置
    ///
    /// 首次调用会启动配置中的所有探针。
    pub async fn update_config(&self, new_config: Config) -> ApplySummary {
        let mut current = self.current_config.write().await;
        let diffs = calculate_config_diff(&current, &new_config);

        if diffs.is_empty() {
            debug!("配置无实质性变更，跳过更新");
            return ApplySummary::default();
        }
        if requires_restart(&diffs) {
            warn!("探测策略已修改，需要重启进程才能生效");
        }

        self.token_provider.replace_tokens(new_config.tokens.clone());
        let summary = apply_config_diff(self.scheduler.as_ref(), &diffs).await;
        *current = new_config;

        info!(
            "配置更新完成: 启动{}个, 停止{}个, 失败{}个",
            summary.started, summary.cancelled, summary.failed
        );
        summary
    }

    /// 获取当前配置
    pub async fn get_config(&self) -> Config {
        self.current_config.read().await.clone()
    }
}
