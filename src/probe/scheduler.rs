//! 探针调度器模块
//!
//! 为每个 (工作区, 服务器) 组合维护一个可取消的周期任务，
//! 串联 探测执行器 → 结果聚合器 → 事件订阅者

use crate::error::{ConfigBuildError, ProbeFailure};
use crate::logging::log_probe_event;
use crate::probe::aggregator::{ProbeResultAggregator, ProbeState, ProbeStatus};
use crate::probe::checker::Probe;
use crate::probe::config::{ProbeConfig, ServerDescriptor};
use crate::probe::event::{ConfigFailureReason, ProbeEvent};
use crate::probe::factory::ProbeConfigFactory;
use crate::probe::result::ProbeResult;
use async_trait::async_trait;
use serde::Serialize;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// 事件通道默认容量
const DEFAULT_EVENT_CAPACITY: usize = 256;

/// 探针注册表的键
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ProbeKey {
    pub workspace_id: String,
    pub server_id: String,
}

impl ProbeKey {
    pub fn new(workspace_id: &str, server_id: &str) -> Self {
        Self {
            workspace_id: workspace_id.to_string(),
            server_id: server_id.to_string(),
        }
    }
}

impl fmt::Display for ProbeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.workspace_id, self.server_id)
    }
}

/// 注册表中的一个活动探针
struct ScheduledProbe {
    /// 本次调度的唯一ID，用于识别被替换的旧任务
    id: Uuid,
    /// 探针配置
    config: Arc<ProbeConfig>,
    /// 结果聚合器（独占探针状态）
    aggregator: ProbeResultAggregator,
    /// 取消句柄，丢弃即通知任务退出
    cancel_handle: oneshot::Sender<()>,
}

impl ScheduledProbe {
    /// 取消周期任务
    fn cancel(self) {
        drop(self.cancel_handle);
    }
}

/// 探针注册表
///
/// `pending` 记录正在构建配置的 `start` 调用，`cancel` 会同时清除两者，
/// 构建完成时预留已不存在的 `start` 不会再调度任何任务。
#[derive(Default)]
struct Registry {
    probes: HashMap<ProbeKey, ScheduledProbe>,
    pending: HashMap<ProbeKey, Uuid>,
}

impl Registry {
    /// 移除一个组合的活动探针和预留
    fn remove(&mut self, key: &ProbeKey) -> Option<ScheduledProbe> {
        self.pending.remove(key);
        self.probes.remove(key)
    }

    /// 预留是否仍属于指定的 `start` 调用
    fn owns_reservation(&self, key: &ProbeKey, id: Uuid) -> bool {
        self.pending.get(key) == Some(&id)
    }
}

type ProbeRegistry = Arc<Mutex<Registry>>;

/// 调度器状态
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    /// 活动探针数量
    pub active_probes: usize,
    /// 涉及的工作区数量
    pub workspaces: usize,
    /// 处于各状态的探针数量
    pub unknown: usize,
    pub ready: usize,
    pub not_ready: usize,
}

/// 调度器trait，定义探针生命周期接口
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// 开始周期性探测
    ///
    /// 已存在的同名探针会先被取消；配置构建失败时发布 `ProbeConfigFailed`
    /// 事件并返回错误，不会调度任何检测。
    ///
    /// # 参数
    /// * `workspace_id` - 工作区ID
    /// * `server` - 服务器描述
    ///
    /// # 返回
    /// * `Result<(), ConfigBuildError>` - 启动结果
    async fn start(&self, workspace_id: &str, server: ServerDescriptor) -> Result<(), ConfigBuildError>;

    /// 停止并移除单个探针
    ///
    /// 正在构建配置的 `start` 也会被撤销，不再调度任何检测。
    ///
    /// # 返回
    /// * `bool` - 探针是否存在（含正在启动的）
    async fn cancel(&self, workspace_id: &str, server_id: &str) -> bool;

    /// 停止工作区的所有探针（工作区停止时使用）
    ///
    /// # 返回
    /// * `usize` - 被取消的探针数量（含正在启动的）
    async fn cancel_all(&self, workspace_id: &str) -> usize;

    /// 停止所有探针
    async fn stop(&self);

    /// 获取调度器状态
    async fn get_status(&self) -> SchedulerStatus;
}

/// 探针调度器实现
pub struct ProbeScheduler {
    /// 探针配置工厂
    factory: Arc<ProbeConfigFactory>,
    /// 探测执行器
    probe: Arc<dyn Probe>,
    /// 活动探针注册表
    registry: ProbeRegistry,
    /// 事件发送器
    events: broadcast::Sender<ProbeEvent>,
}

impl ProbeScheduler {
    /// 创建新的探针调度器
    ///
    /// # 参数
    /// * `factory` - 探针配置工厂
    /// * `probe` - 探测执行器
    pub fn new(factory: Arc<ProbeConfigFactory>, probe: Arc<dyn Probe>) -> Self {
        Self::with_event_capacity(factory, probe, DEFAULT_EVENT_CAPACITY)
    }

    /// 指定事件通道容量创建调度器
    pub fn with_event_capacity(
        factory: Arc<ProbeConfigFactory>,
        probe: Arc<dyn Probe>,
        capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            factory,
            probe,
            registry: Arc::new(Mutex::new(Registry::default())),
            events,
        }
    }

    /// 订阅探针事件
    pub fn subscribe(&self) -> broadcast::Receiver<ProbeEvent> {
        self.events.subscribe()
    }

    /// 查询探针当前状态
    pub async fn status(&self, workspace_id: &str, server_id: &str) -> Option<ProbeStatus> {
        let registry = self.registry.lock().await;
        registry
            .probes
            .get(&ProbeKey::new(workspace_id, server_id))
            .map(|probe| probe.aggregator.status())
    }

    /// 查询探针计数器快照
    pub async fn state(&self, workspace_id: &str, server_id: &str) -> Option<ProbeState> {
        let registry = self.registry.lock().await;
        registry
            .probes
            .get(&ProbeKey::new(workspace_id, server_id))
            .map(|probe| probe.aggregator.state().clone())
    }

    /// 查询探针配置
    pub async fn probe_config(&self, workspace_id: &str, server_id: &str) -> Option<Arc<ProbeConfig>> {
        let registry = self.registry.lock().await;
        registry
            .probes
            .get(&ProbeKey::new(workspace_id, server_id))
            .map(|probe| Arc::clone(&probe.config))
    }

    /// 列出所有活动探针
    pub async fn active_probes(&self) -> Vec<ProbeKey> {
        let registry = self.registry.lock().await;
        let mut keys: Vec<ProbeKey> = registry.probes.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl Scheduler for ProbeScheduler {
    async fn start(&self, workspace_id: &str, server: ServerDescriptor) -> Result<(), ConfigBuildError> {
        let key = ProbeKey::new(workspace_id, &server.id);
        let id = Uuid::new_v4();

        // 预留组合后再构建配置，构建期间的 cancel 会撤销预留
        {
            let mut registry = self.registry.lock().await;
            if let Some(previous) = registry.remove(&key) {
                previous.cancel();
                info!("停止探针: {}", key);
            }
            registry.pending.insert(key.clone(), id);
        }

        let policy = self.factory.policy(server.kind);
        let built = self.factory.build(workspace_id, &server).await;

        let mut registry = self.registry.lock().await;
        if !registry.owns_reservation(&key, id) {
            debug!("探针在配置构建期间被取消或替换: {}", key);
            return built.map(|_| ());
        }
        registry.pending.remove(&key);

        let config = match built {
            Ok(config) => Arc::new(config),
            Err(e) => {
                drop(registry);
                warn!("构建探针配置失败 {}: {}", key, e);
                publish(
                    &self.events,
                    ProbeEvent::config_failed(
                        workspace_id,
                        &server.id,
                        ConfigFailureReason::Build(e.to_string()),
                    ),
                );
                return Err(e);
            }
        };

        let (cancel_handle, cancel_rx) = oneshot::channel();
        let scheduled = ScheduledProbe {
            id,
            config: Arc::clone(&config),
            aggregator: ProbeResultAggregator::for_config(&config, policy.terminal_on_failure),
            cancel_handle,
        };
        registry.probes.insert(key.clone(), scheduled);
        drop(registry);

        info!(
            "启动探针: {} ({}, {}), 首次延迟{}秒, 间隔{}秒, 超时{}秒",
            key,
            server.kind,
            config.url(),
            config.initial_delay_seconds(),
            config.period_seconds(),
            config.timeout_seconds()
        );

        let task = ProbeTask {
            key: key.clone(),
            id,
            config,
            probe: Arc::clone(&self.probe),
            registry: Arc::clone(&self.registry),
            events: self.events.clone(),
        };
        let handle = tokio::spawn(task.run(cancel_rx));
        tokio::spawn(supervise(
            handle,
            key,
            id,
            Arc::clone(&self.registry),
            self.events.clone(),
        ));

        Ok(())
    }

    async fn cancel(&self, workspace_id: &str, server_id: &str) -> bool {
        let key = ProbeKey::new(workspace_id, server_id);
        let (removed, was_pending) = {
            let mut registry = self.registry.lock().await;
            let was_pending = registry.pending.contains_key(&key);
            (registry.remove(&key), was_pending)
        };
        match removed {
            Some(probe) => {
                probe.cancel();
                info!("停止探针: {}", key);
                true
            }
            None => was_pending,
        }
    }

    async fn cancel_all(&self, workspace_id: &str) -> usize {
        let (removed, pending): (Vec<(ProbeKey, ScheduledProbe)>, usize) = {
            let mut registry = self.registry.lock().await;
            let before = registry.pending.len();
            registry.pending.retain(|key, _| key.workspace_id != workspace_id);
            let pending = before - registry.pending.len();

            let keys: Vec<ProbeKey> = registry
                .probes
                .keys()
                .filter(|key| key.workspace_id == workspace_id)
                .cloned()
                .collect();
            let removed = keys
                .into_iter()
                .filter_map(|key| registry.probes.remove(&key).map(|probe| (key, probe)))
                .collect();
            (removed, pending)
        };

        let count = removed.len() + pending;
        for (key, probe) in removed {
            probe.cancel();
            debug!("停止探针: {}", key);
        }
        info!("停止工作区 {} 的所有探针，数量: {}", workspace_id, count);
        count
    }

    async fn stop(&self) {
        info!("停止探针调度器");
        let mut registry = self.registry.lock().await;
        registry.pending.clear();
        for (key, probe) in registry.probes.drain() {
            probe.cancel();
            debug!("停止探针: {}", key);
        }
        info!("探针调度器已停止");
    }

    async fn get_status(&self) -> SchedulerStatus {
        let registry = self.registry.lock().await;
        let mut status = SchedulerStatus {
            active_probes: registry.probes.len(),
            ..Default::default()
        };

        let mut workspaces: Vec<&str> = registry.probes.keys().map(|key| key.workspace_id.as_str()).collect();
        workspaces.sort_unstable();
        workspaces.dedup();
        status.workspaces = workspaces.len();

        for probe in registry.probes.values() {
            match probe.aggregator.status() {
                ProbeStatus::Unknown => status.unknown += 1,
                ProbeStatus::Ready => status.ready += 1,
                ProbeStatus::NotReady => status.not_ready += 1,
                // 终止的探针会立即从注册表移除
                ProbeStatus::Terminated => {}
            }
        }
        status
    }
}

impl Drop for ProbeScheduler {
    fn drop(&mut self) {
        // 丢弃所有取消句柄，任务在下一次等待时退出
        if let Ok(mut registry) = self.registry.try_lock() {
            registry.pending.clear();
            registry.probes.clear();
        }
    }
}

/// 单个探针的周期任务
struct ProbeTask {
    key: ProbeKey,
    id: Uuid,
    config: Arc<ProbeConfig>,
    probe: Arc<dyn Probe>,
    registry: ProbeRegistry,
    events: broadcast::Sender<ProbeEvent>,
}

impl ProbeTask {
    /// 运行检测循环
    ///
    /// 同一探针的检测严格串行；检测耗时超过间隔时跳过错过的tick，不排队。
    async fn run(self, mut cancel_rx: oneshot::Receiver<()>) {
        let first_tick = Instant::now() + self.config.initial_delay();
        let mut ticker = interval_at(first_tick, self.config.period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        debug!("探针任务已启动: {}", self.key);

        loop {
            let scheduled = tokio::select! {
                biased;
                _ = &mut cancel_rx => {
                    debug!("探针任务已取消: {}", self.key);
                    break;
                }
                scheduled = ticker.tick() => scheduled,
            };

            let result = self.check_once().await;
            if !self.apply(result).await {
                break;
            }

            // 错过的tick不补跑
            if let Some(next) = next_aligned_tick(scheduled, Instant::now(), self.config.period()) {
                debug!("检测耗时超过间隔，跳过错过的tick: {}", self.key);
                ticker.reset_at(next);
            }
        }
    }

    /// 执行一次带截止时间的检测
    async fn check_once(&self) -> ProbeResult {
        debug!("开始探测: {} -> {}", self.key, self.config.url());
        let started = std::time::Instant::now();

        match timeout(self.config.timeout(), self.probe.check(&self.config)).await {
            Ok(result) => result,
            Err(_) => ProbeResult::failure(ProbeFailure::Timeout, started.elapsed()),
        }
    }

    /// 将结果交给聚合器
    ///
    /// # 返回
    /// * `bool` - 是否继续探测
    async fn apply(&self, result: ProbeResult) -> bool {
        let mut registry = self.registry.lock().await;

        let entry = match registry.probes.get_mut(&self.key) {
            Some(entry) if entry.id == self.id => entry,
            _ => {
                debug!("探针已取消，丢弃本次结果: {}", self.key);
                return false;
            }
        };

        match result.outcome.failure() {
            Some(reason) => debug!(
                "探测失败: {}, {} ({}ms)",
                self.key,
                reason,
                result.response_time_ms()
            ),
            None => debug!("探测成功: {} ({}ms)", self.key, result.response_time_ms()),
        }

        let transitions = entry.aggregator.apply(&result.outcome);
        let terminated = entry.aggregator.is_terminated();

        for transition in transitions {
            publish(
                &self.events,
                ProbeEvent::from_transition(&self.key.workspace_id, &self.key.server_id, transition),
            );
        }

        if terminated {
            if let Some(probe) = registry.remove(&self.key) {
                probe.cancel();
            }
            return false;
        }
        true
    }
}

/// 计算一次超时的检测之后下一个未错过的tick
///
/// 检测（含结果应用）在一个间隔内完成时返回 `None`。
fn next_aligned_tick(scheduled: Instant, now: Instant, period: Duration) -> Option<Instant> {
    let elapsed = now.saturating_duration_since(scheduled);
    if elapsed < period {
        return None;
    }
    let offset = u64::try_from(elapsed.as_nanos() % period.as_nanos()).ok()?;
    Some(now + (period - Duration::from_nanos(offset)))
}

/// 监督探针任务，任务panic视为内部故障
async fn supervise(
    handle: JoinHandle<()>,
    key: ProbeKey,
    id: Uuid,
    registry: ProbeRegistry,
    events: broadcast::Sender<ProbeEvent>,
) {
    let join_error = match handle.await {
        Ok(()) => return,
        Err(e) => e,
    };

    if !join_error.is_panic() {
        debug!("探针任务被中止: {}", key);
        return;
    }
    let message = panic_message(join_error.into_panic());

    let removed = {
        let mut registry = registry.lock().await;
        let still_owned = registry.probes.get(&key).is_some_and(|probe| probe.id == id);
        if still_owned {
            registry.remove(&key)
        } else {
            None
        }
    };

    // 已经被取消的探针不再上报
    if let Some(probe) = removed {
        probe.cancel();
        error!("探针任务异常退出 {}: {}", key, message);
        publish(
            &events,
            ProbeEvent::config_failed(
                &key.workspace_id,
                &key.server_id,
                ConfigFailureReason::InternalFault(message),
            ),
        );
    }
}

/// 提取panic信息
fn panic_message(payload: Box<dyn Any + Send + 'static>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// 记录并发布事件
fn publish(events: &broadcast::Sender<ProbeEvent>, event: ProbeEvent) {
    log_probe_event(&event);
    if events.send(event).is_err() {
        debug!("没有事件订阅者，事件已丢弃");
    }
}
