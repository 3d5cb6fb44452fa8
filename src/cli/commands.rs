//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::{Config, ConfigLoader, ConfigManager, ConfigWatcher, TomlConfigLoader};
use crate::error::{ProbeFailure, Result};
use crate::probe::{
    HttpProbe, Probe, ProbeConfigFactory, ProbeEvent, ProbeKey, ProbeResult,
    ProbeScheduler, Scheduler, ServerDescriptor,
};
use crate::token::StaticTokenProvider;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// 配置热重载的防抖动延迟
const HOT_RELOAD_DEBOUNCE: Duration = Duration::from_millis(500);

/// 配置文件模板
pub const CONFIG_TEMPLATE: &str = include_str!("../../templates/config.toml");

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 根据子命令选择处理器
pub fn command_for(args: &Args) -> Box<dyn Command> {
    match &args.command {
        Commands::Run { .. } => Box::new(RunCommand),
        Commands::Check { .. } => Box::new(CheckCommand),
        Commands::Validate { .. } => Box::new(ValidateCommand),
        Commands::Init { .. } => Box::new(InitCommand),
        Commands::Version { .. } => Box::new(VersionCommand),
    }
}

/// 加载配置文件，文件不存在时给出初始化提示
async fn load_config(config_path: &Path) -> Result<Config> {
    if !config_path.exists() {
        return Err(anyhow::anyhow!(
            "配置文件不存在: {}\n提示：请运行 '{} init' 创建默认配置文件",
            config_path.display(),
            crate::APP_NAME
        )
        .into());
    }

    let loader = TomlConfigLoader::new(true);
    loader.load_from_file(config_path).await
}

/// 根据配置构建探针配置工厂
fn build_factory(
    config: &Config,
    token_provider: Arc<StaticTokenProvider>,
) -> Result<ProbeConfigFactory> {
    let policies = config
        .policy_table()
        .map_err(|e| anyhow::anyhow!("探测策略无效: {}", e))?;
    Ok(ProbeConfigFactory::new(token_provider, policies))
}

/// 版本命令
pub struct VersionCommand;

#[async_trait]
impl Command for VersionCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Version { format } = &args.command {
            match format {
                OutputFormat::Json => {
                    let version_info = serde_json::json!({
                        "name": crate::APP_NAME,
                        "version": crate::VERSION,
                        "description": crate::APP_DESCRIPTION
                    });
                    println!("{}", serde_json::to_string_pretty(&version_info)?);
                }
                _ => {
                    println!("{} v{}", crate::APP_NAME, crate::VERSION);
                    println!("{}", crate::APP_DESCRIPTION);
                }
            }
        }
        Ok(())
    }
}

/// 初始化命令
pub struct InitCommand;

#[async_trait]
impl Command for InitCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Init { config_path, force } = &args.command {
            self.create_config_file(config_path, *force).await
        } else {
            Ok(())
        }
    }
}

impl InitCommand {
    /// 创建配置文件
    async fn create_config_file(&self, config_path: &Path, force: bool) -> Result<()> {
        if config_path.exists() && !force {
            eprintln!("配置文件已存在: {}", config_path.display());
            eprintln!("使用 --force 参数覆盖现有文件");
            return Ok(());
        }

        if let Some(parent) = config_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(config_path, CONFIG_TEMPLATE).await?;

        println!("配置文件已创建: {}", config_path.display());
        println!("请编辑配置文件以添加您的工作区和服务器");

        Ok(())
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate { config_path } = &args.command {
            let config_file = config_path
                .clone()
                .unwrap_or_else(|| args.get_config_path());

            self.validate_config_file(&config_file, args.is_verbose())
                .await
        } else {
            Ok(())
        }
    }
}

impl ValidateCommand {
    /// 验证配置文件
    async fn validate_config_file(&self, config_path: &Path, verbose: bool) -> Result<()> {
        println!("验证配置文件: {}", config_path.display());

        let config = load_config(config_path).await?;
        let probes = config.enabled_probes();

        println!("✓ 配置文件验证通过");
        println!(
            "✓ 找到 {} 个工作区，{} 个启用的探针",
            config.workspaces.len(),
            probes.len()
        );

        if verbose {
            let policies = config
                .policy_table()
                .map_err(|e| anyhow::anyhow!("探测策略无效: {}", e))?;
            println!("探测策略:");
            for kind in crate::probe::ServerKind::ALL {
                let policy = policies.policy(kind);
                let defaults = policy.defaults;
                println!(
                    "  {:<12} 成功阈值={} 失败阈值={} 首次延迟={}s 间隔={}s 超时={}s 失败终止={}",
                    kind.as_str(),
                    defaults.success_threshold,
                    defaults.failure_threshold,
                    defaults.initial_delay_seconds,
                    defaults.period_seconds,
                    defaults.timeout_seconds,
                    if policy.terminal_on_failure { "是" } else { "否" }
                );
            }

            println!("探针:");
            for (key, server) in &probes {
                println!("  {} [{}] {}", key, server.kind, server.url);
            }
        }

        Ok(())
    }
}

/// 单个服务器的一次性探测报告
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub workspace_id: String,
    pub server_id: String,
    pub kind: String,
    pub url: String,
    pub success: bool,
    pub status_code: Option<u16>,
    pub response_time_ms: Option<u64>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl CheckReport {
    fn from_result(key: &ProbeKey, server: &ServerDescriptor, url: String, result: &ProbeResult) -> Self {
        Self {
            workspace_id: key.workspace_id.clone(),
            server_id: key.server_id.clone(),
            kind: server.kind.to_string(),
            url,
            success: result.outcome.is_success(),
            status_code: result.status_code,
            response_time_ms: Some(result.response_time_ms()),
            error: result.outcome.failure().map(ToString::to_string),
            timestamp: result.timestamp,
        }
    }

    fn from_build_error(key: &ProbeKey, server: &ServerDescriptor, error: String) -> Self {
        Self {
            workspace_id: key.workspace_id.clone(),
            server_id: key.server_id.clone(),
            kind: server.kind.to_string(),
            url: server.url.clone(),
            success: false,
            status_code: None,
            response_time_ms: None,
            error: Some(error),
            timestamp: Utc::now(),
        }
    }
}

/// 一次性探测命令
pub struct CheckCommand;

#[async_trait]
impl Command for CheckCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Check { workspace, format } = &args.command {
            let config = load_config(&args.get_config_path()).await?;
            let reports = self.check_all(&config, workspace.as_deref()).await?;

            if reports.is_empty() {
                match workspace {
                    Some(id) => eprintln!("工作区 '{id}' 中没有启用的服务器"),
                    None => eprintln!("未找到任何启用的服务器"),
                }
                return Ok(());
            }

            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
                OutputFormat::Table => print_table_reports(&reports),
                OutputFormat::Text => print_text_reports(&reports),
            }
        }
        Ok(())
    }
}

impl CheckCommand {
    /// 并发探测所有启用的服务器，每个服务器只检测一次
    pub async fn check_all(&self, config: &Config, workspace: Option<&str>) -> Result<Vec<CheckReport>> {
        let factory = build_factory(config, Arc::new(config.token_provider()))?;
        let probe = HttpProbe::new()?;

        let targets: Vec<(ProbeKey, ServerDescriptor)> = config
            .enabled_probes()
            .into_iter()
            .filter(|(key, _)| workspace.is_none_or(|id| key.workspace_id == id))
            .collect();

        let checks = targets.iter().map(|(key, server)| {
            let factory = &factory;
            let probe = &probe;
            async move {
                match factory.build(&key.workspace_id, server).await {
                    Ok(probe_config) => {
                        let result = match tokio::time::timeout(
                            probe_config.timeout(),
                            probe.check(&probe_config),
                        )
                        .await
                        {
                            Ok(result) => result,
                            Err(_) => ProbeResult::failure(ProbeFailure::Timeout, probe_config.timeout()),
                        };
                        CheckReport::from_result(key, server, probe_config.url(), &result)
                    }
                    Err(e) => CheckReport::from_build_error(key, server, e.to_string()),
                }
            }
        });

        Ok(futures::future::join_all(checks).await)
    }
}

/// 打印文本格式结果
fn print_text_reports(reports: &[CheckReport]) {
    for report in reports {
        let status_icon = if report.success { "✓" } else { "✗" };
        let response_time = report
            .response_time_ms
            .map(|ms| format!("{ms}ms"))
            .unwrap_or_else(|| "N/A".to_string());
        println!(
            "{} {}/{} [{}] ({}) - {}",
            status_icon, report.workspace_id, report.server_id, report.kind, report.url, response_time
        );
        if let Some(error) = &report.error {
            println!("  错误: {error}");
        }
    }
}

/// 打印表格格式结果
fn print_table_reports(reports: &[CheckReport]) {
    println!(
        "{:<16} {:<14} {:<11} {:<6} {:<8} {:<10} {:<30}",
        "工作区", "服务器", "类型", "状态", "状态码", "响应时间", "错误信息"
    );
    println!("{}", "-".repeat(100));

    for report in reports {
        let status = if report.success { "正常" } else { "异常" };
        let status_code = report
            .status_code
            .map(|c| c.to_string())
            .unwrap_or_else(|| "N/A".to_string());
        let response_time = report
            .response_time_ms
            .map(|ms| format!("{ms}ms"))
            .unwrap_or_else(|| "N/A".to_string());

        println!(
            "{:<16} {:<14} {:<11} {:<6} {:<8} {:<10} {:<30}",
            truncate_string(&report.workspace_id, 16),
            truncate_string(&report.server_id, 14),
            report.kind,
            status,
            status_code,
            response_time,
            report.error.as_deref().unwrap_or("")
        );
    }
}

/// 截断过长的字符串
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}

/// 持续探测命令
pub struct RunCommand;

#[async_trait]
impl Command for RunCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Run {
            format,
            no_hot_reload,
        } = &args.command
        {
            self.run(args, *format, !*no_hot_reload).await
        } else {
            Ok(())
        }
    }
}

impl RunCommand {
    /// 启动探针并运行到收到中断信号
    async fn run(&self, args: &Args, format: OutputFormat, hot_reload: bool) -> Result<()> {
        let config_path = args.get_config_path();
        let config = load_config(&config_path).await?;

        let token_provider = Arc::new(config.token_provider());
        let factory = Arc::new(build_factory(&config, Arc::clone(&token_provider))?);
        let probe: Arc<dyn Probe> = Arc::new(HttpProbe::new()?);
        let scheduler = Arc::new(ProbeScheduler::new(factory, probe));

        let printer = tokio::spawn(print_events(scheduler.subscribe(), format));

        let manager = Arc::new(ConfigManager::new(
            Arc::clone(&scheduler) as Arc<dyn Scheduler>,
            token_provider,
        ));
        let hot_reload = hot_reload && config.global.hot_reload;
        let summary = manager.update_config(config).await;
        info!(
            "探针已启动: {}个, 配置失败: {}个",
            summary.started, summary.failed
        );

        // 监控器需要存活到进程退出
        let _watcher = if hot_reload {
            Some(setup_config_hot_reload(&config_path, Arc::clone(&manager))?)
        } else {
            info!("配置热重载已禁用");
            None
        };

        tokio::signal::ctrl_c()
            .await
            .context("监听中断信号失败")?;
        info!("收到中断信号，正在停止探针...");

        let status = scheduler.get_status().await;
        scheduler.stop().await;
        printer.abort();

        info!(
            "已停止 {} 个探针（就绪 {}，未就绪 {}，未知 {}）",
            status.active_probes, status.ready, status.not_ready, status.unknown
        );
        Ok(())
    }
}

/// 设置配置热重载
fn setup_config_hot_reload(config_path: &Path, manager: Arc<ConfigManager>) -> Result<ConfigWatcher> {
    let (mut watcher, mut receiver) =
        ConfigWatcher::new(config_path, HOT_RELOAD_DEBOUNCE).context("创建配置监控器失败")?;
    watcher.start().context("启动配置监控失败")?;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(change_event) => {
                    info!("检测到配置变更，版本: {}", change_event.version);
                    manager.update_config(change_event.new_config).await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("配置变更事件积压，跳过 {} 个", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    Ok(watcher)
}

/// 输出探针事件
async fn print_events(mut events: broadcast::Receiver<ProbeEvent>, format: OutputFormat) {
    loop {
        match events.recv().await {
            Ok(event) => match format_event(&event, format) {
                Ok(line) => println!("{line}"),
                Err(e) => error!("事件序列化失败: {}", e),
            },
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("事件输出落后，丢弃 {} 个事件", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// 格式化单个事件
pub fn format_event(event: &ProbeEvent, format: OutputFormat) -> Result<String> {
    let timestamp = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    match format {
        OutputFormat::Json => {
            let mut value = serde_json::to_value(event)?;
            if let Some(object) = value.as_object_mut() {
                object.insert("timestamp".to_string(), serde_json::Value::String(timestamp));
            }
            Ok(serde_json::to_string(&value)?)
        }
        OutputFormat::Text | OutputFormat::Table => {
            let detail = match event {
                ProbeEvent::BecameReady { .. } => "就绪".to_string(),
                ProbeEvent::BecameNotReady { .. } => "未就绪".to_string(),
                ProbeEvent::ProbeTerminated { .. } => "存活探针失败，已停止探测".to_string(),
                ProbeEvent::ProbeConfigFailed { reason, .. } => reason.to_string(),
            };
            Ok(format!(
                "{} {}/{} {}",
                timestamp,
                event.workspace_id(),
                event.server_id(),
                detail
            ))
        }
    }
}
