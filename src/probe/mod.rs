//! 探测引擎模块
//!
//! 提供探针配置构建、HTTP探测、结果聚合和周期调度功能

pub mod aggregator;
pub mod checker;
pub mod config;
pub mod event;
pub mod factory;
pub mod policy;
pub mod result;
pub mod scheduler;

// 重新导出主要类型
pub use aggregator::{ProbeResultAggregator, ProbeState, ProbeStatus, Transition};
pub use checker::{HttpProbe, Probe};
pub use config::{ProbeConfig, ProbeTarget, Scheme, ServerDescriptor};
pub use event::{ConfigFailureReason, ProbeEvent};
pub use factory::ProbeConfigFactory;
pub use policy::{PolicyTable, ProbeDefaults, MAX_SCHEDULE_SECONDS, ProbeMethod, ProbePolicy, ServerKind};
pub use result::{ProbeOutcome, ProbeResult};
pub use scheduler::{ProbeKey, ProbeScheduler, Scheduler, SchedulerStatus};
