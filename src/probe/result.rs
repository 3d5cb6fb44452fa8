//! 探测结果数据结构

use crate::error::ProbeFailure;
use chrono::{DateTime, Utc};
use std::time::Duration;
use uuid::Uuid;

/// 单次探测的二元结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// 探测成功（HTTP 200-399）
    Success,
    /// 探测失败
    Failure(ProbeFailure),
}

impl ProbeOutcome {
    /// 判断是否成功
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success)
    }

    /// 失败原因（如果有）
    pub fn failure(&self) -> Option<&ProbeFailure> {
        match self {
            ProbeOutcome::Success => None,
            ProbeOutcome::Failure(reason) => Some(reason),
        }
    }
}

/// 单次探测结果
#[derive(Debug, Clone)]
pub struct ProbeResult {
    /// 检测ID
    pub id: Uuid,
    /// 探测结果
    pub outcome: ProbeOutcome,
    /// HTTP状态码（如果收到了响应）
    pub status_code: Option<u16>,
    /// 响应时间
    pub response_time: Duration,
    /// 检测时间戳
    pub timestamp: DateTime<Utc>,
}

impl ProbeResult {
    /// 创建新的探测结果
    pub fn new(outcome: ProbeOutcome, response_time: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            outcome,
            status_code: None,
            response_time,
            timestamp: Utc::now(),
        }
    }

    /// 创建成功结果
    pub fn success(response_time: Duration) -> Self {
        Self::new(ProbeOutcome::Success, response_time)
    }

    /// 创建失败结果
    pub fn failure(reason: ProbeFailure, response_time: Duration) -> Self {
        Self::new(ProbeOutcome::Failure(reason), response_time)
    }

    /// 设置HTTP状态码
    pub fn with_status_code(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    /// 获取响应时间（毫秒）
    pub fn response_time_ms(&self) -> u64 {
        self.response_time.as_millis() as u64
    }
}
