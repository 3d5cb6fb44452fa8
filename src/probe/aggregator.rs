//! 探测结果聚合器
//!
//! 按连续成功/失败次数和阈值推进探针状态，只有跨越阈值时才产生状态转换。
//!
//! 状态机：
//! - `Unknown`（初始）→ `Ready` / `NotReady`（带滞后）→ `Terminated`（终态）
//! - 成功与失败计数互斥：一次成功清零失败计数，一次失败清零成功计数
//! - `Terminated` 之后所有结果都被忽略

use crate::error::ConfigBuildError;
use crate::probe::config::ProbeConfig;
use crate::probe::result::ProbeOutcome;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 探针对外声明的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProbeStatus {
    /// 尚未跨越任何阈值
    #[default]
    Unknown,
    /// 已就绪
    Ready,
    /// 未就绪
    NotReady,
    /// 已终止，不再探测
    Terminated,
}

impl fmt::Display for ProbeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStatus::Unknown => write!(f, "未知"),
            ProbeStatus::Ready => write!(f, "就绪"),
            ProbeStatus::NotReady => write!(f, "未就绪"),
            ProbeStatus::Terminated => write!(f, "已终止"),
        }
    }
}

/// 探针运行状态
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeState {
    /// 连续成功次数
    pub consecutive_successes: u32,
    /// 连续失败次数
    pub consecutive_failures: u32,
    /// 当前状态
    pub current: ProbeStatus,
}

/// 可观察的状态转换
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    BecameReady,
    BecameNotReady,
    Terminated,
}

/// 探测结果聚合器，独占一个探针的 [`ProbeState`]
#[derive(Debug, Clone)]
pub struct ProbeResultAggregator {
    success_threshold: u32,
    failure_threshold: u32,
    terminal_on_failure: bool,
    state: ProbeState,
}

impl ProbeResultAggregator {
    /// 创建新的聚合器
    ///
    /// # 参数
    /// * `success_threshold` - 判定就绪所需的连续成功次数（>=1）
    /// * `failure_threshold` - 判定未就绪所需的连续失败次数（>=1）
    /// * `terminal_on_failure` - 达到失败阈值后是否终止
    ///
    /// # 返回
    /// * `Result<Self, ConfigBuildError>` - 阈值为0时返回错误
    pub fn new(
        success_threshold: u32,
        failure_threshold: u32,
        terminal_on_failure: bool,
    ) -> Result<Self, ConfigBuildError> {
        if success_threshold == 0 || failure_threshold == 0 {
            return Err(ConfigBuildError::Invalid(format!(
                "阈值必须大于等于1: success={success_threshold}, failure={failure_threshold}"
            )));
        }
        Ok(Self::with_thresholds(
            success_threshold,
            failure_threshold,
            terminal_on_failure,
        ))
    }

    /// 根据探针配置创建聚合器，配置的阈值已经过校验
    pub fn for_config(config: &ProbeConfig, terminal_on_failure: bool) -> Self {
        Self::with_thresholds(
            config.success_threshold(),
            config.failure_threshold(),
            terminal_on_failure,
        )
    }

    fn with_thresholds(success_threshold: u32, failure_threshold: u32, terminal_on_failure: bool) -> Self {
        Self {
            success_threshold,
            failure_threshold,
            terminal_on_failure,
            state: ProbeState::default(),
        }
    }

    pub fn state(&self) -> &ProbeState {
        &self.state
    }

    pub fn status(&self) -> ProbeStatus {
        self.state.current
    }

    pub fn is_terminated(&self) -> bool {
        self.state.current == ProbeStatus::Terminated
    }

    /// 应用一次探测结果
    ///
    /// # 参数
    /// * `outcome` - 探测结果
    ///
    /// # 返回
    /// * `Vec<Transition>` - 本次产生的状态转换，未跨越阈值时为空
    pub fn apply(&mut self, outcome: &ProbeOutcome) -> Vec<Transition> {
        if self.is_terminated() {
            return Vec::new();
        }

        let mut transitions = Vec::new();
        match outcome {
            ProbeOutcome::Success => {
                self.state.consecutive_successes = self.state.consecutive_successes.saturating_add(1);
                self.state.consecutive_failures = 0;

                if self.state.consecutive_successes == self.success_threshold
                    && self.state.current != ProbeStatus::Ready
                {
                    self.state.current = ProbeStatus::Ready;
                    transitions.push(Transition::BecameReady);
                }
            }
            ProbeOutcome::Failure(_) => {
                self.state.consecutive_failures = self.state.consecutive_failures.saturating_add(1);
                self.state.consecutive_successes = 0;

                if self.state.consecutive_failures == self.failure_threshold {
                    if self.state.current != ProbeStatus::NotReady {
                        self.state.current = ProbeStatus::NotReady;
                        transitions.push(Transition::BecameNotReady);
                    }
                    if self.terminal_on_failure {
                        self.state.current = ProbeStatus::Terminated;
                        transitions.push(Transition::Terminated);
                    }
                }
            }
        }
        transitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeFailure;

    const S: ProbeOutcome = ProbeOutcome::Success;

    fn f() -> ProbeOutcome {
        ProbeOutcome::Failure(ProbeFailure::Timeout)
    }

    fn feed(aggregator: &mut ProbeResultAggregator, outcomes: &[ProbeOutcome]) -> Vec<Transition> {
        outcomes
            .iter()
            .flat_map(|outcome| aggregator.apply(outcome))
            .collect()
    }

    #[test]
    fn test_initial_state() {
        let aggregator = ProbeResultAggregator::new(3, 3, false).unwrap();
        assert_eq!(aggregator.state(), &ProbeState::default());
        assert_eq!(aggregator.status(), ProbeStatus::Unknown);
    }

    #[test]
    fn test_zero_threshold_is_rejected() {
        assert!(matches!(
            ProbeResultAggregator::new(0, 3, false),
            Err(ConfigBuildError::Invalid(_))
        ));
        assert!(matches!(
            ProbeResultAggregator::new(1, 0, true),
            Err(ConfigBuildError::Invalid(_))
        ));
    }

    #[test]
    fn test_exact_success_threshold_triggers_ready() {
        // 场景A: [S,S,S]
        let mut aggregator = ProbeResultAggregator::new(3, 3, false).unwrap();

        assert!(aggregator.apply(&S).is_empty());
        assert!(aggregator.apply(&S).is_empty());
        assert_eq!(aggregator.apply(&S), vec![Transition::BecameReady]);
        assert_eq!(aggregator.status(), ProbeStatus::Ready);

        // 继续成功不会重复产生事件
        assert!(aggregator.apply(&S).is_empty());
        assert_eq!(aggregator.state().consecutive_successes, 4);
    }

    #[test]
    fn test_failure_resets_success_counter() {
        // 场景B: [S,S,F,S,S,S]
        let mut aggregator = ProbeResultAggregator::new(3, 3, false).unwrap();

        assert!(feed(&mut aggregator, &[S, S]).is_empty());
        assert!(aggregator.apply(&f()).is_empty());
        assert_eq!(aggregator.state().consecutive_successes, 0);
        assert_eq!(aggregator.state().consecutive_failures, 1);

        assert!(feed(&mut aggregator, &[S, S]).is_empty());
        assert_eq!(aggregator.apply(&S), vec![Transition::BecameReady]);
        assert_eq!(aggregator.state().consecutive_failures, 0);
    }

    #[test]
    fn test_exact_failure_threshold_triggers_not_ready() {
        let mut aggregator = ProbeResultAggregator::new(2, 2, false).unwrap();

        assert!(aggregator.apply(&f()).is_empty());
        assert!(aggregator.apply(&S).is_empty());
        assert_eq!(aggregator.state().consecutive_failures, 0);

        assert!(aggregator.apply(&f()).is_empty());
        assert_eq!(aggregator.apply(&f()), vec![Transition::BecameNotReady]);
        assert_eq!(aggregator.status(), ProbeStatus::NotReady);

        assert!(aggregator.apply(&f()).is_empty());
    }

    #[test]
    fn test_reentering_ready_emits_again() {
        let mut aggregator = ProbeResultAggregator::new(1, 1, false).unwrap();

        assert_eq!(aggregator.apply(&S), vec![Transition::BecameReady]);
        assert_eq!(aggregator.apply(&f()), vec![Transition::BecameNotReady]);
        assert_eq!(aggregator.apply(&S), vec![Transition::BecameReady]);
        assert_eq!(aggregator.status(), ProbeStatus::Ready);
    }

    #[test]
    fn test_ready_dip_below_failure_threshold_keeps_ready() {
        let mut aggregator = ProbeResultAggregator::new(2, 3, false).unwrap();

        let transitions = feed(&mut aggregator, &[S, S, f(), f(), S, S]);

        assert_eq!(transitions, vec![Transition::BecameReady]);
        assert_eq!(aggregator.status(), ProbeStatus::Ready);
    }

    #[test]
    fn test_terminal_policy_terminates() {
        let mut aggregator = ProbeResultAggregator::new(1, 2, true).unwrap();

        assert_eq!(aggregator.apply(&S), vec![Transition::BecameReady]);
        assert!(aggregator.apply(&f()).is_empty());
        assert_eq!(
            aggregator.apply(&f()),
            vec![Transition::BecameNotReady, Transition::Terminated]
        );
        assert!(aggregator.is_terminated());
    }

    #[test]
    fn test_terminated_is_absorbing() {
        let mut aggregator = ProbeResultAggregator::new(1, 1, true).unwrap();
        aggregator.apply(&f());
        let frozen = aggregator.state().clone();

        assert!(feed(&mut aggregator, &[S, S, f(), S]).is_empty());
        assert_eq!(aggregator.state(), &frozen);
        assert_eq!(aggregator.status(), ProbeStatus::Terminated);
    }

    #[test]
    fn test_counters_are_mutually_exclusive() {
        let mut aggregator = ProbeResultAggregator::new(5, 5, false).unwrap();

        for outcome in [S, f(), f(), S, S, f(), S] {
            aggregator.apply(&outcome);
            let state = aggregator.state();
            assert!(state.consecutive_successes == 0 || state.consecutive_failures == 0);
        }
    }

    #[test]
    fn test_thresholds_for_all_values() {
        for threshold in 1..=6u32 {
            let mut aggregator = ProbeResultAggregator::new(threshold, threshold, false).unwrap();
            let successes = vec![S; (threshold - 1) as usize];
            assert!(feed(&mut aggregator, &successes).is_empty());
            assert_eq!(aggregator.apply(&S), vec![Transition::BecameReady]);

            let mut aggregator = ProbeResultAggregator::new(threshold, threshold, false).unwrap();
            let failures: Vec<_> = (1..threshold).map(|_| f()).collect();
            assert!(feed(&mut aggregator, &failures).is_empty());
            assert_eq!(aggregator.apply(&f()), vec![Transition::BecameNotReady]);
        }
    }
}
