//! 이벤트 모니터 루프
//!
//! 이벤트 정의 하나에 대해 서브프로세스를 실행하고, 출력 라인을 패턴과 비교해
//! 매칭된 패턴마다 카운터를 증가시킵니다.
//!
//! # 상태 전이
//! ```text
//! Starting ──시작 실패──────────────────────────▶ Stopped(StartFailed)
//!    │
//!    ▼
//! Streaming ──출력 종료 / 취소──▶ Draining ──▶ Stopped(Completed | Cancelled)
//! ```
//!
//! 현재 상태는 `watch` 채널로 공개되어 데몬이 루프를 건드리지 않고 헬스를 조회합니다.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use logtally_core::health::HealthStatus;
use logtally_core::metrics::{
    LABEL_EVENT, MONITOR_LINES_DROPPED_TOTAL, MONITOR_LINES_TOTAL, MONITOR_START_FAILURES_TOTAL,
    MONITORS_RUNNING,
};
use logtally_core::types::EventDefinition;

use crate::config::MonitorConfig;
use crate::matcher::PatternMatcher;
use crate::registry::EventCounter;
use crate::source::{ExitOutcome, LineSource};

/// 모니터가 멈춘 이유
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// 서브프로세스를 시작하지 못함
    StartFailed(String),
    /// 서브프로세스가 스스로 출력을 닫음
    Completed(ExitOutcome),
    /// 종료 요청으로 중단됨
    Cancelled(ExitOutcome),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StartFailed(reason) => write!(f, "start failed: {reason}"),
            Self::Completed(outcome) => write!(f, "completed ({outcome})"),
            Self::Cancelled(outcome) => write!(f, "cancelled ({outcome})"),
        }
    }
}

/// 모니터 루프 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorState {
    /// 서브프로세스 시작 중
    Starting,
    /// 출력 라인 처리 중
    Streaming,
    /// 서브프로세스 종료 대기 중
    Draining,
    /// 종료됨 (더 이상 전이 없음)
    Stopped(StopReason),
}

impl MonitorState {
    /// 종료 상태인지 확인합니다.
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped(_))
    }

    /// 상태를 헬스 상태로 변환합니다.
    ///
    /// 시작 실패와 비정상 종료 코드는 `Unhealthy`,
    /// 정상 완료나 종료 요청에 의한 중단은 `Degraded`입니다.
    pub fn health(&self) -> HealthStatus {
        match self {
            Self::Starting | Self::Streaming => HealthStatus::Healthy,
            Self::Draining => HealthStatus::Degraded("draining".to_owned()),
            Self::Stopped(StopReason::StartFailed(reason)) => {
                HealthStatus::Unhealthy(format!("start failed: {reason}"))
            }
            Self::Stopped(StopReason::Completed(outcome)) if !outcome.is_clean() => {
                HealthStatus::Unhealthy(format!("subprocess {outcome}"))
            }
            Self::Stopped(reason) => HealthStatus::Degraded(format!("stopped: {reason}")),
        }
    }
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Streaming => write!(f, "streaming"),
            Self::Draining => write!(f, "draining"),
            Self::Stopped(reason) => write!(f, "stopped: {reason}"),
        }
    }
}

/// 모니터 종료 보고
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorReport {
    /// 이벤트 이름
    pub event: String,
    /// 종료 사유
    pub reason: StopReason,
    /// 처리한 라인 수
    pub lines_read: u64,
    /// 카운터 증가 횟수 (라인 하나가 여러 번 기여할 수 있음)
    pub matches: u64,
}

/// 이벤트 하나를 감시하는 루프
///
/// 서브프로세스, 출력 리더, 취소 토큰은 이 루프가 단독으로 소유합니다.
pub struct EventMonitor {
    definition: Arc<EventDefinition>,
    matcher: PatternMatcher,
    counter: EventCounter,
    config: MonitorConfig,
    cancel: CancellationToken,
    state: watch::Sender<MonitorState>,
}

impl EventMonitor {
    /// 새 모니터를 생성합니다.
    pub fn new(
        definition: Arc<EventDefinition>,
        counter: EventCounter,
        config: MonitorConfig,
        cancel: CancellationToken,
    ) -> Self {
        let matcher = PatternMatcher::new(definition.patterns.clone());
        let (state, _) = watch::channel(MonitorState::Starting);
        Self {
            definition,
            matcher,
            counter,
            config,
            cancel,
            state,
        }
    }

    /// 상태 구독자를 생성합니다.
    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.state.subscribe()
    }

    /// 이벤트 이름
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// 루프를 실행하고 `Stopped`에 도달하면 보고를 반환합니다.
    pub async fn run(self) -> MonitorReport {
        let event = self.definition.name.clone();
        let command_line = self.definition.command_line();

        if self.config.verbose {
            info!(event = %event, command = %command_line, "launching monitor command");
        } else {
            debug!(event = %event, command = %command_line, "launching monitor command");
        }

        let mut source = match LineSource::start(
            &self.definition.command,
            self.cancel.clone(),
            self.config.source_options(),
        ) {
            Ok(source) => source,
            Err(e) => {
                error!(event = %event, error = %e, "monitor failed to start, staying down");
                metrics::counter!(MONITOR_START_FAILURES_TOTAL, LABEL_EVENT => event.clone())
                    .increment(1);
                return self.finish(event, StopReason::StartFailed(e.to_string()), 0, 0);
            }
        };

        self.set_state(MonitorState::Streaming);
        let running = RunningGuard::acquire();

        let lines_total = metrics::counter!(MONITOR_LINES_TOTAL, LABEL_EVENT => event.clone());
        let lines_dropped =
            metrics::counter!(MONITOR_LINES_DROPPED_TOTAL, LABEL_EVENT => event.clone());

        let mut lines_read = 0u64;
        let mut matches = 0u64;
        let mut dropped_seen = 0u64;

        while let Some(line) = source.next_line().await {
            lines_read += 1;
            lines_total.increment(1);

            let dropped = source.lines_dropped();
            if dropped > dropped_seen {
                lines_dropped.increment(dropped - dropped_seen);
                dropped_seen = dropped;
            }

            for pattern in self.matcher.matches(&line) {
                self.counter.increment(pattern);
                matches += 1;
                if self.config.verbose {
                    info!(event = %event, pattern, line = %line, "pattern matched");
                }
            }
        }

        let dropped = source.lines_dropped();
        if dropped > dropped_seen {
            lines_dropped.increment(dropped - dropped_seen);
        }

        self.set_state(MonitorState::Draining);
        let cancelled = self.cancel.is_cancelled();
        let outcome = source.stop().await;
        drop(running);

        let reason = if cancelled {
            debug!(event = %event, outcome = %outcome, "monitor cancelled");
            StopReason::Cancelled(outcome)
        } else {
            if outcome.is_clean() {
                info!(event = %event, outcome = %outcome, lines_read, "monitor command finished");
            } else {
                warn!(event = %event, outcome = %outcome, lines_read, "monitor command exited abnormally");
            }
            StopReason::Completed(outcome)
        };

        self.finish(event, reason, lines_read, matches)
    }

    fn set_state(&self, state: MonitorState) {
        // 구독자가 없어도 값은 갱신됨
        self.state.send_replace(state);
    }

    fn finish(
        &self,
        event: String,
        reason: StopReason,
        lines_read: u64,
        matches: u64,
    ) -> MonitorReport {
        self.set_state(MonitorState::Stopped(reason.clone()));
        MonitorReport {
            event,
            reason,
            lines_read,
            matches,
        }
    }
}

/// `logtally_monitors_running` 게이지를 올리고, 드롭될 때 (패닉 포함) 내립니다.
struct RunningGuard(metrics::Gauge);

impl RunningGuard {
    fn acquire() -> Self {
        Self::new(metrics::gauge!(MONITORS_RUNNING))
    }

    fn new(gauge: metrics::Gauge) -> Self {
        gauge.increment(1.0);
        Self(gauge)
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.decrement(1.0);
    }
}

impl fmt::Debug for EventMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventMonitor")
            .field("event", &self.definition.name)
            .field("state", &*self.state.borrow())
            .finish()
    }
}
