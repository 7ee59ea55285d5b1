//! 모니터 감독자 -- 이벤트별 루프 생성, 완료 추적, 종료 전파
//!
//! [`Supervisor`]는 모든 카운터를 먼저 등록한 뒤 이벤트마다 하나의 태스크를 띄웁니다.
//! 각 루프는 감독자 토큰의 자식 토큰을 받으므로, 감독자를 취소하면
//! 모든 루프가 함께 취소됩니다.
//!
//! # 사용 예시
//! ```ignore
//! let mut supervisor = Supervisor::new(registry, MonitorConfig::default());
//! supervisor.spawn_all(&config.events)?;
//! let board = supervisor.status_board();
//! let reports = supervisor.wait(shutdown_signal()).await;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::{Id, JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use logtally_core::types::EventDefinition;

use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::monitor::{EventMonitor, MonitorReport, MonitorState};
use crate::registry::CounterRegistry;

/// 이벤트 이름과 상태 구독자 목록
pub type StatusBoard = Vec<(String, watch::Receiver<MonitorState>)>;

/// 이벤트 모니터 감독자
pub struct Supervisor {
    registry: Arc<CounterRegistry>,
    config: MonitorConfig,
    cancel: CancellationToken,
    tasks: JoinSet<MonitorReport>,
    task_events: HashMap<Id, String>,
    board: StatusBoard,
}

impl Supervisor {
    /// 새 감독자를 생성합니다.
    pub fn new(registry: Arc<CounterRegistry>, config: MonitorConfig) -> Self {
        Self {
            registry,
            config,
            cancel: CancellationToken::new(),
            tasks: JoinSet::new(),
            task_events: HashMap::new(),
            board: Vec::new(),
        }
    }

    /// 모든 이벤트의 카운터를 등록하고 모니터를 띄웁니다.
    ///
    /// 등록은 모니터를 띄우기 전에 모두 끝나므로, 이름 충돌이 있으면
    /// 아무 모니터도 시작되지 않습니다.
    ///
    /// # Errors
    ///
    /// - 이미 모니터를 띄운 감독자: [`MonitorError::AlreadyStarted`]
    /// - 잘못된 설정: [`MonitorError::Config`]
    /// - 이벤트 이름 중복: [`MonitorError::Registry`]
    pub fn spawn_all(&mut self, definitions: &[EventDefinition]) -> Result<(), MonitorError> {
        if !self.board.is_empty() {
            return Err(MonitorError::AlreadyStarted(self.board.len()));
        }
        self.config.validate()?;

        let mut counters = Vec::with_capacity(definitions.len());
        for definition in definitions {
            counters.push(
                self.registry
                    .register(&definition.name, &definition.description)?,
            );
        }

        for (definition, counter) in definitions.iter().zip(counters) {
            let monitor = EventMonitor::new(
                Arc::new(definition.clone()),
                counter,
                self.config.clone(),
                self.cancel.child_token(),
            );
            self.board
                .push((definition.name.clone(), monitor.subscribe()));

            let handle = self.tasks.spawn(monitor.run());
            self.task_events
                .insert(handle.id(), definition.name.clone());
            debug!(event = %definition.name, "monitor spawned");
        }

        info!(monitors = definitions.len(), "all monitors spawned");
        Ok(())
    }

    /// 모니터별 상태 구독자를 반환합니다.
    pub fn status_board(&self) -> StatusBoard {
        self.board.clone()
    }

    /// 감독자 취소 토큰
    ///
    /// 취소하면 모든 모니터가 종료 절차에 들어갑니다.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 실행 중인 모니터 수
    pub fn running(&self) -> usize {
        self.tasks.len()
    }

    /// 모든 모니터가 멈추거나 `shutdown`이 완료될 때까지 기다립니다.
    ///
    /// `shutdown`이 먼저 완료되면 모든 모니터를 취소하고 종료를 기다립니다.
    pub async fn wait<F>(&mut self, shutdown: F) -> Vec<MonitorReport>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut reports = Vec::with_capacity(self.tasks.len());

        loop {
            tokio::select! {
                joined = self.tasks.join_next_with_id() => match joined {
                    Some(result) => self.collect(result, &mut reports),
                    None => {
                        info!("all monitors stopped");
                        return reports;
                    }
                },
                () = &mut shutdown => {
                    info!(running = self.tasks.len(), "shutdown requested, cancelling monitors");
                    break;
                }
            }
        }

        reports.extend(self.shutdown().await);
        reports
    }

    /// 모든 모니터를 취소하고 종료를 기다립니다.
    pub async fn shutdown(&mut self) -> Vec<MonitorReport> {
        self.cancel.cancel();
        let mut reports = Vec::with_capacity(self.tasks.len());
        while let Some(result) = self.tasks.join_next_with_id().await {
            self.collect(result, &mut reports);
        }
        reports
    }

    /// 이벤트마다 모니터를 띄우고 모두 멈출 때까지 기다립니다.
    pub async fn run_all<F>(
        &mut self,
        definitions: &[EventDefinition],
        shutdown: F,
    ) -> Result<Vec<MonitorReport>, MonitorError>
    where
        F: Future<Output = ()>,
    {
        self.spawn_all(definitions)?;
        Ok(self.wait(shutdown).await)
    }

    fn collect(
        &mut self,
        result: Result<(Id, MonitorReport), JoinError>,
        reports: &mut Vec<MonitorReport>,
    ) {
        match result {
            Ok((id, report)) => {
                self.task_events.remove(&id);
                debug!(event = %report.event, reason = %report.reason, "monitor stopped");
                reports.push(report);
            }
            Err(e) => {
                let event = self
                    .task_events
                    .remove(&e.id())
                    .unwrap_or_else(|| "<unknown>".to_owned());
                if e.is_panic() {
                    error!(event = %event, "monitor task panicked");
                } else {
                    warn!(event = %event, error = %e, "monitor task aborted");
                }
            }
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        // JoinSet 드롭 시 태스크가 중단되고 각 LineSource가 프로세스를 정리함
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("monitors", &self.board.len())
            .field("running", &self.tasks.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
