//! 모니터 통합 테스트
//!
//! 실제 서브프로세스를 띄워 감독자 → 모니터 → 레지스트리 흐름을 검증합니다.
//! - 유한 명령의 매칭 카운트
//! - 시작 실패 격리
//! - 취소 시 유예 시간 내 종료 및 프로세스 정리
//! - 이벤트 이름 충돌

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use logtally_core::types::EventDefinition;
use logtally_monitor::{
    CounterRegistry, ExitOutcome, MonitorConfig, MonitorError, MonitorState, StopReason,
    Supervisor,
};

fn config() -> MonitorConfig {
    MonitorConfig {
        stop_timeout: Duration::from_secs(2),
        max_line_length: 4096,
        verbose: true,
    }
}

fn new_supervisor() -> (Arc<CounterRegistry>, Supervisor) {
    let registry = Arc::new(CounterRegistry::new());
    let supervisor = Supervisor::new(Arc::clone(&registry), config());
    (registry, supervisor)
}

fn pid_alive(pid: u32) -> bool {
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        let state = stat
            .rsplit(')')
            .next()
            .and_then(|rest| rest.split_whitespace().next());
        return state != Some("Z");
    }
    if std::path::Path::new("/proc/self").exists() {
        return false;
    }
    // SAFETY: 신호 0은 존재 여부만 확인합니다.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

// =============================================================================
// 카운트
// =============================================================================

#[tokio::test]
async fn echo_command_counts_one_match() {
    let (registry, mut supervisor) = new_supervisor();
    let defs = vec![EventDefinition::new(
        "test_event",
        "Test event",
        ["echo", "test log with pattern"],
        ["pattern"],
    )];

    let reports = supervisor
        .run_all(&defs, std::future::pending())
        .await
        .expect("should run");

    assert_eq!(reports.len(), 1);
    assert_eq!(
        reports[0].reason,
        StopReason::Completed(ExitOutcome::Success)
    );
    assert_eq!(registry.get("test_event").unwrap().get("pattern"), 1);
}

#[tokio::test]
async fn multi_line_output_is_counted_per_line_and_pattern() {
    let (registry, mut supervisor) = new_supervisor();
    let defs = vec![EventDefinition::new(
        "ssh_auth_failures",
        "SSH authentication failures",
        [
            "printf",
            "Failed password for root\\nInvalid user admin\\nAccepted publickey\\nFailed password for bob\\n",
        ],
        ["Failed password", "Invalid user"],
    )];

    let reports = supervisor
        .run_all(&defs, std::future::pending())
        .await
        .expect("should run");

    let counts = registry.get("ssh_auth_failures").unwrap().snapshot();
    assert_eq!(counts["Failed password"], 2);
    assert_eq!(counts["Invalid user"], 1);
    assert_eq!(reports[0].lines_read, 4);
    assert_eq!(reports[0].matches, 3);
}

#[tokio::test]
async fn counts_are_stable_after_completion() {
    let (registry, mut supervisor) = new_supervisor();
    let defs = vec![EventDefinition::new(
        "stable",
        "",
        ["echo", "hit"],
        ["hit"],
    )];
    supervisor
        .run_all(&defs, std::future::pending())
        .await
        .expect("should run");

    let first = registry.snapshot();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(first, registry.snapshot());
}

// =============================================================================
// 격리
// =============================================================================

#[tokio::test]
async fn invalid_command_does_not_affect_other_monitors() {
    let (registry, mut supervisor) = new_supervisor();
    let defs = vec![
        EventDefinition::new(
            "broken",
            "",
            ["/nonexistent/logtally-no-such-binary", "--flag"],
            ["x"],
        ),
        EventDefinition::new("healthy", "", ["echo", "all good"], ["good"]),
    ];

    let reports = supervisor
        .run_all(&defs, std::future::pending())
        .await
        .expect("start failures are per-event, not fatal");

    let broken = reports.iter().find(|r| r.event == "broken").unwrap();
    assert!(matches!(broken.reason, StopReason::StartFailed(_)));
    let healthy = reports.iter().find(|r| r.event == "healthy").unwrap();
    assert!(matches!(healthy.reason, StopReason::Completed(_)));

    assert_eq!(registry.get("healthy").unwrap().get("good"), 1);
    assert!(registry.get("broken").unwrap().snapshot().is_empty());
}

#[tokio::test]
async fn duplicate_event_names_are_rejected_before_spawning() {
    let (_, mut supervisor) = new_supervisor();
    let defs = vec![
        EventDefinition::new("same", "", ["echo", "a"], ["a"]),
        EventDefinition::new("same", "", ["echo", "b"], ["b"]),
    ];

    let err = supervisor
        .run_all(&defs, std::future::pending())
        .await
        .unwrap_err();
    assert!(matches!(err, MonitorError::Registry(_)));
    assert!(err.to_string().contains("same"));
}

// =============================================================================
// 취소
// =============================================================================

#[tokio::test]
async fn cancellation_stops_within_grace_and_kills_subprocess() {
    let pid_file = std::env::temp_dir().join(format!(
        "logtally_monitor_cancel_{}.pid",
        std::process::id()
    ));
    let _ = std::fs::remove_file(&pid_file);
    let script = format!("echo $$ > {}; exec sleep 30", pid_file.display());

    let (_, mut supervisor) = new_supervisor();
    let defs = vec![EventDefinition::new(
        "long_running",
        "",
        ["sh", "-c", script.as_str()],
        ["never"],
    )];
    supervisor.spawn_all(&defs).expect("should spawn");

    let mut board = supervisor.status_board();
    let (_, state) = &mut board[0];
    state
        .wait_for(|s| *s == MonitorState::Streaming)
        .await
        .expect("monitor should start streaming");

    let mut pid = None;
    for _ in 0..100 {
        if let Some(parsed) = std::fs::read_to_string(&pid_file)
            .ok()
            .and_then(|content| content.trim().parse::<u32>().ok())
        {
            pid = Some(parsed);
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let pid = pid.expect("subprocess should write its pid");
    assert!(pid_alive(pid));

    let started = std::time::Instant::now();
    let reports = supervisor.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(3));
    let _ = std::fs::remove_file(&pid_file);

    assert_eq!(reports.len(), 1);
    assert!(matches!(reports[0].reason, StopReason::Cancelled(_)));
    assert!(state.borrow().is_stopped());
    assert!(!pid_alive(pid), "subprocess should be gone after cancellation");
}

#[tokio::test]
async fn shutdown_signal_cancels_all_monitors() {
    let (_, mut supervisor) = new_supervisor();
    let defs: Vec<_> = (0..4)
        .map(|i| EventDefinition::new(format!("idle_{i}"), "", ["sleep", "30"], ["x"]))
        .collect();
    supervisor.spawn_all(&defs).expect("should spawn");
    let token = supervisor.cancellation_token();

    let trigger = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        token.cancel();
    });

    let shutdown = {
        let token = supervisor.cancellation_token();
        async move { token.cancelled().await }
    };
    let reports = tokio::time::timeout(Duration::from_secs(10), supervisor.wait(shutdown))
        .await
        .expect("all monitors should stop within the grace period");
    trigger.await.unwrap();

    assert_eq!(reports.len(), 4);
    assert!(
        reports
            .iter()
            .all(|r| matches!(r.reason, StopReason::Cancelled(_)))
    );
}
