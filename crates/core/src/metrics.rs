//! 메트릭 상수 및 설명 등록
//!
//! logtally 자체 상태를 나타내는 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 이벤트 카운터는 설정의 이벤트 이름을 그대로 메트릭 이름으로 쓰므로 여기에 없습니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `logtally_`
//! - 접미어: `_total` (counter), `_seconds` (gauge, 초), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 매칭된 패턴 레이블 키 (이벤트 카운터)
pub const LABEL_PATTERN: &str = "pattern";

/// 이벤트 이름 레이블 키 (모니터 자체 메트릭)
pub const LABEL_EVENT: &str = "event";

/// 빌드 버전 레이블 키
pub const LABEL_VERSION: &str = "version";

// ─── Monitor 메트릭 ────────────────────────────────────────────────

/// Monitor: 읽은 전체 라인 수 (counter, label: event)
pub const MONITOR_LINES_TOTAL: &str = "logtally_monitor_lines_total";

/// Monitor: 최대 길이 초과로 버린 라인 수 (counter, label: event)
pub const MONITOR_LINES_DROPPED_TOTAL: &str = "logtally_monitor_lines_dropped_total";

/// Monitor: 서브프로세스 시작 실패 수 (counter, label: event)
pub const MONITOR_START_FAILURES_TOTAL: &str = "logtally_monitor_start_failures_total";

/// Monitor: 현재 스트리밍 중인 모니터 수 (gauge)
pub const MONITORS_RUNNING: &str = "logtally_monitors_running";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "logtally_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "logtally_daemon_build_info";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 자체 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        MONITOR_LINES_TOTAL,
        "Total number of output lines read from monitored commands"
    );
    describe_counter!(
        MONITOR_LINES_DROPPED_TOTAL,
        "Total number of lines dropped for exceeding the maximum line length"
    );
    describe_counter!(
        MONITOR_START_FAILURES_TOTAL,
        "Total number of monitored commands that failed to start"
    );
    describe_gauge!(
        MONITORS_RUNNING,
        "Number of monitors currently streaming command output"
    );

    describe_gauge!(DAEMON_UPTIME_SECONDS, "logtally daemon uptime in seconds");
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}
