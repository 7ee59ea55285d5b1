//! 에러 타입 — 도메인별 에러 정의
//!
//! 시작 시점 에러(설정, 카운터 등록, 익스포터 바인드)는 프로세스 전체를 중단시키고,
//! 이벤트별 런타임 에러(서브프로세스 시작/읽기 실패)는 해당 모니터에만 격리됩니다.

/// logtally 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum LogtallyError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 서브프로세스 라인 소스 에러
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// 카운터 레지스트리 에러
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// 메트릭 익스포터 에러
    #[error("exporter error: {0}")]
    Exporter(#[from] ExporterError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 서브프로세스 라인 소스 에러
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// 실행 파일을 찾지 못했거나 프로세스 생성 실패
    #[error("failed to start '{command}': {reason}")]
    Start { command: String, reason: String },

    /// 스트리밍 도중 표준 출력 읽기 실패
    #[error("failed to read output of '{command}': {reason}")]
    Read { command: String, reason: String },
}

/// 카운터 레지스트리 에러
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// 같은 이벤트 이름이 이미 등록됨 (설정의 중복 이름)
    #[error("counter '{name}' is already registered")]
    AlreadyRegistered { name: String },
}

/// 메트릭 익스포터 에러
#[derive(Debug, thiserror::Error)]
pub enum ExporterError {
    /// 리슨 주소 파싱 실패
    #[error("invalid listen address '{addr}': {reason}")]
    InvalidAddress { addr: String, reason: String },

    /// 절대 경로가 아닌 엔드포인트
    #[error("invalid metrics endpoint '{0}': must start with '/'")]
    InvalidEndpoint(String),

    /// 레코더 설치 또는 HTTP 리스너 바인드 실패
    #[error("failed to listen on {addr}: {reason}")]
    Listen { addr: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_error_names_the_command() {
        let err = SourceError::Start {
            command: "journalctl -f".to_owned(),
            reason: "No such file or directory".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("journalctl -f"));
        assert!(msg.contains("No such file"));
    }

    #[test]
    fn registry_error_converts_to_top_level() {
        let err: LogtallyError = RegistryError::AlreadyRegistered {
            name: "ssh_failures".to_owned(),
        }
        .into();
        assert!(matches!(err, LogtallyError::Registry(_)));
        assert!(err.to_string().contains("ssh_failures"));
    }

    #[test]
    fn exporter_endpoint_error_display() {
        let err = ExporterError::InvalidEndpoint("custom".to_owned());
        assert!(err.to_string().contains("'custom'"));
    }
}
