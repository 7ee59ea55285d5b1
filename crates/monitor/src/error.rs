//! 모니터 에러 타입
//!
//! [`MonitorError`]는 모니터 크레이트 내부에서 발생하는 에러를 표현합니다.
//! `From<MonitorError> for LogtallyError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use logtally_core::error::{ConfigError, LogtallyError, RegistryError, SourceError};

/// 모니터 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// 서브프로세스 시작/읽기 에러
    #[error(transparent)]
    Source(#[from] SourceError),

    /// 카운터 등록 충돌
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// 모니터 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 이미 실행 중인 감독자에 다시 모니터를 띄우려 함
    #[error("supervisor already started {0} monitors")]
    AlreadyStarted(usize),
}

impl From<MonitorError> for LogtallyError {
    fn from(err: MonitorError) -> Self {
        match err {
            MonitorError::Source(e) => LogtallyError::Source(e),
            MonitorError::Registry(e) => LogtallyError::Registry(e),
            MonitorError::Config { field, reason } => {
                LogtallyError::Config(ConfigError::InvalidValue { field, reason })
            }
            MonitorError::AlreadyStarted(count) => {
                LogtallyError::Config(ConfigError::InvalidValue {
                    field: "events".to_owned(),
                    reason: format!("supervisor already started {count} monitors"),
                })
            }
        }
    }
}
