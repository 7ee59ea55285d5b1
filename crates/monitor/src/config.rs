//! 모니터 설정
//!
//! [`MonitorConfig`]는 core의 [`MonitorSettings`]와 `general.debug`를
//! 모니터 실행에 필요한 형태로 변환한 설정입니다.
//!
//! # 사용 예시
//! ```ignore
//! use logtally_core::config::LogtallyConfig;
//! use logtally_monitor::config::MonitorConfig;
//!
//! let core_config = LogtallyConfig::default();
//! let config = MonitorConfig::from_core(&core_config.monitor, core_config.general.debug);
//! ```

use std::time::Duration;

use logtally_core::config::MonitorSettings;

use crate::error::MonitorError;
use crate::source::SourceOptions;

/// 모니터 실행 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// 종료 신호 후 서브프로세스를 기다리는 시간
    pub stop_timeout: Duration,
    /// 최대 라인 길이 (바이트)
    pub max_line_length: usize,
    /// 실행 명령과 매칭을 info 레벨로 기록
    pub verbose: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::from_core(&MonitorSettings::default(), false)
    }
}

impl MonitorConfig {
    /// core 설정에서 모니터 설정을 생성합니다.
    pub fn from_core(settings: &MonitorSettings, verbose: bool) -> Self {
        Self {
            stop_timeout: Duration::from_secs(settings.stop_timeout_secs),
            max_line_length: settings.max_line_length,
            verbose,
        }
    }

    /// 설정 값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), MonitorError> {
        if self.stop_timeout.is_zero() {
            return Err(MonitorError::Config {
                field: "stop_timeout".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        if self.max_line_length == 0 {
            return Err(MonitorError::Config {
                field: "max_line_length".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        Ok(())
    }

    pub(crate) fn source_options(&self) -> SourceOptions {
        SourceOptions {
            max_line_length: self.max_line_length,
            stop_timeout: self.stop_timeout,
        }
    }
}
