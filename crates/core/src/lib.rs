//! logtally 공통 크레이트
//!
//! 설정 모델과 로딩, 도메인 에러, 헬스 상태, 메트릭 이름 상수를 제공합니다.
//! `logtally-monitor`와 `logtally-daemon`이 함께 사용합니다.

pub mod config;
pub mod error;
pub mod health;
pub mod metrics;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, ExporterError, LogtallyError, RegistryError, SourceError};

// 설정
pub use config::{GeneralConfig, LogtallyConfig, MetricsConfig, MonitorSettings};

// 헬스
pub use health::HealthStatus;

// 도메인 타입
pub use types::EventDefinition;
