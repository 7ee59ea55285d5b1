#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`source`]: 서브프로세스 실행과 라인 단위 출력 읽기, 프로세스 그룹 정리
//! - [`matcher`]: 대소문자를 구분하는 부분 문자열 패턴 매칭
//! - [`registry`]: 이벤트별 패턴 레이블 카운터 (공유 상태)
//! - [`monitor`]: 이벤트 하나에 대한 상태 머신 루프
//! - [`supervisor`]: 모니터 생성, 완료 추적, 종료 전파
//! - [`config`]: 모니터 설정 (core 설정 변환)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! Supervisor ──spawn──▶ EventMonitor ──▶ LineSource (subprocess stdout)
//!     │                      │
//!  CancellationToken    PatternMatcher ──▶ EventCounter ──▶ metrics facade
//! ```

pub mod config;
pub mod error;
pub mod matcher;
pub mod monitor;
pub mod registry;
pub mod source;
pub mod supervisor;

// --- 주요 타입 re-export ---

// 감독자
pub use supervisor::{StatusBoard, Supervisor};

// 모니터
pub use monitor::{EventMonitor, MonitorReport, MonitorState, StopReason};

// 라인 소스
pub use source::{ExitOutcome, LineSource, SourceOptions};

// 매처
pub use matcher::{PatternMatcher, match_patterns};

// 레지스트리
pub use registry::{CounterRegistry, EventCounter};

// 설정
pub use config::MonitorConfig;

// 에러
pub use error::MonitorError;
