//! 설정 관리 — logtally.toml / logtally.json 파싱 및 런타임 설정
//!
//! [`LogtallyConfig`]는 데몬 전체 설정과 모니터링할 이벤트 목록을 담습니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`LOGTALLY_METRICS_PORT=9100` 형식)
//! 3. 설정 파일 (`.json` 확장자면 JSON, 그 외는 TOML)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), logtally_core::error::LogtallyError> {
//! use logtally_core::config::LogtallyConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드 + 검증
//! let config = LogtallyConfig::load("logtally.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = LogtallyConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, LogtallyError};
use crate::types::EventDefinition;

/// 자체 메트릭 전용 이름 접두사 (이벤트 이름으로 사용 불가)
const RESERVED_METRIC_PREFIX: &str = "logtally_";

/// 설정 파일 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML (기본값)
    Toml,
    /// JSON
    Json,
}

impl ConfigFormat {
    /// 파일 확장자로 형식을 결정합니다.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Toml,
        }
    }
}

/// logtally 통합 설정
///
/// 알 수 없는 최상위 키는 파싱 에러입니다. 평면 형식의 `debug`, `metrics_port`,
/// `metrics_path` 키도 받아들이며, 있으면 섹션 값보다 우선합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "RawConfig")]
pub struct LogtallyConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 메트릭 익스포터 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// 모니터 런타임 설정
    #[serde(default)]
    pub monitor: MonitorSettings,
    /// 모니터링할 이벤트 목록
    #[serde(default)]
    pub events: Vec<EventDefinition>,
}

/// 역직렬화 전용 형태 (평면 키 포함)
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    general: GeneralConfig,
    #[serde(default)]
    metrics: MetricsConfig,
    #[serde(default)]
    monitor: MonitorSettings,
    #[serde(default)]
    events: Vec<EventDefinition>,
    debug: Option<bool>,
    metrics_port: Option<u16>,
    metrics_path: Option<String>,
}

impl From<RawConfig> for LogtallyConfig {
    fn from(raw: RawConfig) -> Self {
        let mut config = Self {
            general: raw.general,
            metrics: raw.metrics,
            monitor: raw.monitor,
            events: raw.events,
        };
        if let Some(debug) = raw.debug {
            config.general.debug = debug;
        }
        if let Some(port) = raw.metrics_port {
            config.metrics.port = port;
        }
        if let Some(path) = raw.metrics_path {
            config.metrics.endpoint = path;
        }
        config
    }
}

impl LogtallyConfig {
    /// 설정 파일을 로드하고 환경변수 오버라이드를 적용한 뒤 검증합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LogtallyError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 설정 파일을 읽어 파싱합니다 (환경변수 오버라이드, 검증 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LogtallyError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LogtallyError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LogtallyError::Io(e)
            }
        })?;
        Self::parse_as(&content, ConfigFormat::from_path(path))
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, LogtallyError> {
        Self::parse_as(toml_str, ConfigFormat::Toml)
    }

    /// 지정한 형식으로 설정 문자열을 파싱합니다.
    pub fn parse_as(content: &str, format: ConfigFormat) -> Result<Self, LogtallyError> {
        let parsed = match format {
            ConfigFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
            ConfigFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        };
        parsed.map_err(|reason| LogtallyError::Config(ConfigError::ParseFailed { reason }))
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `LOGTALLY_{SECTION}_{FIELD}`
    /// 이벤트 목록은 환경변수로 덮어쓸 수 없습니다.
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LOGTALLY_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOGTALLY_GENERAL_LOG_FORMAT");
        override_bool(&mut self.general.debug, "LOGTALLY_GENERAL_DEBUG");
        override_bool(
            &mut self.general.exit_when_idle,
            "LOGTALLY_GENERAL_EXIT_WHEN_IDLE",
        );
        override_u64(
            &mut self.general.health_interval_secs,
            "LOGTALLY_GENERAL_HEALTH_INTERVAL_SECS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "LOGTALLY_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "LOGTALLY_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "LOGTALLY_METRICS_PORT");
        override_string(&mut self.metrics.endpoint, "LOGTALLY_METRICS_ENDPOINT");

        // Monitor
        override_u64(
            &mut self.monitor.stop_timeout_secs,
            "LOGTALLY_MONITOR_STOP_TIMEOUT_SECS",
        );
        override_usize(
            &mut self.monitor.max_line_length,
            "LOGTALLY_MONITOR_MAX_LINE_LENGTH",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), LogtallyError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.general.health_interval_secs == 0 {
            return Err(invalid("general.health_interval_secs", "must be > 0"));
        }

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(invalid("metrics.port", "must be > 0"));
            }
            if !self.metrics.endpoint.starts_with('/') {
                return Err(invalid("metrics.endpoint", "must start with '/'"));
            }
        }

        if self.monitor.stop_timeout_secs == 0 {
            return Err(invalid("monitor.stop_timeout_secs", "must be > 0"));
        }
        if self.monitor.max_line_length == 0 {
            return Err(invalid("monitor.max_line_length", "must be > 0"));
        }

        let mut names = HashSet::new();
        for (idx, event) in self.events.iter().enumerate() {
            validate_event(idx, event)?;
            if !names.insert(event.name.as_str()) {
                return Err(invalid(
                    format!("events[{idx}].name"),
                    format!("duplicate event name '{}'", event.name),
                ));
            }
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 실행 명령과 매칭 결과를 로그로 남김
    pub debug: bool,
    /// 모든 모니터가 멈추면 데몬을 종료
    pub exit_when_idle: bool,
    /// 헬스 체크 로그 주기 (초)
    pub health_interval_secs: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            debug: false,
            exit_when_idle: false,
            health_interval_secs: 30,
        }
    }
}

/// 메트릭 익스포터 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 리슨 주소
    pub listen_addr: String,
    /// 리슨 포트
    pub port: u16,
    /// 스크레이프 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen_addr: "0.0.0.0".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

/// 모니터 런타임 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// 종료 신호 후 서브프로세스가 끝나기를 기다리는 시간 (초)
    pub stop_timeout_secs: u64,
    /// 최대 라인 길이 (바이트). 초과 라인은 버림
    pub max_line_length: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            stop_timeout_secs: 5,
            max_line_length: 64 * 1024, // 64KB
        }
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> LogtallyError {
    ConfigError::InvalidValue {
        field: field.into(),
        reason: reason.into(),
    }
    .into()
}

fn validate_event(idx: usize, event: &EventDefinition) -> Result<(), LogtallyError> {
    if !is_valid_metric_name(&event.name) {
        return Err(invalid(
            format!("events[{idx}].name"),
            format!(
                "'{}' is not a valid metric name ([a-zA-Z_:][a-zA-Z0-9_:]*)",
                event.name
            ),
        ));
    }

    if event.name.starts_with(RESERVED_METRIC_PREFIX) {
        return Err(invalid(
            format!("events[{idx}].name"),
            format!("'{RESERVED_METRIC_PREFIX}' prefix is reserved for self-metrics"),
        ));
    }

    match event.program() {
        None => {
            return Err(invalid(
                format!("events[{idx}].command"),
                "command must not be empty",
            ));
        }
        Some(program) if program.trim().is_empty() => {
            return Err(invalid(
                format!("events[{idx}].command"),
                "executable must not be empty",
            ));
        }
        Some(_) => {}
    }

    if event.patterns.is_empty() {
        return Err(invalid(
            format!("events[{idx}].patterns"),
            "at least one pattern is required",
        ));
    }

    let mut seen = HashSet::new();
    for pattern in &event.patterns {
        if pattern.is_empty() {
            return Err(invalid(
                format!("events[{idx}].patterns"),
                "patterns must not be empty strings",
            ));
        }
        if !seen.insert(pattern.as_str()) {
            return Err(invalid(
                format!("events[{idx}].patterns"),
                format!("duplicate pattern '{pattern}'"),
            ));
        }
    }

    Ok(())
}

/// Prometheus 메트릭 이름 규칙 (`[a-zA-Z_:][a-zA-Z0-9_:]*`) 검사
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' || first == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                expected = type_name,
                "failed to parse env var, ignoring"
            ),
        }
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key, "bool");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}
