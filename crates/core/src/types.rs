//! 도메인 타입 — 모니터링 대상 이벤트 정의

use serde::{Deserialize, Serialize};

/// 모니터링할 이벤트 하나의 정의
///
/// 설정 로딩 시 한 번 생성되고 이후 변경되지 않습니다.
/// `name`은 메트릭 이름으로 그대로 사용되므로 설정 전체에서 고유해야 합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDefinition {
    /// 이벤트 이름 (메트릭 이름)
    pub name: String,
    /// 메트릭 HELP 텍스트
    #[serde(default)]
    pub description: String,
    /// 실행할 명령 (첫 요소가 실행 파일)
    #[serde(alias = "log_command")]
    pub command: Vec<String>,
    /// 찾을 부분 문자열 목록
    #[serde(alias = "match_patterns")]
    pub patterns: Vec<String>,
}

impl EventDefinition {
    /// 새 이벤트 정의를 생성합니다.
    pub fn new<C, P>(
        name: impl Into<String>,
        description: impl Into<String>,
        command: C,
        patterns: P,
    ) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        P: IntoIterator,
        P::Item: Into<String>,
    {
        Self {
            name: name.into(),
            description: description.into(),
            command: command.into_iter().map(Into::into).collect(),
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }

    /// 실행 파일 (명령의 첫 요소)
    pub fn program(&self) -> Option<&str> {
        self.command.first().map(String::as_str)
    }

    /// 로그 출력용으로 공백으로 이어 붙인 명령 문자열
    pub fn command_line(&self) -> String {
        self.command.join(" ")
    }
}
