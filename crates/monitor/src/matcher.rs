//! 패턴 매칭 -- 라인에 포함된 부분 문자열 찾기
//!
//! 대소문자를 구분하는 단순 부분 문자열 포함 검사입니다.
//! 한 라인이 여러 패턴에 동시에 매칭될 수 있으며, 첫 매칭에서 멈추지 않습니다.

/// `line`에 포함된 패턴을 설정 순서대로 모두 반환합니다.
pub fn match_patterns<'p>(line: &str, patterns: &'p [String]) -> Vec<&'p str> {
    contained(line, patterns).collect()
}

fn contained<'l, 'p>(line: &'l str, patterns: &'p [String]) -> impl Iterator<Item = &'p str> {
    patterns
        .iter()
        .map(String::as_str)
        .filter(move |pattern| line.contains(pattern))
}

/// 이벤트 하나의 패턴 목록을 보관하는 매처
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    patterns: Vec<String>,
}

impl PatternMatcher {
    /// 새 매처를 생성합니다.
    pub fn new(patterns: Vec<String>) -> Self {
        Self { patterns }
    }

    /// 라인에 매칭되는 패턴을 순회합니다.
    pub fn matches<'a>(&'a self, line: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        contained(line, &self.patterns)
    }

    /// 설정된 패턴 목록
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}
