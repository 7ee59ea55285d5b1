//! 카운터 레지스트리 -- 이벤트 이름별 패턴 레이블 카운터
//!
//! [`CounterRegistry`]는 프로세스 전체에서 공유되는 집계 상태입니다.
//! 전역 변수가 아니라 `Arc`로 각 모니터에 주입됩니다.
//!
//! 각 증가는 두 곳에 기록됩니다.
//! - 내부 `AtomicU64`: [`EventCounter::snapshot`]으로 조회 (테스트, 헬스 로그)
//! - `metrics` 파사드: 설치된 Prometheus 레코더가 `<event>{pattern="..."}`로 노출

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use logtally_core::error::RegistryError;
use logtally_core::metrics::LABEL_PATTERN;

/// 패턴 하나의 카운터
struct PatternCounter {
    value: AtomicU64,
    exported: metrics::Counter,
}

/// 이벤트 하나에 대한 패턴 레이블 카운터
///
/// 복제 비용이 낮은 핸들이며, 모든 복제본이 같은 카운트를 공유합니다.
#[derive(Clone)]
pub struct EventCounter {
    inner: Arc<EventCounterInner>,
}

struct EventCounterInner {
    name: String,
    description: String,
    patterns: RwLock<HashMap<String, Arc<PatternCounter>>>,
}

impl EventCounter {
    fn new(name: &str, description: &str) -> Self {
        Self {
            inner: Arc::new(EventCounterInner {
                name: name.to_owned(),
                description: description.to_owned(),
                patterns: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// 이벤트 이름 (메트릭 이름)
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// 메트릭 설명
    pub fn description(&self) -> &str {
        &self.inner.description
    }

    /// `(이벤트, 패턴)` 카운터를 1 증가시킵니다.
    ///
    /// 처음 보는 패턴은 0으로 생성한 뒤 증가시킵니다.
    pub fn increment(&self, pattern: &str) {
        let counter = self.counter_for(pattern);
        counter.value.fetch_add(1, Ordering::Relaxed);
        counter.exported.increment(1);
    }

    /// 패턴 하나의 현재 값 (없으면 0)
    pub fn get(&self, pattern: &str) -> u64 {
        self.inner
            .patterns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(pattern)
            .map_or(0, |counter| counter.value.load(Ordering::Relaxed))
    }

    /// 패턴별 현재 값
    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.inner
            .patterns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(pattern, counter)| (pattern.clone(), counter.value.load(Ordering::Relaxed)))
            .collect()
    }

    fn counter_for(&self, pattern: &str) -> Arc<PatternCounter> {
        if let Some(counter) = self
            .inner
            .patterns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(pattern)
        {
            return Arc::clone(counter);
        }

        let mut patterns = self
            .inner
            .patterns
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        // 읽기 잠금을 놓은 사이 다른 태스크가 만들었을 수 있음
        let counter = patterns.entry(pattern.to_owned()).or_insert_with(|| {
            Arc::new(PatternCounter {
                value: AtomicU64::new(0),
                exported: metrics::counter!(
                    self.inner.name.clone(),
                    LABEL_PATTERN => pattern.to_owned()
                ),
            })
        });
        Arc::clone(counter)
    }
}

impl std::fmt::Debug for EventCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventCounter")
            .field("name", &self.inner.name)
            .field("counts", &self.snapshot())
            .finish()
    }
}

/// 이벤트 이름 → [`EventCounter`] 레지스트리
#[derive(Debug, Default)]
pub struct CounterRegistry {
    events: RwLock<BTreeMap<String, EventCounter>>,
}

impl CounterRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 이벤트 카운터를 등록합니다.
    ///
    /// 이벤트 이름마다 정확히 한 번만 호출할 수 있습니다.
    /// 같은 이름을 다시 등록하면 누적된 값을 덮어쓰지 않고 에러를 반환합니다.
    pub fn register(&self, name: &str, description: &str) -> Result<EventCounter, RegistryError> {
        let mut events = self.events.write().unwrap_or_else(PoisonError::into_inner);
        if events.contains_key(name) {
            return Err(RegistryError::AlreadyRegistered {
                name: name.to_owned(),
            });
        }

        let counter = EventCounter::new(name, description);
        metrics::describe_counter!(name.to_owned(), description.to_owned());
        events.insert(name.to_owned(), counter.clone());
        tracing::debug!(event = name, "registered event counter");
        Ok(counter)
    }

    /// 등록된 이벤트 카운터를 조회합니다.
    pub fn get(&self, name: &str) -> Option<EventCounter> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// 등록된 이벤트 이름 목록 (정렬됨)
    pub fn names(&self) -> Vec<String> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// 등록된 이벤트 수
    pub fn len(&self) -> usize {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// 등록된 이벤트가 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 모든 이벤트의 패턴별 현재 값
    pub fn snapshot(&self) -> BTreeMap<String, BTreeMap<String, u64>> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, counter)| (name.clone(), counter.snapshot()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_increment() {
        let registry = CounterRegistry::new();
        let counter = registry.register("test_event", "Test event").unwrap();

        counter.increment("pattern");
        counter.increment("pattern");
        counter.increment("other");

        assert_eq!(counter.get("pattern"), 2);
        assert_eq!(counter.get("other"), 1);
        assert_eq!(counter.get("never"), 0);
        assert_eq!(counter.name(), "test_event");
        assert_eq!(counter.description(), "Test event");
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry = CounterRegistry::new();
        let first = registry.register("dup", "first").unwrap();
        first.increment("x");

        let err = registry.register("dup", "second").unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered { ref name } if name == "dup"));

        // 기존 누적값은 유지
        assert_eq!(registry.get("dup").unwrap().get("x"), 1);
        assert_eq!(registry.get("dup").unwrap().description(), "first");
    }

    #[test]
    fn distinct_names_are_independent() {
        let registry = CounterRegistry::new();
        let a = registry.register("event_a", "").unwrap();
        let b = registry.register("event_b", "").unwrap();

        a.increment("shared");
        a.increment("shared");
        b.increment("shared");

        assert_eq!(a.get("shared"), 2);
        assert_eq!(b.get("shared"), 1);
        assert_eq!(registry.names(), vec!["event_a", "event_b"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn clones_share_counts() {
        let registry = CounterRegistry::new();
        let counter = registry.register("shared", "").unwrap();
        let clone = counter.clone();
        clone.increment("p");
        assert_eq!(counter.get("p"), 1);
    }

    #[test]
    fn snapshot_lists_every_event() {
        let registry = CounterRegistry::new();
        assert!(registry.is_empty());
        registry.register("quiet", "").unwrap();
        registry.register("busy", "").unwrap().increment("hit");

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot["quiet"].is_empty());
        assert_eq!(snapshot["busy"]["hit"], 1);
    }

    #[test]
    fn snapshot_is_stable_without_increments() {
        let registry = CounterRegistry::new();
        let counter = registry.register("stable", "").unwrap();
        counter.increment("p");
        assert_eq!(registry.snapshot(), registry.snapshot());
    }

    #[test]
    fn concurrent_increments_from_threads_are_not_lost() {
        let registry = CounterRegistry::new();
        let counter = registry.register("contended", "").unwrap();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let counter = counter.clone();
                scope.spawn(move || {
                    for _ in 0..1_000 {
                        counter.increment("p");
                    }
                });
            }
        });

        assert_eq!(counter.get("p"), 8_000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_from_tasks_are_not_lost() {
        let registry = Arc::new(CounterRegistry::new());
        let counter = registry.register("tasks", "").unwrap();

        let mut handles = Vec::new();
        for task in 0..16 {
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                // 새 패턴 생성 경합도 함께 검증
                let pattern = if task % 2 == 0 { "even" } else { "odd" };
                for _ in 0..500 {
                    counter.increment(pattern);
                    tokio::task::yield_now().await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(counter.get("even"), 4_000);
        assert_eq!(counter.get("odd"), 4_000);
    }
}
