//! Attendance history cache.
//!
//! Records and stats are whatever the backend last returned. `refresh`
//! replaces the record list wholesale; nothing edits it in place and stats are
//! never derived locally.

use facecheck_api::{
    ApiError, AttendanceClient, AttendanceRecord, AttendanceStats, HistoryQuery,
};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Source of history and stats.
pub trait HistoryBackend: Send + Sync {
    fn fetch_history(
        &self,
        query: &HistoryQuery,
    ) -> impl Future<Output = Result<Vec<AttendanceRecord>, ApiError>> + Send;

    fn fetch_stats(&self) -> impl Future<Output = Result<AttendanceStats, ApiError>> + Send;
}

impl HistoryBackend for AttendanceClient {
    async fn fetch_history(&self, query: &HistoryQuery) -> Result<Vec<AttendanceRecord>, ApiError> {
        self.history(query).await
    }

    async fn fetch_stats(&self) -> Result<AttendanceStats, ApiError> {
        self.stats().await
    }
}

struct HistoryState {
    records: Arc<[AttendanceRecord]>,
    records_seq: u64,
    stats: Option<AttendanceStats>,
    stats_seq: u64,
}

impl HistoryState {
    fn empty() -> Self {
        Self {
            records: Arc::from(Vec::new()),
            records_seq: 0,
            stats: None,
            stats_seq: 0,
        }
    }
}

pub struct HistoryCache<B> {
    backend: B,
    state: Mutex<HistoryState>,
    seq: AtomicU64,
}

impl<B: HistoryBackend> HistoryCache<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            state: Mutex::new(HistoryState::empty()),
            seq: AtomicU64::new(0),
        }
    }

    /// Fetch history and replace the cached records.
    ///
    /// Always returns the records fetched for `query`. If a newer refresh
    /// already committed by the time this one returns, the cache keeps the
    /// newer records and this response is not stored.
    pub async fn refresh(&self, query: &HistoryQuery) -> Result<Arc<[AttendanceRecord]>, ApiError> {
        let seq = self.next_seq();
        let records: Arc<[AttendanceRecord]> = self.backend.fetch_history(query).await?.into();

        let mut state = self.lock();
        if seq < state.records_seq {
            tracing::debug!(seq, latest = state.records_seq, "older history response not cached");
            return Ok(records);
        }
        state.records = Arc::clone(&records);
        state.records_seq = seq;
        tracing::debug!(count = records.len(), "history cache replaced");
        Ok(records)
    }

    /// Fetch stats from the backend and cache them verbatim.
    ///
    /// A response older than the cached stats is returned but not stored.
    pub async fn refresh_stats(&self) -> Result<AttendanceStats, ApiError> {
        let seq = self.next_seq();
        let stats = self.backend.fetch_stats().await?;

        let mut state = self.lock();
        if seq < state.stats_seq {
            tracing::debug!(seq, latest = state.stats_seq, "older stats response not cached");
            return Ok(stats);
        }
        state.stats = Some(stats.clone());
        state.stats_seq = seq;
        Ok(stats)
    }

    pub fn records(&self) -> Arc<[AttendanceRecord]> {
        Arc::clone(&self.lock().records)
    }

    pub fn stats(&self) -> Option<AttendanceStats> {
        self.lock().stats.clone()
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn lock(&self) -> MutexGuard<'_, HistoryState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facecheck_api::{AttendanceStatus, StatusCode};
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;

    struct Canned {
        gate: Option<oneshot::Receiver<()>>,
        result: Result<Vec<AttendanceRecord>, ApiError>,
    }

    #[derive(Default)]
    struct FakeBackend {
        history: Mutex<VecDeque<Canned>>,
        stats: Mutex<Option<AttendanceStats>>,
        calls: Arc<AtomicUsize>,
    }

    impl FakeBackend {
        fn push(&self, result: Result<Vec<AttendanceRecord>, ApiError>) {
            self.history.lock().unwrap().push_back(Canned { gate: None, result });
        }

        fn push_gated(&self, gate: oneshot::Receiver<()>, records: Vec<AttendanceRecord>) {
            self.history.lock().unwrap().push_back(Canned {
                gate: Some(gate),
                result: Ok(records),
            });
        }
    }

    impl HistoryBackend for FakeBackend {
        async fn fetch_history(&self, _query: &HistoryQuery) -> Result<Vec<AttendanceRecord>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let canned = self.history.lock().unwrap().pop_front().expect("unexpected history call");
            if let Some(gate) = canned.gate {
                let _ = gate.await;
            }
            canned.result
        }

        async fn fetch_stats(&self) -> Result<AttendanceStats, ApiError> {
            self.stats.lock().unwrap().clone().ok_or(ApiError::Rejected {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "Failed to fetch attendance stats".into(),
            })
        }
    }

    fn rec(date: &str, status: &str) -> AttendanceRecord {
        serde_json::from_value(serde_json::json!({"date": date, "status": status})).unwrap()
    }

    #[tokio::test]
    async fn test_refresh_exposes_records_in_order() {
        let backend = FakeBackend::default();
        backend.push(Ok(vec![rec("2024-01-05", "present"), rec("2024-01-06", "absent")]));
        let cache = HistoryCache::new(backend);

        cache.refresh(&HistoryQuery::default()).await.unwrap();
        let records = cache.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].date.unwrap().to_string(), "2024-01-05");
        assert_eq!(records[0].status, AttendanceStatus::Present);
        assert_eq!(records[1].date.unwrap().to_string(), "2024-01-06");
        assert_eq!(records[1].status, AttendanceStatus::Absent);
    }

    #[tokio::test]
    async fn test_refresh_replaces_wholesale() {
        let backend = FakeBackend::default();
        backend.push(Ok(vec![rec("2024-01-05", "present"), rec("2024-01-06", "absent")]));
        backend.push(Ok(vec![rec("2024-01-07", "late")]));
        let cache = HistoryCache::new(backend);

        cache.refresh(&HistoryQuery::default()).await.unwrap();
        cache.refresh(&HistoryQuery::default()).await.unwrap();
        let records = cache.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, AttendanceStatus::Late);
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_records() {
        let backend = FakeBackend::default();
        backend.push(Ok(vec![rec("2024-01-05", "present")]));
        backend.push(Err(ApiError::Unauthorized { detail: None }));
        let cache = HistoryCache::new(backend);

        cache.refresh(&HistoryQuery::default()).await.unwrap();
        let err = cache.refresh(&HistoryQuery::default()).await.unwrap_err();
        assert!(err.requires_reauth());
        assert_eq!(cache.records().len(), 1);
    }

    #[tokio::test]
    async fn test_stats_are_backend_values() {
        let backend = FakeBackend::default();
        backend.push(Ok(vec![rec("2024-01-05", "present"), rec("2024-01-06", "absent")]));
        *backend.stats.lock().unwrap() = Some(AttendanceStats {
            attendance_rate: 50.0,
            days_present: 1,
            current_streak: 0,
        });
        let cache = HistoryCache::new(backend);
        assert!(cache.stats().is_none());

        cache.refresh(&HistoryQuery::default()).await.unwrap();
        let stats = cache.refresh_stats().await.unwrap();
        assert_eq!(stats.attendance_rate, 50.0);
        assert_eq!(stats.days_present, 1);
        assert_eq!(stats.current_streak, 0);
        assert_eq!(cache.stats(), Some(stats));
    }

    #[tokio::test]
    async fn test_out_of_order_response_is_not_cached() {
        let backend = FakeBackend::default();
        let calls = Arc::clone(&backend.calls);
        let (release, gate) = oneshot::channel();
        backend.push_gated(gate, vec![rec("2024-01-01", "absent")]);
        backend.push(Ok(vec![rec("2024-01-02", "present")]));
        let cache = Arc::new(HistoryCache::new(backend));

        let slow = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.refresh(&HistoryQuery::default()).await })
        };
        while calls.load(Ordering::SeqCst) < 1 {
            tokio::task::yield_now().await;
        }

        cache.refresh(&HistoryQuery::default()).await.unwrap();
        release.send(()).unwrap();
        let returned = slow.await.unwrap().unwrap();

        assert_eq!(returned.len(), 1);
        assert_eq!(returned[0].status, AttendanceStatus::Absent);
        let records = cache.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, AttendanceStatus::Present);
    }
}
