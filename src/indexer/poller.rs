// src/indexer/poller.rs
//! Last-good retention for periodic indexer queries

use crate::error::QueryError;

/// Latest outcome of a periodic query. A failure never discards data that
/// was fetched earlier; it only sets `error` until the next success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Polled<T> {
    pub data: Option<T>,
    pub error: Option<QueryError>,
    /// Unix time of the last successful poll
    pub updated_at: Option<i64>,
}

impl<T> Default for Polled<T> {
    fn default() -> Self {
        Self {
            data: None,
            error: None,
            updated_at: None,
        }
    }
}

impl<T> Polled<T> {
    pub fn apply(&mut self, result: Result<T, QueryError>, now: i64) {
        match result {
            Ok(data) => {
                self.data = Some(data);
                self.error = None;
                self.updated_at = Some(now);
            }
            Err(e) => {
                log::warn!("Indexer poll failed: {}", e);
                self.error = Some(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failures_keep_last_good_data() {
        let mut polled: Polled<u32> = Polled::default();
        polled.apply(Ok(7), 100);
        polled.apply(Err(QueryError::Status(502)), 130);
        polled.apply(Err(QueryError::Unreachable("refused".into())), 160);

        assert_eq!(polled.data, Some(7));
        assert_eq!(polled.updated_at, Some(100));
        assert_eq!(polled.error, Some(QueryError::Unreachable("refused".into())));

        polled.apply(Ok(8), 190);
        assert_eq!(polled.data, Some(8));
        assert!(polled.error.is_none());
    }

    #[test]
    fn test_failure_before_any_success() {
        let mut polled: Polled<u32> = Polled::default();
        polled.apply(Err(QueryError::GraphQl("boom".into())), 1);
        assert!(polled.data.is_none());
        assert!(polled.error.is_some());
    }
}
