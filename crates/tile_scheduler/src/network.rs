use chrono::{DateTime, Utc};

/// Outcome of one tile request, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Status {
    Good,
    NotFound,
    NetworkError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkInfo {
    pub status: Status,
    pub timestamp: DateTime<Utc>,
}

impl NetworkInfo {
    pub fn now(status: Status) -> Self {
        Self { status, timestamp: Utc::now() }
    }

    /// Worst status wins; the timestamp is that of the oldest part.
    pub fn join(infos: impl IntoIterator<Item = NetworkInfo>) -> Option<NetworkInfo> {
        infos.into_iter().reduce(|a, b| NetworkInfo {
            status: a.status.max(b.status),
            timestamp: a.timestamp.min(b.timestamp),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn join_takes_worst_status_and_oldest_time() {
        let t0 = Utc::now();
        let a = NetworkInfo { status: Status::Good, timestamp: t0 };
        let b = NetworkInfo { status: Status::NotFound, timestamp: t0 - Duration::seconds(5) };
        let c = NetworkInfo { status: Status::NetworkError, timestamp: t0 + Duration::seconds(5) };

        let ab = NetworkInfo::join([a, b]).unwrap();
        assert_eq!(ab.status, Status::NotFound);
        assert_eq!(ab.timestamp, t0 - Duration::seconds(5));
        assert_eq!(NetworkInfo::join([a, b, c]).unwrap().status, Status::NetworkError);
        assert!(NetworkInfo::join([]).is_none());
    }
}
