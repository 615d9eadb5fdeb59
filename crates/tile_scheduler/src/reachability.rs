use crate::error::SchedulerError;
use crate::service::SchedulerCommand;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Periodically checks whether a tile server answers at all and reports
/// transitions to the scheduler service.
#[derive(Debug, Clone)]
pub struct ReachabilityMonitor {
    target: String,
    interval: Duration,
    client: reqwest::Client,
}

impl ReachabilityMonitor {
    pub fn new(target: impl Into<String>, interval: Duration) -> Result<Self, SchedulerError> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(5)).build()?;
        Ok(Self { target: target.into(), interval, client })
    }

    /// Any HTTP answer counts as reachable, even an error status.
    pub async fn check(&self) -> bool {
        match self.target.strip_prefix("file://") {
            Some(path) => tokio::fs::metadata(path).await.is_ok(),
            None => self.client.head(&self.target).send().await.is_ok(),
        }
    }

    pub fn spawn(self, commands: mpsc::Sender<SchedulerCommand>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            let mut last: Option<bool> = None;
            loop {
                ticker.tick().await;
                let reachable = self.check().await;
                if last == Some(reachable) {
                    continue;
                }
                tracing::info!(url = %self.target, reachable, "tile server reachability");
                last = Some(reachable);
                if commands.send(SchedulerCommand::SetNetworkReachability(reachable)).await.is_err() {
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_targets_check_existence() {
        let dir = tempfile::tempdir().unwrap();
        let here = ReachabilityMonitor::new(format!("file://{}", dir.path().display()), Duration::from_secs(1)).unwrap();
        assert!(here.check().await);
        let gone = ReachabilityMonitor::new(format!("file://{}/missing", dir.path().display()), Duration::from_secs(1)).unwrap();
        assert!(!gone.check().await);
    }

    #[tokio::test]
    async fn reports_only_transitions() {
        let dir = tempfile::tempdir().unwrap();
        let monitor = ReachabilityMonitor::new(format!("file://{}", dir.path().display()), Duration::from_millis(10)).unwrap();
        let (tx, mut rx) = mpsc::channel(8);
        let handle = monitor.spawn(tx);

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await.unwrap();
        assert!(matches!(first, Some(SchedulerCommand::SetNetworkReachability(true))));
        assert!(tokio::time::timeout(Duration::from_millis(100), rx.recv()).await.is_err());
        handle.abort();
    }
}
