use crate::error::{ComputeError, Result};
use crate::node::{Data, DataType, Inputs, Node, SocketSpec};
use bytes::Bytes;
use futures::future::{join_all, BoxFuture};
use std::sync::Arc;
use tile_core::Id;
use tile_scheduler::network::Status;
use tile_scheduler::TileLoadService;

const INPUTS: &[SocketSpec] = &[SocketSpec::new("tile ids", DataType::TileIds)];
const OUTPUTS: &[SocketSpec] = &[SocketSpec::new("tile data", DataType::ByteBuffers)];

/// Fetches one layer for every id; the output list is parallel to the ids.
/// A run with unavailable tiles fails and publishes no data.
pub struct RequestTilesNode {
    service: Arc<TileLoadService>,
    last_ids: Option<Arc<Vec<Id>>>,
    tile_data: Option<Arc<Vec<Bytes>>>,
}

impl RequestTilesNode {
    pub fn new(service: TileLoadService) -> Self {
        Self { service: Arc::new(service), last_ids: None, tile_data: None }
    }

    /// Switches the source; the next run fetches again.
    pub fn set_service(&mut self, service: TileLoadService) {
        self.service = Arc::new(service);
        self.last_ids = None;
    }

    async fn run_impl(&mut self, inputs: Inputs) -> Result<()> {
        let ids = inputs.tile_ids("tile ids")?;
        if self.tile_data.is_some() && self.last_ids.as_deref() == Some(&*ids) {
            tracing::debug!(tiles = ids.len(), "tile list unchanged, reusing previous data");
            return Ok(());
        }

        let layers = join_all(ids.iter().map(|id| self.service.load(*id))).await;
        let unavailable = layers.iter().filter(|l| l.network_info.status != Status::Good).count();
        if unavailable > 0 {
            self.tile_data = None;
            self.last_ids = None;
            return Err(ComputeError::InvalidInput(format!("{unavailable} of {} tiles are unavailable", ids.len())));
        }
        self.tile_data = Some(Arc::new(layers.into_iter().map(|l| l.data).collect()));
        self.last_ids = Some(ids);
        Ok(())
    }
}

impl Node for RequestTilesNode {
    fn inputs(&self) -> &'static [SocketSpec] {
        INPUTS
    }

    fn outputs(&self) -> &'static [SocketSpec] {
        OUTPUTS
    }

    fn output(&self, _index: usize) -> Option<Data> {
        self.tile_data.clone().map(Data::ByteBuffers)
    }

    fn run(&mut self, inputs: Inputs) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.run_impl(inputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tile_core::Scheme;
    use tile_scheduler::UrlPattern;

    fn node(dir: &std::path::Path) -> RequestTilesNode {
        let base = format!("file://{}/", dir.display());
        RequestTilesNode::new(TileLoadService::new(base, UrlPattern::Zxy, ".png").unwrap())
    }

    fn ids(list: Vec<Id>) -> Inputs {
        Inputs::new(INPUTS, vec![Data::TileIds(Arc::new(list))])
    }

    #[tokio::test]
    async fn data_is_parallel_to_ids_and_cached() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("1/0")).unwrap();
        std::fs::write(dir.path().join("1/0/0.png"), b"first").unwrap();
        std::fs::write(dir.path().join("1/0/1.png"), b"second").unwrap();
        let list = vec![Id::new(1, 0, 1, Scheme::Tms), Id::new(1, 0, 0, Scheme::Tms)];

        let mut node = node(dir.path());
        node.run(ids(list.clone())).await.unwrap();
        let Some(Data::ByteBuffers(data)) = node.output(0) else { panic!("no data") };
        assert_eq!(&data[0][..], b"second");
        assert_eq!(&data[1][..], b"first");

        // unchanged list: served from the previous run even though the files are gone
        std::fs::remove_dir_all(dir.path().join("1")).unwrap();
        node.run(ids(list)).await.unwrap();
    }

    #[tokio::test]
    async fn missing_tiles_fail_with_a_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut node = node(dir.path());
        let err = node.run(ids(vec![Id::root(), Id::new(1, 1, 1, Scheme::Tms)])).await.unwrap_err();
        assert!(err.to_string().contains("2 of 2"), "{err}");
        assert!(node.output(0).is_none());
    }

    #[tokio::test]
    async fn a_failed_run_drops_the_previous_data() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("1/0")).unwrap();
        std::fs::write(dir.path().join("1/0/0.png"), b"first").unwrap();
        let mut node = node(dir.path());
        node.run(ids(vec![Id::new(1, 0, 0, Scheme::Tms)])).await.unwrap();
        assert!(node.output(0).is_some());

        let err = node.run(ids(vec![Id::new(1, 0, 0, Scheme::Tms), Id::new(1, 1, 0, Scheme::Tms)])).await.unwrap_err();
        assert!(err.to_string().contains("1 of 2"), "{err}");
        assert!(node.output(0).is_none());
    }
}
