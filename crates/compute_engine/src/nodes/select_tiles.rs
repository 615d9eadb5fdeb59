use crate::error::Result;
use crate::node::{Data, DataType, Inputs, Node, SocketSpec};
use futures::future::BoxFuture;
use std::sync::Arc;
use tile_core::{srs, Aabb2, Id, Scheme};
use tile_scheduler::tiles_in_region;

pub type TileSelector = Box<dyn Fn() -> Vec<Id> + Send>;

pub enum Selection {
    Region { aabb: Aabb2, zoom_level: u32 },
    /// Region read from the "region aabb" input on every run.
    Input { zoom_level: u32 },
    Custom(TileSelector),
}

/// Produces the TMS tile ids covering a region, and the world bounds of
/// those tiles.
pub struct SelectTilesNode {
    selection: Selection,
    tile_ids: Option<Arc<Vec<Id>>>,
    region: Option<Aabb2>,
}

const INPUTS: &[SocketSpec] = &[SocketSpec::new("region aabb", DataType::Aabb2)];
const OUTPUTS: &[SocketSpec] = &[
    SocketSpec::new("tile ids", DataType::TileIds),
    SocketSpec::new("region aabb", DataType::Aabb2),
];

impl SelectTilesNode {
    pub fn with_region(aabb: Aabb2, zoom_level: u32) -> Self {
        Self::new(Selection::Region { aabb, zoom_level })
    }

    pub fn with_input_region(zoom_level: u32) -> Self {
        Self::new(Selection::Input { zoom_level })
    }

    pub fn with_selector(selector: impl Fn() -> Vec<Id> + Send + 'static) -> Self {
        Self::new(Selection::Custom(Box::new(selector)))
    }

    fn new(selection: Selection) -> Self {
        Self { selection, tile_ids: None, region: None }
    }

    pub fn set_region(&mut self, aabb: Aabb2, zoom_level: u32) {
        self.selection = Selection::Region { aabb, zoom_level };
    }

    fn select(&self, inputs: &Inputs) -> Result<Vec<Id>> {
        Ok(match &self.selection {
            Selection::Region { aabb, zoom_level } => tiles_in_region(aabb, *zoom_level, Scheme::Tms),
            Selection::Input { zoom_level } => tiles_in_region(&inputs.aabb2("region aabb")?, *zoom_level, Scheme::Tms),
            Selection::Custom(selector) => selector().into_iter().map(|id| id.to(Scheme::Tms)).collect(),
        })
    }
}

/// Union of the bounds of `ids`; empty for an empty list.
pub fn tiles_bounds(ids: &[Id]) -> Aabb2 {
    let mut bounds = Aabb2::empty();
    for id in ids {
        bounds.expand_by(&srs::tile_bounds(*id));
    }
    bounds
}

impl Node for SelectTilesNode {
    fn inputs(&self) -> &'static [SocketSpec] {
        match self.selection {
            Selection::Input { .. } => INPUTS,
            _ => &[],
        }
    }

    fn outputs(&self) -> &'static [SocketSpec] {
        OUTPUTS
    }

    fn output(&self, index: usize) -> Option<Data> {
        match index {
            0 => self.tile_ids.clone().map(Data::TileIds),
            1 => self.region.map(Data::Aabb2),
            _ => None,
        }
    }

    fn run(&mut self, inputs: Inputs) -> BoxFuture<'_, Result<()>> {
        let mut ids = match self.select(&inputs) {
            Ok(ids) => ids,
            Err(e) => return Box::pin(async move { Err(e) }),
        };
        ids.sort();
        ids.dedup();
        if ids.is_empty() {
            tracing::warn!("tile selection is empty");
        }
        self.region = Some(tiles_bounds(&ids));
        self.tile_ids = Some(Arc::new(ids));
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec2;

    #[tokio::test]
    async fn region_selection_outputs_tile_aligned_bounds() {
        let tile = srs::tile_bounds(Id::new(4, 8, 8, Scheme::Tms));
        let inner = Aabb2::new(tile.min + DVec2::splat(10.0), tile.max - DVec2::splat(10.0));
        let mut node = SelectTilesNode::with_region(inner, 5);
        node.run(Inputs::new(&[], Vec::new())).await.unwrap();

        let Some(Data::TileIds(ids)) = node.output(0) else { panic!("no ids") };
        assert_eq!(ids.len(), 4);
        let Some(Data::Aabb2(bounds)) = node.output(1) else { panic!("no bounds") };
        assert!((bounds.min - tile.min).abs().max_element() < 1e-6);
        assert!((bounds.max - tile.max).abs().max_element() < 1e-6);
    }

    #[tokio::test]
    async fn input_region_is_selected_at_run_time() {
        let tile = srs::tile_bounds(Id::new(4, 8, 8, Scheme::Tms));
        let mut node = SelectTilesNode::with_input_region(4);
        assert_eq!(node.inputs(), INPUTS);
        let inner = Aabb2::new(tile.min + DVec2::splat(10.0), tile.max - DVec2::splat(10.0));
        node.run(Inputs::new(INPUTS, vec![Data::Aabb2(inner)])).await.unwrap();
        let Some(Data::TileIds(ids)) = node.output(0) else { panic!("no ids") };
        assert_eq!(*ids, vec![Id::new(4, 8, 8, Scheme::Tms)]);
    }

    #[tokio::test]
    async fn custom_selectors_are_normalised_to_tms() {
        let mut node = SelectTilesNode::with_selector(|| vec![Id::new(1, 0, 0, Scheme::SlippyMap), Id::new(1, 0, 1, Scheme::Tms)]);
        node.run(Inputs::new(&[], Vec::new())).await.unwrap();
        let Some(Data::TileIds(ids)) = node.output(0) else { panic!("no ids") };
        assert_eq!(*ids, vec![Id::new(1, 0, 1, Scheme::Tms)]);
    }
}
