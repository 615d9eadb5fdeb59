use crate::network::{NetworkInfo, Status};
use bytes::Bytes;
use tile_core::Id;

/// One data product per tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Layer {
    Ortho = 0,
    Height = 1,
    Vector = 2,
}

impl Layer {
    pub const ALL: [Layer; 3] = [Layer::Ortho, Layer::Height, Layer::Vector];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Raw payload of a single layer, not interpreted here.
#[derive(Debug, Clone, PartialEq)]
pub struct TileLayer {
    pub id: Id,
    pub network_info: NetworkInfo,
    pub data: Bytes,
}

impl TileLayer {
    pub fn new(id: Id, status: Status, data: Bytes) -> Self {
        Self { id, network_info: NetworkInfo::now(status), data }
    }
}

/// All configured layers of one tile, joined.
#[derive(Debug, Clone, PartialEq)]
pub struct LayeredTile {
    pub id: Id,
    pub network_info: NetworkInfo,
    pub ortho: Bytes,
    pub height: Bytes,
    pub vector: Option<Bytes>,
}

impl LayeredTile {
    pub fn status(&self) -> Status {
        self.network_info.status
    }

    /// Joins the layers received for `id`; any non-Good part clears every body.
    pub fn join(id: Id, ortho: Option<TileLayer>, height: Option<TileLayer>, vector: Option<TileLayer>) -> Self {
        let has_vector = vector.is_some();
        let network_info = NetworkInfo::join(
            [&ortho, &height, &vector].into_iter().flatten().map(|l| l.network_info),
        )
        .unwrap_or_else(|| NetworkInfo::now(Status::NotFound));

        let body = |l: Option<TileLayer>| -> Bytes {
            match (network_info.status, l) {
                (Status::Good, Some(l)) => l.data,
                _ => Bytes::new(),
            }
        };
        Self {
            id,
            network_info,
            ortho: body(ortho),
            height: body(height),
            vector: has_vector.then(|| body(vector)),
        }
    }
}
