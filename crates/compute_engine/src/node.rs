use crate::buffer::RawBuffer;
use crate::error::{ComputeError, Result};
use crate::hash_map::GpuHashMap;
use crate::storage::TileStorageTexture;
use crate::texture::TextureWithSampler;
use bytes::Bytes;
use futures::future::BoxFuture;
use glam::UVec2;
use parking_lot::RwLock;
use std::sync::Arc;
use tile_core::{Aabb2, Aabb3, Id};

/// Type tag of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    TileIds,
    ByteBuffers,
    HashMap,
    TileStorage,
    Texture,
    Buffer,
    Aabb2,
    Aabb3,
    UVec2,
}

/// Value carried along an edge. GPU resources are shared, never copied.
#[derive(Clone)]
pub enum Data {
    TileIds(Arc<Vec<Id>>),
    ByteBuffers(Arc<Vec<Bytes>>),
    HashMap(Arc<RwLock<GpuHashMap>>),
    TileStorage(Arc<RwLock<TileStorageTexture>>),
    Texture(Arc<TextureWithSampler>),
    Buffer(Arc<RawBuffer<u32>>),
    Aabb2(Aabb2),
    Aabb3(Aabb3),
    UVec2(UVec2),
}

impl Data {
    pub fn data_type(&self) -> DataType {
        match self {
            Data::TileIds(_) => DataType::TileIds,
            Data::ByteBuffers(_) => DataType::ByteBuffers,
            Data::HashMap(_) => DataType::HashMap,
            Data::TileStorage(_) => DataType::TileStorage,
            Data::Texture(_) => DataType::Texture,
            Data::Buffer(_) => DataType::Buffer,
            Data::Aabb2(_) => DataType::Aabb2,
            Data::Aabb3(_) => DataType::Aabb3,
            Data::UVec2(_) => DataType::UVec2,
        }
    }
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Data::TileIds(ids) => write!(f, "TileIds({})", ids.len()),
            Data::ByteBuffers(b) => write!(f, "ByteBuffers({})", b.len()),
            Data::Texture(t) => write!(f, "Texture({}, {:?})", t.size, t.format),
            Data::Aabb2(a) => write!(f, "Aabb2({a:?})"),
            Data::Aabb3(a) => write!(f, "Aabb3({a:?})"),
            Data::UVec2(v) => write!(f, "UVec2({v})"),
            other => write!(f, "{:?}", other.data_type()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketSpec {
    pub name: &'static str,
    pub data_type: DataType,
}

impl SocketSpec {
    pub const fn new(name: &'static str, data_type: DataType) -> Self {
        Self { name, data_type }
    }
}

pub fn socket_index(sockets: &[SocketSpec], name: &str) -> Option<usize> {
    sockets.iter().position(|s| s.name == name)
}

/// Input values of one node run, in socket order.
pub struct Inputs {
    sockets: &'static [SocketSpec],
    values: Vec<Data>,
}

macro_rules! typed_input {
    ($fn_name:ident, $variant:ident, $ty:ty) => {
        pub fn $fn_name(&self, name: &str) -> Result<$ty> {
            match self.get(name)? {
                Data::$variant(v) => Ok(v.clone()),
                other => Err(ComputeError::InvalidInput(format!(
                    "input '{name}' carries {:?}, expected {:?}",
                    other.data_type(),
                    DataType::$variant
                ))),
            }
        }
    };
}

impl Inputs {
    pub fn new(sockets: &'static [SocketSpec], values: Vec<Data>) -> Self {
        Self { sockets, values }
    }

    pub fn get(&self, name: &str) -> Result<&Data> {
        socket_index(self.sockets, name)
            .and_then(|i| self.values.get(i))
            .ok_or_else(|| ComputeError::InvalidInput(format!("no input named '{name}'")))
    }

    typed_input!(tile_ids, TileIds, Arc<Vec<Id>>);
    typed_input!(byte_buffers, ByteBuffers, Arc<Vec<Bytes>>);
    typed_input!(hash_map, HashMap, Arc<RwLock<GpuHashMap>>);
    typed_input!(tile_storage, TileStorage, Arc<RwLock<TileStorageTexture>>);
    typed_input!(texture, Texture, Arc<TextureWithSampler>);
    typed_input!(buffer, Buffer, Arc<RawBuffer<u32>>);
    typed_input!(aabb2, Aabb2, Aabb2);
    typed_input!(aabb3, Aabb3, Aabb3);
    typed_input!(uvec2, UVec2, UVec2);
}

/// One unit of work in a [`NodeGraph`](crate::graph::NodeGraph).
///
/// A node publishes its results through [`Node::output`]; an output that has
/// not been produced yet is `None`, and nodes downstream of it are skipped.
pub trait Node: Send {
    fn inputs(&self) -> &'static [SocketSpec];
    fn outputs(&self) -> &'static [SocketSpec];
    fn output(&self, index: usize) -> Option<Data>;
    fn run(&mut self, inputs: Inputs) -> BoxFuture<'_, Result<()>>;
}
