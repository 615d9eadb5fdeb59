use crate::node::DataType;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("cannot connect {from_node}.{output} ({found:?}) to {to_node}.{input} ({expected:?})")]
    TypeMismatch {
        from_node: String,
        output: String,
        to_node: String,
        input: String,
        expected: DataType,
        found: DataType,
    },
    #[error("input {node}.{socket} is already connected")]
    AlreadyConnected { node: String, socket: String },
    #[error("node {node} has no socket named '{socket}'")]
    SocketNotFound { node: String, socket: String },
    #[error("no node named '{0}' in graph")]
    NodeNotFound(String),
    #[error("a node named '{0}' already exists")]
    DuplicateNode(String),
    #[error("connecting {from_node} to {to_node} would create a cycle")]
    CycleDetected { from_node: String, to_node: String },
    #[error("capacity exceeded: {what} needs {required} slots but only {available} are available")]
    CapacityExceeded { what: String, required: usize, available: usize },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("tile image could not be decoded: {0}")]
    Decode(#[from] image::ImageError),
    #[error("no suitable GPU adapter found")]
    NoAdapter,
    #[error("failed to open GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("buffer mapping failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),
    #[error("gpu: {0}")]
    Gpu(String),
    #[error("background worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
    #[error("pipeline settings: {0}")]
    Settings(#[from] serde_json::Error),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = ComputeError> = std::result::Result<T, E>;
