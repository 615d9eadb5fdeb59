use crate::context::GpuContext;
use crate::error::Result;
use bytemuck::Pod;
use futures::channel::oneshot;
use std::marker::PhantomData;
use wgpu::util::DeviceExt;

/// How the words of a [`RawBuffer`] are to be interpreted when read back or
/// colour mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    U32,
    I32,
    F32,
    /// Order-preserving fixed point written by the trajectory kernel.
    FixedPoint,
    TileId,
}

impl ElementKind {
    /// Numeric tag shared with shaders.
    pub fn shader_tag(self) -> u32 {
        match self {
            ElementKind::U32 | ElementKind::TileId => 0,
            ElementKind::I32 => 1,
            ElementKind::F32 => 2,
            ElementKind::FixedPoint => 3,
        }
    }
}

/// Element types a [`RawBuffer`] may hold.
pub trait GpuElement: Pod + Send + Sync {
    const KIND: ElementKind;
}

impl GpuElement for u32 {
    const KIND: ElementKind = ElementKind::U32;
}

impl GpuElement for i32 {
    const KIND: ElementKind = ElementKind::I32;
}

impl GpuElement for f32 {
    const KIND: ElementKind = ElementKind::F32;
}

/// A uniform block and its CPU copy.
pub struct Buffer<T: Pod> {
    pub data: T,
    buffer: wgpu::Buffer,
}

impl<T: Pod> Buffer<T> {
    pub fn new(ctx: &GpuContext, label: &str, data: T) -> Self {
        let buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::bytes_of(&data),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        Self { data, buffer }
    }

    pub fn update_gpu_data(&self, queue: &wgpu::Queue) {
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(&self.data));
    }

    pub fn binding(&self) -> wgpu::BindingResource<'_> {
        self.buffer.as_entire_binding()
    }
}

/// A storage buffer of `len` elements.
pub struct RawBuffer<T: GpuElement> {
    buffer: wgpu::Buffer,
    len: usize,
    kind: ElementKind,
    _marker: PhantomData<T>,
}

impl<T: GpuElement> RawBuffer<T> {
    pub fn new(ctx: &GpuContext, label: &str, len: usize, usage: wgpu::BufferUsages) -> Self {
        let len = len.max(1);
        let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: (len * std::mem::size_of::<T>()) as u64,
            usage: usage | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Self { buffer, len, kind: T::KIND, _marker: PhantomData }
    }

    pub fn storage(ctx: &GpuContext, label: &str, len: usize) -> Self {
        Self::new(ctx, label, len, wgpu::BufferUsages::STORAGE)
    }

    /// Overrides the interpretation of the stored words.
    pub fn with_kind(mut self, kind: ElementKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn size_in_bytes(&self) -> u64 {
        self.buffer.size()
    }

    pub fn raw(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn binding(&self) -> wgpu::BindingResource<'_> {
        self.buffer.as_entire_binding()
    }

    pub fn write(&self, queue: &wgpu::Queue, data: &[T]) {
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(data));
    }

    pub fn clear(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.clear_buffer(&self.buffer, 0, None);
    }

    /// Copies the buffer to a staging buffer and waits for the mapping.
    pub async fn read_back(&self, ctx: &GpuContext) -> Result<Vec<T>> {
        let staging = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("read back staging"),
            size: self.buffer.size(),
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("read back") });
        encoder.copy_buffer_to_buffer(&self.buffer, 0, &staging, 0, self.buffer.size());
        ctx.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        ctx.poll_until(rx).await??;

        let values = bytemuck::pod_collect_to_vec(&slice.get_mapped_range());
        staging.unmap();
        Ok(values)
    }
}

impl RawBuffer<u32> {
    /// Reads the buffer back as floats according to its [`ElementKind`].
    pub async fn read_back_f32(&self, ctx: &GpuContext) -> Result<Vec<f32>> {
        let words = self.read_back(ctx).await?;
        Ok(words.into_iter().map(|w| decode_word(self.kind, w)).collect())
    }
}

pub fn decode_word(kind: ElementKind, word: u32) -> f32 {
    match kind {
        ElementKind::U32 | ElementKind::TileId => word as f32,
        ElementKind::I32 => word as i32 as f32,
        ElementKind::F32 => f32::from_bits(word),
        ElementKind::FixedPoint => crate::kernel::decode_fixed(word),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::context;

    #[test]
    fn words_decode_by_kind() {
        assert_eq!(decode_word(ElementKind::U32, 7), 7.0);
        assert_eq!(decode_word(ElementKind::I32, (-3i32) as u32), -3.0);
        assert_eq!(decode_word(ElementKind::F32, 1.5f32.to_bits()), 1.5);
        assert_eq!(decode_word(ElementKind::FixedPoint, 0), 0.0);
    }

    #[tokio::test]
    async fn written_values_read_back() {
        let Some(ctx) = context().await else { return };
        let buffer = RawBuffer::<u32>::storage(&ctx, "test", 4);
        buffer.write(&ctx.queue, &[1, 2, 3, 4]);
        assert_eq!(buffer.read_back(&ctx).await.unwrap(), vec![1, 2, 3, 4]);
    }
}
