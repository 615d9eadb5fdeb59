use crate::context::GpuContext;
use crate::error::{ComputeError, Result};
use crate::node::{Data, DataType, Inputs, Node, SocketSpec};
use crate::texture::TextureWithSampler;
use futures::future::BoxFuture;
use glam::UVec2;
use std::path::PathBuf;
use std::sync::Arc;

const OUTPUTS: &[SocketSpec] = &[SocketSpec::new("texture", DataType::Texture)];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTextureSettings {
    pub file_path: PathBuf,
}

/// Reads a PNG or JPEG from disk into an RGBA8 texture, for example a
/// hand-drawn release point mask.
pub struct LoadTextureNode {
    ctx: Arc<GpuContext>,
    settings: LoadTextureSettings,
    output: Option<Arc<TextureWithSampler>>,
}

impl LoadTextureNode {
    pub fn new(ctx: Arc<GpuContext>, settings: LoadTextureSettings) -> Self {
        Self { ctx, settings, output: None }
    }

    async fn run_impl(&mut self) -> Result<()> {
        let path = &self.settings.file_path;
        let encoded = tokio::fs::read(path).await?;
        let image = image::load_from_memory(&encoded)?.to_rgba8();
        let size = UVec2::new(image.width(), image.height());
        if size.min_element() == 0 {
            return Err(ComputeError::InvalidInput(format!("{} holds an empty image", path.display())));
        }
        let texture = TextureWithSampler::new(&self.ctx, "loaded texture", size, wgpu::TextureFormat::Rgba8Unorm);
        texture.write(&self.ctx, image.as_raw());
        tracing::debug!(path = %path.display(), %size, "texture loaded");
        self.output = Some(Arc::new(texture));
        Ok(())
    }
}

impl Node for LoadTextureNode {
    fn inputs(&self) -> &'static [SocketSpec] {
        &[]
    }

    fn outputs(&self) -> &'static [SocketSpec] {
        OUTPUTS
    }

    fn output(&self, index: usize) -> Option<Data> {
        match index {
            0 => self.output.clone().map(Data::Texture),
            _ => None,
        }
    }

    fn run(&mut self, _inputs: Inputs) -> BoxFuture<'_, Result<()>> {
        Box::pin(self.run_impl())
    }
}
