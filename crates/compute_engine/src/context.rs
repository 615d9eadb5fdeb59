use crate::error::{ComputeError, Result};
use futures::channel::oneshot;
use std::sync::Arc;

/// Device and queue for headless compute work. Shared by every node of a graph.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    /// Opens the default high-performance adapter without a surface.
    pub async fn new_headless() -> Result<Arc<Self>> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(ComputeError::NoAdapter)?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Compute Device"),
                    required_features: wgpu::Features::empty(),
                    // Large regions need the adapter's full texture and buffer limits.
                    required_limits: adapter.limits(),
                },
                None,
            )
            .await?;

        let adapter_info = adapter.get_info();
        tracing::info!(adapter = %adapter_info.name, backend = ?adapter_info.backend, "GPU context ready");
        Ok(Arc::new(Self { device, queue, adapter_info }))
    }

    /// Blocking variant for callers outside an async runtime.
    pub fn new_headless_blocking() -> Result<Arc<Self>> {
        pollster::block_on(Self::new_headless())
    }

    /// Resolves once everything submitted so far has finished on the GPU.
    pub async fn submitted_work_done(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.queue.on_submitted_work_done(move || {
            let _ = tx.send(());
        });
        self.poll_until(rx).await
    }

    /// Drives device callbacks cooperatively until `rx` fires, yielding to the
    /// executor between polls instead of blocking the thread.
    pub(crate) async fn poll_until<T>(&self, mut rx: oneshot::Receiver<T>) -> Result<T> {
        loop {
            self.device.poll(wgpu::Maintain::Poll);
            match rx.try_recv() {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => tokio::task::yield_now().await,
                Err(_) => return Err(ComputeError::Gpu("device callback dropped".into())),
            }
        }
    }

    pub fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Headless context, or `None` on machines without an adapter.
    pub(crate) async fn context() -> Option<Arc<GpuContext>> {
        match GpuContext::new_headless().await {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                eprintln!("skipping GPU test: {e}");
                None
            }
        }
    }

    #[tokio::test]
    async fn work_done_resolves() {
        let Some(ctx) = context().await else { return };
        ctx.queue.submit(std::iter::empty());
        ctx.submitted_work_done().await.unwrap();
    }
}
