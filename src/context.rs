//! Execution context: adapter selection, device creation and checked submission.

use std::path::PathBuf;

use log::{debug, info};

use crate::error::{Result, SortError};

/// How to pick the adapter. Device choice is left to the caller; the
/// defaults take whatever high-performance adapter the system offers.
#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub backends: wgpu::Backends,
    pub power_preference: wgpu::PowerPreference,
    pub force_fallback_adapter: bool,
    /// Directory for a wgpu API trace, if any.
    pub trace_dir: Option<PathBuf>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            backends: wgpu::Backends::all(),
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            trace_dir: None,
        }
    }
}

impl ContextConfig {
    /// Reads `WGPU_BACKEND`, `WGPU_POWER_PREF`, `WGPU_FORCE_FALLBACK_ADAPTER`
    /// and `WGPU_TRACE`. Unset or unparsable variables keep the default.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(list) = std::env::var("WGPU_BACKEND") {
            if let Some(backends) = parse_backends(&list) {
                config.backends = backends;
            }
        }

        if let Ok(pref) = std::env::var("WGPU_POWER_PREF") {
            config.power_preference = match pref.to_lowercase().as_str() {
                "low" => wgpu::PowerPreference::LowPower,
                "none" => wgpu::PowerPreference::None,
                _ => wgpu::PowerPreference::HighPerformance,
            };
        }

        if let Ok(flag) = std::env::var("WGPU_FORCE_FALLBACK_ADAPTER") {
            config.force_fallback_adapter = matches!(flag.as_str(), "1" | "true" | "yes");
        }

        config.trace_dir = std::env::var("WGPU_TRACE").ok().map(PathBuf::from);
        config
    }
}

/// Parses a comma separated backend list like "vulkan,metal".
pub fn parse_backends(list: &str) -> Option<wgpu::Backends> {
    let mut backends = wgpu::Backends::empty();
    for name in list.split(',').map(|s| s.trim().to_lowercase()) {
        backends |= match name.as_str() {
            "vulkan" | "vk" => wgpu::Backends::VULKAN,
            "metal" | "mtl" => wgpu::Backends::METAL,
            "dx12" | "d3d12" => wgpu::Backends::DX12,
            "gl" | "gles" | "opengl" => wgpu::Backends::GL,
            "webgpu" => wgpu::Backends::BROWSER_WEBGPU,
            "primary" => wgpu::Backends::PRIMARY,
            "all" => wgpu::Backends::all(),
            "" => continue,
            _ => return None,
        };
    }
    if backends.is_empty() {
        None
    } else {
        Some(backends)
    }
}

/// The opaque device handle every public operation takes.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
}

impl GpuContext {
    /// Creates a context configured from the environment.
    pub async fn new() -> Result<Self> {
        Self::with_config(&ContextConfig::from_env()).await
    }

    /// Blocking version of [`GpuContext::new`].
    pub fn new_blocking() -> Result<Self> {
        futures::executor::block_on(Self::new())
    }

    pub async fn with_config(config: &ContextConfig) -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: config.backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: config.power_preference,
                force_fallback_adapter: config.force_fallback_adapter,
                compatible_surface: None,
            })
            .await
            .ok_or(SortError::AdapterNotFound)?;

        let adapter_info = adapter.get_info();
        info!(
            "Using adapter '{}' ({:?}, {:?})",
            adapter_info.name, adapter_info.backend, adapter_info.device_type
        );

        // The adapter's own limits; the defaults cap storage bindings at 128 MiB.
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("gpu_radix device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                config.trace_dir.as_deref(),
            )
            .await?;

        Ok(Self {
            device,
            queue,
            adapter_info,
        })
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    pub fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }

    /// Fails with [`SortError::Capacity`] when `required > limit`.
    pub(crate) fn check_capacity(resource: &'static str, required: u64, limit: u64) -> Result<()> {
        if required > limit {
            return Err(SortError::Capacity {
                resource,
                required,
                limit,
            });
        }
        Ok(())
    }

    /// Checks that a storage buffer of `bytes` can be created and bound.
    pub(crate) fn check_storage_size(&self, resource: &'static str, bytes: u64) -> Result<()> {
        let limits = self.limits();
        Self::check_capacity(resource, bytes, limits.max_buffer_size)?;
        Self::check_capacity(resource, bytes, limits.max_storage_buffer_binding_size as u64)
    }

    /// Runs `record` inside validation and out-of-memory error scopes, then
    /// waits for the device to go idle. Anything the device complained about
    /// while recording, submitting or executing comes back as
    /// [`SortError::Execution`].
    pub(crate) async fn scoped<T>(&self, record: impl FnOnce(&Self) -> T) -> Result<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let value = record(self);
        let _ = self.device.poll(wgpu::Maintain::Wait);

        let validation = self.device.pop_error_scope().await;
        let out_of_memory = self.device.pop_error_scope().await;
        if let Some(error) = validation.or(out_of_memory) {
            return Err(SortError::Execution(error.to_string()));
        }
        Ok(value)
    }

    /// Finishes `encoder` and submits it to the queue.
    pub(crate) fn submit(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(Some(encoder.finish()));
        debug!("Submitted command buffer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_lists() {
        assert_eq!(parse_backends("vulkan"), Some(wgpu::Backends::VULKAN));
        assert_eq!(
            parse_backends("Metal, dx12"),
            Some(wgpu::Backends::METAL | wgpu::Backends::DX12)
        );
        assert_eq!(parse_backends("all"), Some(wgpu::Backends::all()));
        assert_eq!(parse_backends("vulkan,,"), Some(wgpu::Backends::VULKAN));
    }

    #[test]
    fn rejects_unknown_backends() {
        assert_eq!(parse_backends("glide"), None);
        assert_eq!(parse_backends(""), None);
    }

    #[test]
    fn capacity_check() {
        assert!(GpuContext::check_capacity("keys", 10, 10).is_ok());
        match GpuContext::check_capacity("keys", 11, 10) {
            Err(SortError::Capacity { resource, required, limit }) => {
                assert_eq!(resource, "keys");
                assert_eq!(required, 11);
                assert_eq!(limit, 10);
            }
            other => panic!("expected capacity error, got {:?}", other),
        }
    }
}
