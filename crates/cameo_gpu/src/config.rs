//! Device selection
//!
//! Env:
//! - `CAMEO_WGPU_BACKEND=vulkan|metal|dx12|gl`
//! - `CAMEO_WGPU_FALLBACK=1` forces the software adapter
//! - `CAMEO_WGPU_LOW_POWER=1` prefers the integrated GPU

use cameo_core::PixelSize;

fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

/// Native backend for the current platform
///
/// Requesting only the primary backend avoids initializing several driver
/// stacks.
pub fn preferred_backends() -> wgpu::Backends {
    #[cfg(target_os = "macos")]
    {
        wgpu::Backends::METAL
    }
    #[cfg(target_os = "windows")]
    {
        wgpu::Backends::DX12
    }
    #[cfg(target_os = "linux")]
    {
        wgpu::Backends::VULKAN
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    {
        wgpu::Backends::PRIMARY
    }
}

#[derive(Clone, Debug)]
pub struct GpuConfig {
    pub backends: wgpu::Backends,
    pub power_preference: wgpu::PowerPreference,
    pub force_fallback_adapter: bool,
    /// Initial size of the default target
    pub output_size: PixelSize,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            backends: preferred_backends(),
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            output_size: PixelSize::new(1280, 720),
        }
    }
}

impl GpuConfig {
    pub fn with_output_size(mut self, size: PixelSize) -> Self {
        self.output_size = size;
        self
    }

    /// Apply `CAMEO_WGPU_*` environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("CAMEO_WGPU_BACKEND") {
            match v.trim().to_ascii_lowercase().as_str() {
                "vulkan" => self.backends = wgpu::Backends::VULKAN,
                "metal" => self.backends = wgpu::Backends::METAL,
                "dx12" => self.backends = wgpu::Backends::DX12,
                "gl" => self.backends = wgpu::Backends::GL,
                "all" => self.backends = wgpu::Backends::all(),
                other => tracing::warn!("Ignoring CAMEO_WGPU_BACKEND={}", other),
            }
        }
        if let Some(v) = env_bool("CAMEO_WGPU_FALLBACK") {
            self.force_fallback_adapter = v;
        }
        if env_bool("CAMEO_WGPU_LOW_POWER") == Some(true) {
            self.power_preference = wgpu::PowerPreference::LowPower;
        }
        self
    }

    pub fn log(&self) {
        tracing::info!(
            "gpu config: backends={:?}, power_preference={:?}, fallback={}, output={}x{}",
            self.backends,
            self.power_preference,
            self.force_fallback_adapter,
            self.output_size.width,
            self.output_size.height
        );
    }
}

/// Optional features the backend uses when the adapter has them
pub(crate) fn wanted_features(adapter: &wgpu::Adapter) -> wgpu::Features {
    let timing = wgpu::Features::TIMESTAMP_QUERY | wgpu::Features::TIMESTAMP_QUERY_INSIDE_ENCODERS;
    if adapter.features().contains(timing) {
        timing
    } else {
        tracing::debug!("Adapter lacks timestamp queries, GPU timing disabled");
        wgpu::Features::empty()
    }
}

/// Default limits, with the texture size raised to what the adapter supports
pub(crate) fn required_limits(adapter: &wgpu::Adapter) -> wgpu::Limits {
    let supported = adapter.limits();
    let mut limits = wgpu::Limits::default();
    limits.max_texture_dimension_2d = supported.max_texture_dimension_2d;
    tracing::debug!(
        "wgpu limits: max_texture_dimension_2d={}, min_uniform_buffer_offset_alignment={}",
        limits.max_texture_dimension_2d,
        limits.min_uniform_buffer_offset_alignment
    );
    limits
}
