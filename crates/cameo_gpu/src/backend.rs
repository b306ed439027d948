//! [`RenderBackend`] on a wgpu device
//!
//! The default target is an offscreen texture; hosts that present to a
//! surface copy [`WgpuBackend::output_texture`] into their swapchain. Work is
//! recorded into one command encoder per frame and submitted by
//! [`RenderBackend::end_frame`] or a readback.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use slotmap::SlotMap;

use cameo_core::{
    BackendError, Capabilities, Color, DrawCall, Geometry, ImageData, PixelSize, ProgramId,
    ProgramSource, QueryId, QueryStatus, RenderBackend, TargetHandles, TargetId, TextureId,
    VertexLayout,
};

use crate::arena::UniformArena;
use crate::config::{required_limits, wanted_features, GpuConfig};
use crate::error::GpuError;
use crate::pipeline::{GpuProgram, Layouts, TEXTURE_FORMAT};
use crate::timer::TimestampTimer;

/// Parameter blocks are padded so shaders may declare any block up to this size
const PARAMS_MIN_SIZE: u64 = 256;

const TEXTURE_USAGE: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING
    .union(wgpu::TextureUsages::COPY_DST)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::RENDER_ATTACHMENT);

/// Row pitch of a texture-to-buffer copy
fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// Drop the per-row padding of a readback
fn copy_tight_rows(padded: &[u8], size: PixelSize) -> Vec<u8> {
    let row = size.width as usize * 4;
    let pitch = padded_bytes_per_row(size.width) as usize;
    let mut out = Vec::with_capacity(row * size.height as usize);
    for y in 0..size.height as usize {
        out.extend_from_slice(&padded[y * pitch..y * pitch + row]);
    }
    out
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: PixelSize,
}

impl GpuTexture {
    fn new(device: &wgpu::Device, size: PixelSize, label: &str) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: TEXTURE_USAGE,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view, size }
    }

    fn write(&self, queue: &wgpu::Queue, rgba: &[u8]) {
        queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(self.size.width * 4),
                rows_per_image: Some(self.size.height),
            },
            wgpu::Extent3d {
                width: self.size.width,
                height: self.size.height,
                depth_or_array_layers: 1,
            },
        );
    }
}

struct GpuTarget {
    texture: TextureId,
    alpha: bool,
}

/// Objects tied to one device; rebuilt by [`WgpuBackend::recover`]
struct DeviceState {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    caps: Capabilities,
    layouts: Layouts,
    sampler: wgpu::Sampler,
    output: GpuTexture,
    /// Bound when a draw has no contents
    empty: GpuTexture,
    /// Bound when a draw has no mask
    opaque: GpuTexture,
    arena: UniformArena,
}

pub struct WgpuBackend {
    config: GpuConfig,
    instance: wgpu::Instance,
    state: DeviceState,
    textures: SlotMap<TextureId, GpuTexture>,
    targets: SlotMap<TargetId, GpuTarget>,
    programs: SlotMap<ProgramId, GpuProgram>,
    timers: SlotMap<QueryId, TimestampTimer>,
    /// Timers whose resolve is in the unsubmitted encoder
    resolving: Vec<QueryId>,
    bound: Option<ProgramId>,
    encoder: Option<wgpu::CommandEncoder>,
    lost: Arc<AtomicBool>,
    error: Arc<Mutex<Option<BackendError>>>,
}

impl WgpuBackend {
    /// Open a device, blocking until the adapter and device are ready
    pub fn new(config: GpuConfig) -> Result<Self, GpuError> {
        pollster::block_on(Self::new_async(config))
    }

    pub async fn new_async(config: GpuConfig) -> Result<Self, GpuError> {
        config.log();
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: config.backends,
            ..Default::default()
        });
        let lost = Arc::new(AtomicBool::new(false));
        let error = Arc::new(Mutex::new(None));
        let state = open_device(&instance, &config, &lost, &error).await?;
        Ok(Self {
            config,
            instance,
            state,
            textures: SlotMap::with_key(),
            targets: SlotMap::with_key(),
            programs: SlotMap::with_key(),
            timers: SlotMap::with_key(),
            resolving: Vec::new(),
            bound: None,
            encoder: None,
            lost,
            error,
        })
    }

    /// Open a fresh device after the previous one was lost
    ///
    /// Every texture, target, program and query handle is invalidated; the
    /// compositor must be told through
    /// [`Compositor::context_restored`](cameo_core::Compositor::context_restored).
    pub fn recover(&mut self) -> Result<(), GpuError> {
        let mut config = self.config.clone();
        config.output_size = self.state.output.size;
        self.encoder = None;
        self.resolving.clear();
        self.bound = None;
        self.timers.clear();
        self.programs.clear();
        self.targets.clear();
        self.textures.clear();
        self.state.arena.clear();
        self.lost.store(false, Ordering::Release);
        if let Ok(mut error) = self.error.lock() {
            *error = None;
        }
        self.state = pollster::block_on(open_device(&self.instance, &config, &self.lost, &self.error))?;
        tracing::info!("GPU device recovered on {}", self.state.caps.renderer);
        Ok(())
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.state.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.state.queue
    }

    /// Color texture of the default target
    pub fn output_texture(&self) -> &wgpu::Texture {
        &self.state.output.texture
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn live_targets(&self) -> usize {
        self.targets.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    /// Mark the device lost, as the driver would
    pub fn simulate_context_loss(&mut self) {
        tracing::warn!("Simulating GPU context loss");
        self.lost.store(true, Ordering::Release);
    }

    /// Submit recorded work, if any
    fn submit(&mut self) {
        let Some(encoder) = self.encoder.take() else {
            return;
        };
        self.state.arena.flush(&self.state.queue);
        self.state.queue.submit(std::iter::once(encoder.finish()));
        for query in self.resolving.drain(..) {
            if let Some(timer) = self.timers.get(query) {
                timer.after_submit();
            }
        }
    }

    fn check_size(&self, size: PixelSize) -> Result<(), BackendError> {
        let max = self.state.caps.max_texture_size;
        if size.width == 0 || size.height == 0 || size.width > max || size.height > max {
            return Err(BackendError::ResourceCreation(format!(
                "texture size {}x{} outside 1..={}",
                size.width, size.height, max
            )));
        }
        Ok(())
    }
}

fn frame_encoder<'a>(
    encoder: &'a mut Option<wgpu::CommandEncoder>,
    device: &wgpu::Device,
) -> &'a mut wgpu::CommandEncoder {
    encoder.get_or_insert_with(|| {
        device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Cameo Frame Encoder"),
        })
    })
}

/// Color texture and alpha flag of a target, `None` being the output
fn lookup_target<'a>(
    output: &'a GpuTexture,
    targets: &SlotMap<TargetId, GpuTarget>,
    textures: &'a SlotMap<TextureId, GpuTexture>,
    target: Option<TargetId>,
) -> Result<(&'a GpuTexture, bool), BackendError> {
    match target {
        None => Ok((output, true)),
        Some(id) => {
            let target = targets.get(id).ok_or(BackendError::InvalidHandle("target"))?;
            let texture = textures
                .get(target.texture)
                .ok_or(BackendError::InvalidHandle("texture"))?;
            Ok((texture, target.alpha))
        }
    }
}

fn sampled_view<'a>(
    textures: &'a SlotMap<TextureId, GpuTexture>,
    texture: Option<TextureId>,
    fallback: &'a GpuTexture,
) -> Result<&'a wgpu::TextureView, BackendError> {
    match texture {
        None => Ok(&fallback.view),
        Some(id) => textures
            .get(id)
            .map(|t| &t.view)
            .ok_or(BackendError::InvalidHandle("texture")),
    }
}

async fn open_device(
    instance: &wgpu::Instance,
    config: &GpuConfig,
    lost: &Arc<AtomicBool>,
    error: &Arc<Mutex<Option<BackendError>>>,
) -> Result<DeviceState, GpuError> {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: config.power_preference,
            compatible_surface: None,
            force_fallback_adapter: config.force_fallback_adapter,
        })
        .await
        .ok_or(GpuError::AdapterNotFound)?;

    let info = adapter.get_info();
    tracing::info!("Using adapter {} ({:?})", info.name, info.backend);

    let required_features = wanted_features(&adapter);
    let required_limits = required_limits(&adapter);
    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Cameo GPU Device"),
                required_features,
                required_limits: required_limits.clone(),
                memory_hints: wgpu::MemoryHints::MemoryUsage,
            },
            None,
        )
        .await?;

    let lost_flag = lost.clone();
    device.set_device_lost_callback(move |reason, message| {
        tracing::error!("GPU device lost ({:?}): {}", reason, message);
        lost_flag.store(true, Ordering::Release);
    });
    let error_slot = error.clone();
    device.on_uncaptured_error(Box::new(move |err: wgpu::Error| {
        tracing::error!("Uncaptured wgpu error: {}", err);
        if let Ok(mut slot) = error_slot.lock() {
            if slot.is_none() {
                *slot = Some(BackendError::Device(err.to_string()));
            }
        }
    }));

    let mut caps = Capabilities::from_renderer(info.name.clone());
    caps.max_texture_size = required_limits.max_texture_dimension_2d;
    caps.timer_queries = required_features.contains(wgpu::Features::TIMESTAMP_QUERY_INSIDE_ENCODERS);
    caps.offscreen_y_flipped = false;

    let layouts = Layouts::new(&device);
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("Cameo Content Sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    });

    let output = GpuTexture::new(&device, config.output_size, "Cameo Output");
    let empty = GpuTexture::new(&device, PixelSize::new(1, 1), "Cameo Empty Placeholder");
    let opaque = GpuTexture::new(&device, PixelSize::new(1, 1), "Cameo Opaque Placeholder");
    opaque.write(&queue, &[255, 255, 255, 255]);

    let arena = UniformArena::new(required_limits.min_uniform_buffer_offset_alignment);
    Ok(DeviceState {
        device: Arc::new(device),
        queue: Arc::new(queue),
        caps,
        layouts,
        sampler,
        output,
        empty,
        opaque,
        arena,
    })
}

impl RenderBackend for WgpuBackend {
    fn capabilities(&self) -> &Capabilities {
        &self.state.caps
    }

    fn is_context_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    fn output_size(&self) -> PixelSize {
        self.state.output.size
    }

    fn resize_output(&mut self, size: PixelSize) {
        if size == self.state.output.size || self.check_size(size).is_err() {
            return;
        }
        self.submit();
        tracing::debug!("Resizing output to {}x{}", size.width, size.height);
        self.state.output = GpuTexture::new(&self.state.device, size, "Cameo Output");
    }

    fn begin_frame(&mut self) {
        self.state.device.poll(wgpu::Maintain::Poll);
    }

    fn end_frame(&mut self) {
        self.submit();
    }

    fn create_texture(&mut self, size: PixelSize, label: &str) -> Result<TextureId, BackendError> {
        if self.is_context_lost() {
            return Err(BackendError::ContextLost);
        }
        self.check_size(size)?;
        Ok(self
            .textures
            .insert(GpuTexture::new(&self.state.device, size, label)))
    }

    fn upload_texture(&mut self, texture: TextureId, image: &ImageData<'_>) -> Result<(), BackendError> {
        if self.is_context_lost() {
            return Err(BackendError::ContextLost);
        }
        image
            .validate()
            .map_err(|err| BackendError::ResourceCreation(err.to_string()))?;
        self.check_size(image.size)?;
        let device = &self.state.device;
        let entry = self
            .textures
            .get_mut(texture)
            .ok_or(BackendError::InvalidHandle("texture"))?;
        if entry.size != image.size {
            *entry = GpuTexture::new(device, image.size, "Cameo Content");
        }
        entry.write(&self.state.queue, &image.to_rgba());
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.textures.remove(texture);
    }

    fn create_render_target(&mut self, size: PixelSize, alpha: bool) -> Result<TargetHandles, BackendError> {
        if self.is_context_lost() {
            return Err(BackendError::ContextLost);
        }
        self.check_size(size)?;
        let texture = self
            .textures
            .insert(GpuTexture::new(&self.state.device, size, "Cameo Render Target"));
        let target = self.targets.insert(GpuTarget { texture, alpha });
        Ok(TargetHandles { target, texture })
    }

    fn destroy_render_target(&mut self, target: TargetId) {
        if let Some(entry) = self.targets.remove(target) {
            self.textures.remove(entry.texture);
        }
    }

    fn clear(&mut self, target: Option<TargetId>, color: Color) {
        if self.is_context_lost() {
            return;
        }
        let (texture, alpha) =
            match lookup_target(&self.state.output, &self.targets, &self.textures, target) {
                Ok(found) => found,
                Err(err) => {
                    tracing::warn!("clear: {}", err);
                    return;
                }
            };
        let clear = wgpu::Color {
            r: f64::from(color.r),
            g: f64::from(color.g),
            b: f64::from(color.b),
            a: if alpha { f64::from(color.a) } else { 1.0 },
        };
        let encoder = frame_encoder(&mut self.encoder, &self.state.device);
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Cameo Clear Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &texture.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }

    fn compile_program(&mut self, source: &ProgramSource) -> Result<ProgramId, BackendError> {
        if self.is_context_lost() {
            return Err(BackendError::ContextLost);
        }
        let program = GpuProgram::compile(&self.state.device, &self.state.layouts, source)?;
        Ok(self.programs.insert(program))
    }

    fn destroy_program(&mut self, program: ProgramId) {
        self.programs.remove(program);
        if self.bound == Some(program) {
            self.bound = None;
        }
    }

    fn bind_program(&mut self, program: ProgramId) {
        self.bound = Some(program);
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), BackendError> {
        if self.is_context_lost() {
            return Err(BackendError::ContextLost);
        }
        let program_id = self
            .bound
            .filter(|p| self.programs.contains_key(*p))
            .ok_or(BackendError::NoProgramBound)?;

        let Self {
            state,
            textures,
            targets,
            programs,
            encoder,
            ..
        } = self;
        let DeviceState {
            device,
            layouts,
            sampler,
            output,
            empty,
            opaque,
            arena,
            ..
        } = state;
        let device: &wgpu::Device = device;
        let encoder = frame_encoder(encoder, device);

        let (target, alpha) = lookup_target(output, targets, textures, call.target)?;
        let content_view = sampled_view(textures, call.texture, empty)?;
        let mask_view = sampled_view(textures, call.mask, opaque)?;

        let program = programs
            .get_mut(program_id)
            .ok_or(BackendError::NoProgramBound)?;
        let (vertex_bytes, instances): (&[u8], u32) = match (call.geometry, program.layout) {
            (Geometry::Quad(vertices), VertexLayout::Quad) => (bytemuck::cast_slice(vertices.as_slice()), 1),
            (Geometry::PointSprites(points), VertexLayout::PointSprites) => {
                if points.is_empty() {
                    return Ok(());
                }
                (bytemuck::cast_slice(points), points.len() as u32)
            }
            (_, layout) => {
                return Err(BackendError::Device(format!(
                    "geometry does not match {:?} program '{}'",
                    layout, program.label
                )))
            }
        };

        let uniforms = arena.push(device, bytemuck::bytes_of(&call.uniforms), 0);
        let params = arena.push(device, call.params, PARAMS_MIN_SIZE);
        let vertices = arena.push(device, vertex_bytes, 0);
        let vertex_len = vertex_bytes.len() as u64;

        let layer_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Cameo Layer Bind Group"),
            layout: &layouts.layer,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: arena.binding(&uniforms),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(content_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(mask_view),
                },
            ],
        });
        let params_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Cameo Params Bind Group"),
            layout: &layouts.params,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: arena.binding(&params),
            }],
        });

        let pipeline = program.pipeline(device, layouts, call.blend, alpha);
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Cameo Draw Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &target.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &layer_group, &[]);
        pass.set_bind_group(1, &params_group, &[]);
        pass.set_vertex_buffer(
            0,
            arena
                .buffer(&vertices)
                .slice(vertices.offset..vertices.offset + vertex_len),
        );
        pass.draw(0..6, 0..instances);
        Ok(())
    }

    fn read_pixels(&mut self, target: Option<TargetId>) -> Result<Vec<u8>, BackendError> {
        if self.is_context_lost() {
            return Err(BackendError::ContextLost);
        }
        self.submit();

        let (texture, _) = lookup_target(&self.state.output, &self.targets, &self.textures, target)?;
        let size = texture.size;
        let bytes_per_row = padded_bytes_per_row(size.width);
        let device = &self.state.device;
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Cameo Readback"),
            size: u64::from(bytes_per_row) * u64::from(size.height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Cameo Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(size.height),
                },
            },
            wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
        );
        self.state.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            tx.send(result).ok();
        });
        device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .unwrap_or(Err(wgpu::BufferAsyncError))
            .map_err(|err| BackendError::Readback(err.to_string()))?;

        let pixels = {
            let data = slice.get_mapped_range();
            copy_tight_rows(&data, size)
        };
        buffer.unmap();
        Ok(pixels)
    }

    fn take_error(&mut self) -> Option<BackendError> {
        self.error.lock().ok().and_then(|mut slot| slot.take())
    }

    fn begin_timer_query(&mut self) -> Option<QueryId> {
        if !self.state.caps.timer_queries || self.is_context_lost() {
            return None;
        }
        let timer = TimestampTimer::new(&self.state.device);
        timer.begin(frame_encoder(&mut self.encoder, &self.state.device));
        Some(self.timers.insert(timer))
    }

    fn end_timer_query(&mut self, query: QueryId) {
        let Some(timer) = self.timers.get(query) else {
            return;
        };
        timer.end(frame_encoder(&mut self.encoder, &self.state.device));
        self.resolving.push(query);
    }

    fn timer_query_status(&mut self, query: QueryId) -> QueryStatus {
        let Some(timer) = self.timers.get(query) else {
            return QueryStatus::Disjoint;
        };
        self.state.device.poll(wgpu::Maintain::Poll);
        timer.status(self.state.queue.get_timestamp_period())
    }

    fn delete_timer_query(&mut self, query: QueryId) {
        self.timers.remove(query);
        self.resolving.retain(|q| *q != query);
    }
}
