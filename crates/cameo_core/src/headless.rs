//! Recording backend without a GPU
//!
//! Keeps just enough state to validate handles and answer readbacks, and
//! records every state-changing call so tests can assert on the exact command
//! stream a frame produced.

use slotmap::SlotMap;

use crate::backend::{
    BlendMode, Capabilities, DrawCall, Geometry, ImageData, ProgramId, QueryId, QueryStatus,
    RenderBackend, TargetHandles, TargetId, TextureId,
};
use crate::error::BackendError;
use crate::geometry::{Color, PixelSize};
use crate::shader::ProgramSource;

const DEFAULT_OUTPUT_SIZE: PixelSize = PixelSize::new(640, 360);

/// One recorded backend call
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Clear {
        target: Option<TargetId>,
        color: Color,
    },
    BindProgram {
        program: ProgramId,
        label: String,
    },
    Draw(DrawRecord),
    Upload {
        texture: TextureId,
        size: PixelSize,
    },
    CreateTarget {
        target: TargetId,
        size: PixelSize,
        alpha: bool,
    },
    ReadPixels {
        target: Option<TargetId>,
    },
}

/// A draw as the backend saw it
#[derive(Clone, Debug, PartialEq)]
pub struct DrawRecord {
    pub target: Option<TargetId>,
    pub program: ProgramId,
    pub label: String,
    pub blend: BlendMode,
    pub texture: Option<TextureId>,
    pub mask: Option<TextureId>,
    pub opacity: f32,
    pub model: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub texcoord_from_position: bool,
    /// Quad texture coordinates of the first vertex, or `None` for sprites
    pub first_texcoord: Option<[f32; 2]>,
    /// Point sprite instances, 0 for quads
    pub instances: usize,
    pub params_len: usize,
}

/// Call counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    pub draws: u64,
    pub program_binds: u64,
    pub compiles: u64,
    pub uploads: u64,
    pub clears: u64,
    pub readbacks: u64,
    pub targets_created: u64,
}

#[derive(Debug)]
struct Texture {
    size: PixelSize,
    first_pixel: [u8; 4],
}

#[derive(Debug)]
struct Target {
    texture: TextureId,
    size: PixelSize,
    clear: Color,
}

#[derive(Debug)]
pub struct HeadlessBackend {
    caps: Capabilities,
    output_size: PixelSize,
    output_clear: Color,
    context_lost: bool,

    textures: SlotMap<TextureId, Texture>,
    targets: SlotMap<TargetId, Target>,
    programs: SlotMap<ProgramId, String>,
    queries: SlotMap<QueryId, ()>,
    bound: Option<ProgramId>,

    query_ns: u64,
    queries_ready: bool,
    queries_disjoint: bool,
    failing_sources: Vec<String>,
    fail_targets: bool,
    pending_error: Option<BackendError>,

    commands: Vec<Command>,
    stats: HeadlessStats,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::with_capabilities(Capabilities::from_renderer("Headless"))
    }

    pub fn with_capabilities(caps: Capabilities) -> Self {
        Self {
            caps,
            output_size: DEFAULT_OUTPUT_SIZE,
            output_clear: Color::TRANSPARENT,
            context_lost: false,
            textures: SlotMap::with_key(),
            targets: SlotMap::with_key(),
            programs: SlotMap::with_key(),
            queries: SlotMap::with_key(),
            bound: None,
            query_ns: 0,
            queries_ready: true,
            queries_disjoint: false,
            failing_sources: Vec::new(),
            fail_targets: false,
            pending_error: None,
            commands: Vec::new(),
            stats: HeadlessStats::default(),
        }
    }

    pub fn with_output_size(mut self, size: PixelSize) -> Self {
        self.output_size = size;
        self
    }

    /// Report offscreen targets as stored upside down relative to the output
    pub fn with_offscreen_y_flipped(mut self) -> Self {
        self.caps.offscreen_y_flipped = true;
        self
    }

    /// Report every timer query as taking `nanoseconds`
    pub fn with_timer_queries(mut self, nanoseconds: u64) -> Self {
        self.caps.timer_queries = true;
        self.query_ns = nanoseconds;
        self
    }

    pub fn set_queries_ready(&mut self, ready: bool) {
        self.queries_ready = ready;
    }

    pub fn set_queries_disjoint(&mut self, disjoint: bool) {
        self.queries_disjoint = disjoint;
    }

    /// Reject programs whose composed source contains `needle`
    pub fn fail_compiles_containing(&mut self, needle: impl Into<String>) {
        self.failing_sources.push(needle.into());
    }

    pub fn fail_render_targets(&mut self, fail: bool) {
        self.fail_targets = fail;
    }

    /// Simulate device loss; every handle is dropped
    pub fn lose_context(&mut self) {
        self.context_lost = true;
        self.textures.clear();
        self.targets.clear();
        self.programs.clear();
        self.queries.clear();
        self.bound = None;
    }

    pub fn restore_context(&mut self) {
        self.context_lost = false;
    }

    /// Raise an error for the next [`RenderBackend::take_error`]
    pub fn inject_error(&mut self, error: BackendError) {
        self.pending_error = Some(error);
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    /// Recorded draws, in order
    pub fn draws(&self) -> Vec<&DrawRecord> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                Command::Draw(draw) => Some(draw),
                _ => None,
            })
            .collect()
    }

    pub fn stats(&self) -> HeadlessStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = HeadlessStats::default();
        self.commands.clear();
    }

    pub fn texture_size(&self, texture: TextureId) -> Option<PixelSize> {
        self.textures.get(texture).map(|t| t.size)
    }

    /// Top-left pixel of the last upload
    pub fn texture_pixel(&self, texture: TextureId) -> Option<[u8; 4]> {
        self.textures.get(texture).map(|t| t.first_pixel)
    }

    /// Color texture of a render target
    pub fn target_texture(&self, target: TargetId) -> Option<TextureId> {
        self.targets.get(target).map(|t| t.texture)
    }

    pub fn program_label(&self, program: ProgramId) -> Option<&str> {
        self.programs.get(program).map(String::as_str)
    }

    /// Textures not belonging to a render target
    pub fn live_textures(&self) -> usize {
        self.textures.len() - self.targets.len()
    }

    pub fn live_targets(&self) -> usize {
        self.targets.len()
    }

    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    pub fn live_queries(&self) -> usize {
        self.queries.len()
    }

    fn check_texture(&self, texture: Option<TextureId>) -> Result<(), BackendError> {
        match texture {
            Some(texture) if !self.textures.contains_key(texture) => {
                Err(BackendError::InvalidHandle("texture"))
            }
            _ => Ok(()),
        }
    }
}

impl RenderBackend for HeadlessBackend {
    fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    fn is_context_lost(&self) -> bool {
        self.context_lost
    }

    fn output_size(&self) -> PixelSize {
        self.output_size
    }

    fn resize_output(&mut self, size: PixelSize) {
        self.output_size = size;
    }

    fn create_texture(&mut self, size: PixelSize, _label: &str) -> Result<TextureId, BackendError> {
        if self.context_lost {
            return Err(BackendError::ContextLost);
        }
        Ok(self.textures.insert(Texture {
            size,
            first_pixel: [0; 4],
        }))
    }

    fn upload_texture(&mut self, texture: TextureId, image: &ImageData<'_>) -> Result<(), BackendError> {
        image
            .validate()
            .map_err(|err| BackendError::ResourceCreation(err.to_string()))?;
        let entry = self
            .textures
            .get_mut(texture)
            .ok_or(BackendError::InvalidHandle("texture"))?;
        let rgba = image.to_rgba();
        entry.size = image.size;
        entry.first_pixel = [rgba[0], rgba[1], rgba[2], rgba[3]];
        self.stats.uploads += 1;
        self.commands.push(Command::Upload {
            texture,
            size: image.size,
        });
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.textures.remove(texture);
    }

    fn create_render_target(&mut self, size: PixelSize, alpha: bool) -> Result<TargetHandles, BackendError> {
        if self.context_lost {
            return Err(BackendError::ContextLost);
        }
        if self.fail_targets {
            return Err(BackendError::ResourceCreation(format!(
                "render target {}x{}",
                size.width, size.height
            )));
        }
        let texture = self.textures.insert(Texture {
            size,
            first_pixel: [0; 4],
        });
        let target = self.targets.insert(Target {
            texture,
            size,
            clear: Color::TRANSPARENT,
        });
        self.stats.targets_created += 1;
        self.commands.push(Command::CreateTarget { target, size, alpha });
        Ok(TargetHandles { target, texture })
    }

    fn destroy_render_target(&mut self, target: TargetId) {
        if let Some(entry) = self.targets.remove(target) {
            self.textures.remove(entry.texture);
        }
    }

    fn clear(&mut self, target: Option<TargetId>, color: Color) {
        match target {
            Some(id) => {
                if let Some(entry) = self.targets.get_mut(id) {
                    entry.clear = color;
                }
            }
            None => self.output_clear = color,
        }
        self.stats.clears += 1;
        self.commands.push(Command::Clear { target, color });
    }

    fn compile_program(&mut self, source: &ProgramSource) -> Result<ProgramId, BackendError> {
        if self.context_lost {
            return Err(BackendError::ContextLost);
        }
        let module = source.compose();
        if let Some(needle) = self.failing_sources.iter().find(|n| module.contains(n.as_str())) {
            return Err(BackendError::ShaderCompilation {
                label: source.label.to_string(),
                diagnostics: format!("rejected source containing '{}'", needle),
            });
        }
        let program = self.programs.insert(source.label.to_string());
        self.stats.compiles += 1;
        Ok(program)
    }

    fn destroy_program(&mut self, program: ProgramId) {
        self.programs.remove(program);
        if self.bound == Some(program) {
            self.bound = None;
        }
    }

    fn bind_program(&mut self, program: ProgramId) {
        self.bound = Some(program);
        self.stats.program_binds += 1;
        self.commands.push(Command::BindProgram {
            program,
            label: self.programs.get(program).cloned().unwrap_or_default(),
        });
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<(), BackendError> {
        if self.context_lost {
            return Err(BackendError::ContextLost);
        }
        let program = self
            .bound
            .filter(|p| self.programs.contains_key(*p))
            .ok_or(BackendError::NoProgramBound)?;
        if let Some(target) = call.target {
            if !self.targets.contains_key(target) {
                return Err(BackendError::InvalidHandle("target"));
            }
        }
        self.check_texture(call.texture)?;
        self.check_texture(call.mask)?;

        let (first_texcoord, instances) = match call.geometry {
            Geometry::Quad(vertices) => (Some(vertices[0].texcoord), 0),
            Geometry::PointSprites(points) => (None, points.len()),
        };
        self.stats.draws += 1;
        self.commands.push(Command::Draw(DrawRecord {
            target: call.target,
            program,
            label: self.programs.get(program).cloned().unwrap_or_default(),
            blend: call.blend,
            texture: call.texture,
            mask: call.mask,
            opacity: call.uniforms.opacity,
            model: call.uniforms.model,
            projection: call.uniforms.projection,
            texcoord_from_position: call.uniforms.texcoord_from_position != 0,
            first_texcoord,
            instances,
            params_len: call.params.len(),
        }));
        Ok(())
    }

    /// Every pixel of the target reads back as its last clear color
    fn read_pixels(&mut self, target: Option<TargetId>) -> Result<Vec<u8>, BackendError> {
        let (size, color) = match target {
            Some(id) => {
                let entry = self
                    .targets
                    .get(id)
                    .ok_or(BackendError::InvalidHandle("target"))?;
                (entry.size, entry.clear)
            }
            None => (self.output_size, self.output_clear),
        };
        let pixel = color.to_array().map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        self.stats.readbacks += 1;
        self.commands.push(Command::ReadPixels { target });
        Ok(std::iter::repeat(pixel)
            .take(size.area() as usize)
            .flatten()
            .collect())
    }

    fn take_error(&mut self) -> Option<BackendError> {
        self.pending_error.take()
    }

    fn begin_timer_query(&mut self) -> Option<QueryId> {
        if !self.caps.timer_queries || self.context_lost {
            return None;
        }
        Some(self.queries.insert(()))
    }

    fn timer_query_status(&mut self, query: QueryId) -> QueryStatus {
        if !self.queries.contains_key(query) || self.queries_disjoint {
            QueryStatus::Disjoint
        } else if self.queries_ready {
            QueryStatus::Ready(self.query_ns)
        } else {
            QueryStatus::Pending
        }
    }

    fn delete_timer_query(&mut self, query: QueryId) {
        self.queries.remove(query);
    }
}
