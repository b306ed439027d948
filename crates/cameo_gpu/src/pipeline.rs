//! Shader modules and render pipelines for filter programs

use std::borrow::Cow;

use rustc_hash::FxHashMap;

use cameo_core::shader::{LayerUniforms, QuadVertex, VertexLayout};
use cameo_core::{BackendError, BlendMode, ProgramSource};

/// Every texture the backend creates uses this format
pub(crate) const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2, 2 => Float32x2];

const SPRITE_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];

/// Bind group layouts shared by all programs
pub(crate) struct Layouts {
    /// Group 0: layer uniforms, content texture, sampler, mask texture
    pub layer: wgpu::BindGroupLayout,
    /// Group 1: filter parameters
    pub params: wgpu::BindGroupLayout,
    pub pipeline: wgpu::PipelineLayout,
}

impl Layouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };

        let layer = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cameo Layer Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<LayerUniforms>() as u64,
                        ),
                    },
                    count: None,
                },
                texture_entry(1),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                texture_entry(3),
            ],
        });

        // Sprite vertex stages read their timing from the parameter block
        let params = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cameo Params Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let pipeline = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Cameo Pipeline Layout"),
            bind_group_layouts: &[&layer, &params],
            push_constant_ranges: &[],
        });

        Self {
            layer,
            params,
            pipeline,
        }
    }
}

/// Parse and validate composed WGSL, reporting diagnostics against the
/// composed text
pub fn validate_wgsl(label: &str, text: &str) -> Result<(), BackendError> {
    let module = naga::front::wgsl::parse_str(text).map_err(|e| BackendError::ShaderCompilation {
        label: label.to_string(),
        diagnostics: e.emit_to_string(text),
    })?;
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::default(),
    )
    .validate(&module)
    .map_err(|e| BackendError::ShaderCompilation {
        label: label.to_string(),
        diagnostics: e.emit_to_string(text),
    })?;
    Ok(())
}

/// A compiled program and the pipelines built from it so far
pub(crate) struct GpuProgram {
    pub label: String,
    pub layout: VertexLayout,
    module: wgpu::ShaderModule,
    pipelines: FxHashMap<(BlendMode, bool), wgpu::RenderPipeline>,
}

impl GpuProgram {
    pub fn compile(
        device: &wgpu::Device,
        layouts: &Layouts,
        source: &ProgramSource,
    ) -> Result<Self, BackendError> {
        let label = source.label.to_string();
        let text = source.compose();
        validate_wgsl(&label, &text)?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&label),
            source: wgpu::ShaderSource::Wgsl(Cow::Owned(text)),
        });
        let mut program = Self {
            label,
            layout: source.layout,
            module,
            pipelines: FxHashMap::default(),
        };
        // Build the common variant now so pipeline errors surface at compile time
        program.pipeline(device, layouts, BlendMode::SourceOver, true);
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(BackendError::ShaderCompilation {
                label: program.label,
                diagnostics: error.to_string(),
            });
        }
        tracing::debug!("Compiled program '{}'", program.label);
        Ok(program)
    }

    /// Pipeline for a blend mode and target kind, created on first use
    pub fn pipeline(
        &mut self,
        device: &wgpu::Device,
        layouts: &Layouts,
        blend: BlendMode,
        alpha: bool,
    ) -> &wgpu::RenderPipeline {
        let Self {
            label,
            layout,
            module,
            pipelines,
        } = self;
        pipelines
            .entry((blend, alpha))
            .or_insert_with(|| create_pipeline(device, layouts, label.as_str(), *layout, module, blend, alpha))
    }
}

fn create_pipeline(
    device: &wgpu::Device,
    layouts: &Layouts,
    label: &str,
    layout: VertexLayout,
    module: &wgpu::ShaderModule,
    blend: BlendMode,
    alpha: bool,
) -> wgpu::RenderPipeline {
    let buffers = match layout {
        VertexLayout::Quad => [wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &QUAD_ATTRIBUTES,
        }],
        VertexLayout::PointSprites => [wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &SPRITE_ATTRIBUTES,
        }],
    };

    let blend_state = match blend {
        BlendMode::Replace => wgpu::BlendState::REPLACE,
        BlendMode::SourceOver => wgpu::BlendState::ALPHA_BLENDING,
    };
    // Targets without alpha keep the opaque alpha they were cleared with
    let write_mask = if alpha {
        wgpu::ColorWrites::ALL
    } else {
        wgpu::ColorWrites::COLOR
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&layouts.pipeline),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some("vs_main"),
            buffers: &buffers,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format: TEXTURE_FORMAT,
                blend: Some(blend_state),
                write_mask,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}
