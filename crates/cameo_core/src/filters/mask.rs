use crate::backend::Capabilities;
use crate::filter::{Filter, FilterContext};
use crate::shader::ProgramSource;

const MASK_FRAGMENT: &str = r#"
@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let pix = textureSample(content_texture, content_sampler, input.texcoord);
    let coverage = textureSample(mask_texture, content_sampler, input.layercoord).a;
    return vec4<f32>(pix.rgb, pix.a * coverage * uniforms.opacity);
}
"#;

/// Multiplies the drawn layer's alpha by its mask source
///
/// Created lazily by the compositor, at most once per layer, and cached on the
/// layer.
#[derive(Debug, Default)]
pub struct MaskFilter;

impl MaskFilter {
    pub fn new() -> Self {
        Self
    }
}

impl Filter for MaskFilter {
    fn label(&self) -> &str {
        "mask"
    }

    fn program_source(&mut self, _caps: &Capabilities) -> ProgramSource {
        ProgramSource::fragment("mask", MASK_FRAGMENT)
    }

    fn modifies_contents(&self) -> bool {
        true
    }

    fn prepare(&mut self, cx: &mut FilterContext<'_>) {
        if !cx.bind_layer_mask() {
            tracing::trace!("mask filter drawn without a mask source");
        }
    }
}
