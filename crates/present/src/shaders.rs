use crate::context::SetupError;

/// WGSL for the fullscreen composite pass.
///
/// The vertex stage emits one oversized triangle from the vertex index; the
/// fragment stage reads the column-major samples buffer (height header word
/// first) and unpacks the B8G8R8A8 byte order the staging copy delivered.
pub const COMPOSITE_SHADER: &str = r#"
struct Samples {
    height: u32,
    data: array<u32>,
};

@group(0) @binding(0)
var<storage, read> samples: Samples;

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> @builtin(position) vec4<f32> {
    let x = f32((index << 1u) & 2u) * 2.0 - 1.0;
    let y = f32(index & 2u) * 2.0 - 1.0;
    return vec4<f32>(x, y, 0.0, 1.0);
}

@fragment
fn fs_main(@builtin(position) pos: vec4<f32>) -> @location(0) vec4<f32> {
    let x = u32(pos.x);
    let y = u32(pos.y);
    let c = samples.data[x * samples.height + y];
    let b = f32(c & 0xffu);
    let g = f32((c >> 8u) & 0xffu);
    let r = f32((c >> 16u) & 0xffu);
    let a = f32((c >> 24u) & 0xffu);
    return vec4<f32>(r, g, b, a) / 255.0;
}
"#;

/// Translate one entry point of a WGSL module to SPIR-V words.
pub(crate) fn compile(
    source: &str,
    stage: naga::ShaderStage,
    entry_point: &str,
) -> Result<Vec<u32>, SetupError> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| SetupError::Shader(e.to_string()))?;
    let info = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::empty(),
    )
    .validate(&module)
    .map_err(|e| SetupError::Shader(format!("{e:?}")))?;

    let options = naga::back::spv::Options::default();
    let pipeline_options = naga::back::spv::PipelineOptions {
        shader_stage: stage,
        entry_point: entry_point.to_owned(),
    };
    naga::back::spv::write_vec(&module, &info, &options, Some(&pipeline_options))
        .map_err(|e| SetupError::Shader(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_shader_translates() {
        let vs = compile(COMPOSITE_SHADER, naga::ShaderStage::Vertex, "vs_main").unwrap();
        let fs = compile(COMPOSITE_SHADER, naga::ShaderStage::Fragment, "fs_main").unwrap();
        // SPIR-V magic number leads both modules.
        assert_eq!(vs[0], 0x0723_0203);
        assert_eq!(fs[0], 0x0723_0203);
    }

    #[test]
    fn unknown_entry_point_is_a_setup_error() {
        let err = compile(COMPOSITE_SHADER, naga::ShaderStage::Vertex, "nope").unwrap_err();
        assert!(matches!(err, SetupError::Shader(_)));
    }
}
