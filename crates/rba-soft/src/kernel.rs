//! Recognition of the fixed set of kernels the conformance suite emits.
//!
//! `SoftGl` is not a GLSL implementation. Compiling a shader matches its source against the
//! handful of shapes the suite generates and extracts the parameters that vary (offsets, planes,
//! bindings). Anything else fails to compile with an info log, like a driver would.

use rba_gl::enums as gl;

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum StageKernel {
    /// `gl_Position = in_vs_position`.
    PassthroughPosition,
    /// Single point at the origin, expanded later by [`StageKernel::PointToQuad`].
    PointOrigin,
    /// Geometry stage turning a point into a viewport-covering quad.
    PointToQuad,
    /// Fragment stage writing a constant unsigned value.
    ConstantColor { value: u32 },
    TexelFetch(TexelFetchKernel),
    Compute(ComputeKernel),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct TexelFetchKernel {
    pub coord_scale: f32,
    pub offset: i64,
    pub plane: Plane,
    pub multisample: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Plane {
    Fixed(i64),
    SampleId,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum BlockKind {
    Storage,
    Uniform,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BufferBlock {
    pub kind: BlockKind,
    pub binding: u32,
    /// Distance in bytes between consecutive `float` elements.
    pub stride: usize,
}

impl BufferBlock {
    pub fn target(&self) -> u32 {
        match self.kind {
            BlockKind::Storage => gl::SHADER_STORAGE_BUFFER,
            BlockKind::Uniform => gl::UNIFORM_BUFFER,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct BufferCopyKernel {
    pub local_size: u32,
    pub source: BufferBlock,
    pub destination: BufferBlock,
    pub source_offset: u64,
    pub destination_offset: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ImageCopyKernel {
    pub multisample: bool,
    pub source_offset: i64,
    pub destination_offset: i64,
    pub source_sample_offset: i64,
    pub destination_sample_offset: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ProbeValue {
    Constant(u32),
    IndexPlus(u32),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ComputeKernel {
    BufferCopy(BufferCopyKernel),
    ImageCopy(ImageCopyKernel),
    /// Writes `base + index + k` into sample `k` of every texel.
    MultisampleFill { row_width: u32, base: u32 },
    /// Writes 1 where any of the first four samples equals the expected value, 0 elsewhere.
    MultisampleProbe { row_width: u32, expected: ProbeValue },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Pipeline {
    Raster {
        vertex: StageKernel,
        geometry: Option<StageKernel>,
        fragment: StageKernel,
    },
    Compute(ComputeKernel),
}

pub(crate) fn compile(stage: u32, source: &str) -> Result<StageKernel, String> {
    let first = source.lines().map(str::trim).find(|l| !l.is_empty());
    if !first.is_some_and(|l| l.starts_with("#version")) {
        return Err("0:1: error: missing #version directive".to_string());
    }
    if source.contains("${") {
        return Err("0:1: error: unexpected '$' in source".to_string());
    }

    let kernel = match stage {
        gl::VERTEX_SHADER if source.contains("gl_Position = in_vs_position") => {
            Some(StageKernel::PassthroughPosition)
        }
        gl::VERTEX_SHADER if source.contains("gl_Position = vec4(0, 0, 0, 1)") => {
            Some(StageKernel::PointOrigin)
        }
        gl::GEOMETRY_SHADER if source.contains("EmitVertex") => Some(StageKernel::PointToQuad),
        gl::FRAGMENT_SHADER if source.contains("texelFetch(") => texel_fetch(source).map(StageKernel::TexelFetch),
        gl::FRAGMENT_SHADER => int_after(source, "out_fs_color = uvec4(")
            .and_then(|v| u32::try_from(v).ok())
            .map(|value| StageKernel::ConstantColor { value }),
        gl::COMPUTE_SHADER => compute(source).map(StageKernel::Compute),
        _ => None,
    };
    kernel.ok_or_else(|| format!("0:1: error: unsupported {} shader", stage_name(stage)))
}

pub(crate) fn link(stages: &[StageKernel]) -> Result<Pipeline, String> {
    let compute: Vec<_> = stages
        .iter()
        .filter_map(|s| match s {
            StageKernel::Compute(k) => Some(*k),
            _ => None,
        })
        .collect();
    if let [kernel] = compute.as_slice() {
        if stages.len() == 1 {
            return Ok(Pipeline::Compute(*kernel));
        }
        return Err("error: compute shader linked with graphics stages".to_string());
    }

    let vertex = stages
        .iter()
        .copied()
        .find(|s| matches!(s, StageKernel::PassthroughPosition | StageKernel::PointOrigin));
    let geometry = stages
        .iter()
        .copied()
        .find(|s| matches!(s, StageKernel::PointToQuad));
    let fragment = stages
        .iter()
        .copied()
        .find(|s| matches!(s, StageKernel::ConstantColor { .. } | StageKernel::TexelFetch(_)));

    match (vertex, geometry, fragment) {
        (Some(StageKernel::PassthroughPosition), None, Some(f @ StageKernel::ConstantColor { .. })) => {
            Ok(Pipeline::Raster {
                vertex: StageKernel::PassthroughPosition,
                geometry: None,
                fragment: f,
            })
        }
        (Some(StageKernel::PointOrigin), Some(g), Some(f @ StageKernel::TexelFetch(_))) => Ok(Pipeline::Raster {
            vertex: StageKernel::PointOrigin,
            geometry: Some(g),
            fragment: f,
        }),
        (None, _, _) => Err("error: program has no vertex shader".to_string()),
        (_, _, None) => Err("error: program has no fragment shader".to_string()),
        _ => Err("error: stage interfaces do not match".to_string()),
    }
}

fn texel_fetch(source: &str) -> Option<TexelFetchKernel> {
    let plane = match assignment(source, "plane")? {
        "gl_SampleID" => Plane::SampleId,
        value => Plane::Fixed(value.parse().ok()?),
    };
    let point = assignment(source, "point")?;
    let coord_scale = point
        .split_once("gs_fs_tex_coord * ")?
        .1
        .split(')')
        .next()?
        .trim()
        .parse()
        .ok()?;
    Some(TexelFetchKernel {
        coord_scale,
        offset: last_call_int(point, "ivec2(")?,
        plane,
        multisample: source.contains("sampler2DMS"),
    })
}

fn compute(source: &str) -> Option<ComputeKernel> {
    if source.contains("buffer Destination") {
        return buffer_copy(source).map(ComputeKernel::BufferCopy);
    }
    if source.contains("uni_destination_image") && source.contains("point_destination") {
        return image_copy(source).map(ComputeKernel::ImageCopy);
    }
    let row_width = u32::try_from(int_after(assignment(source, "index")?, "* ")?).ok()?;
    if source.contains("any(equal(") {
        let expected = source.split_once("color_3.r), uvec4(")?.1;
        let expected = match expected.strip_prefix("index + ") {
            Some(rest) => ProbeValue::IndexPlus(u32::try_from(leading_int(rest)?).ok()?),
            None => ProbeValue::Constant(u32::try_from(leading_int(expected)?).ok()?),
        };
        return Some(ComputeKernel::MultisampleProbe { row_width, expected });
    }
    if source.contains("imageStore(uni_image") {
        let base = u32::try_from(leading_int(assignment(source, "base")?)?).ok()?;
        return Some(ComputeKernel::MultisampleFill { row_width, base });
    }
    None
}

fn buffer_copy(source: &str) -> Option<BufferCopyKernel> {
    let block = |name: &str| -> Option<BufferBlock> {
        let line = source.lines().find(|l| l.contains(name) && l.contains("binding"))?;
        let binding = u32::try_from(int_after(line, "binding = ")?).ok()?;
        if line.contains("uniform") {
            // std140 rounds array elements up to a vec4.
            Some(BufferBlock {
                kind: BlockKind::Uniform,
                binding,
                stride: 16,
            })
        } else {
            Some(BufferBlock {
                kind: BlockKind::Storage,
                binding,
                stride: 4,
            })
        }
    };
    let offset = |name: &str| -> Option<u64> { u64::try_from(int_after(assignment(source, name)?, "+ ")?).ok() };
    Some(BufferCopyKernel {
        local_size: u32::try_from(int_after(source, "local_size_x = ")?).ok()?,
        source: block("Source")?,
        destination: block("Destination")?,
        source_offset: offset("index_source")?,
        destination_offset: offset("index_destination")?,
    })
}

fn image_copy(source: &str) -> Option<ImageCopyKernel> {
    let multisample = source.contains("image2DMS");
    let (source_sample_offset, destination_sample_offset) = if multisample {
        (
            int_after(source, "point_source, 0 + ")?,
            int_after(source, "point_destination, 0 + ")?,
        )
    } else {
        (0, 0)
    };
    Some(ImageCopyKernel {
        multisample,
        source_offset: last_call_int(assignment(source, "point_source")?, "ivec2(")?,
        destination_offset: last_call_int(assignment(source, "point_destination")?, "ivec2(")?,
        source_sample_offset,
        destination_sample_offset,
    })
}

/// Right-hand side of the first `<decl> name = value;` statement.
fn assignment<'a>(source: &'a str, name: &str) -> Option<&'a str> {
    source.lines().find_map(|line| {
        let (lhs, rhs) = line.split_once('=')?;
        if lhs.split_whitespace().last()? != name {
            return None;
        }
        Some(rhs.trim().trim_end_matches(';').trim())
    })
}

fn int_after(text: &str, marker: &str) -> Option<i64> {
    leading_int(text.split_once(marker)?.1)
}

/// Integer argument of the last `call(...)` in `text`.
fn last_call_int(text: &str, call: &str) -> Option<i64> {
    let at = text.rfind(call)?;
    leading_int(&text[at + call.len()..])
}

fn leading_int(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let end = text
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && c == '-')))
        .map_or(text.len(), |(i, _)| i);
    text[..end].parse().ok()
}

fn stage_name(stage: u32) -> &'static str {
    match stage {
        gl::VERTEX_SHADER => "vertex",
        gl::FRAGMENT_SHADER => "fragment",
        gl::GEOMETRY_SHADER => "geometry",
        gl::TESS_CONTROL_SHADER => "tessellation control",
        gl::TESS_EVALUATION_SHADER => "tessellation evaluation",
        gl::COMPUTE_SHADER => "compute",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_version_fails_to_compile() {
        let err = compile(gl::VERTEX_SHADER, "void main() { gl_Position = in_vs_position; }").unwrap_err();
        assert!(err.contains("#version"), "{err}");
    }

    #[test]
    fn recognizes_storage_copy_offsets() {
        let src = "#version 450 core\n\
            layout (local_size_x = 4, local_size_y = 1, local_size_z = 1) in;\n\
            layout (binding = 1, std430) buffer Source {\n    float data[];\n} source;\n\
            layout (binding = 0, std430) buffer Destination {\n    float data[];\n} destination;\n\
            void main()\n{\n\
                uint index_destination = gl_LocalInvocationID.x + 0u;\n\
                uint index_source      = gl_LocalInvocationID.x + 1048576u;\n\
                destination.data[index_destination] = source.data[index_source];\n}\n";
        let StageKernel::Compute(ComputeKernel::BufferCopy(k)) = compile(gl::COMPUTE_SHADER, src).unwrap() else {
            panic!("expected a buffer copy");
        };
        assert_eq!(k.local_size, 4);
        assert_eq!(k.source.binding, 1);
        assert_eq!(k.source.kind, BlockKind::Storage);
        assert_eq!(k.destination.binding, 0);
        assert_eq!(k.source_offset, 1_048_576);
        assert_eq!(k.destination_offset, 0);
    }

    #[test]
    fn recognizes_unsigned_literals_in_multisample_kernels() {
        let fill = "#version 320 es\n\
            layout (location = 0, r32ui) writeonly uniform highp uimage2DMS uni_image;\n\
            void main()\n{\n\
                ivec2 point = ivec2(gl_WorkGroupID.x, gl_WorkGroupID.y);\n\
                uint  index = gl_WorkGroupID.y * 16u + gl_WorkGroupID.x;\n\
                uint  base  = 1000u;\n\
                imageStore(uni_image, point, 0, uvec4(index + base + 0u, 0u, 0u, 0u));\n}\n";
        assert_eq!(
            compile(gl::COMPUTE_SHADER, fill).unwrap(),
            StageKernel::Compute(ComputeKernel::MultisampleFill { row_width: 16, base: 1000 })
        );

        let probe = fill.replace("uint  base  = 1000u;", "").replace(
            "imageStore(uni_image",
            "if (any(equal(uvec4(color_0.r, color_1.r, color_2.r, color_3.r), uvec4(index + 1003u)))) imageStore(uni_image",
        );
        assert_eq!(
            compile(gl::COMPUTE_SHADER, &probe).unwrap(),
            StageKernel::Compute(ComputeKernel::MultisampleProbe {
                row_width: 16,
                expected: ProbeValue::IndexPlus(1003),
            })
        );
    }

    #[test]
    fn unknown_fragment_shader_is_rejected() {
        let err = compile(gl::FRAGMENT_SHADER, "#version 450 core\nvoid main() {}\n").unwrap_err();
        assert!(err.contains("unsupported fragment shader"), "{err}");
    }

    #[test]
    fn leading_int_handles_signs() {
        assert_eq!(leading_int(" -12)"), Some(-12));
        assert_eq!(leading_int("9;"), Some(9));
        assert_eq!(leading_int("x"), None);
    }

    #[test]
    fn compute_cannot_link_with_graphics() {
        let stages = [
            StageKernel::PassthroughPosition,
            StageKernel::Compute(ComputeKernel::MultisampleFill { row_width: 16, base: 0 }),
        ];
        assert!(link(&stages).is_err());
    }
}
