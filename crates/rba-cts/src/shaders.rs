//! Program sources for every test.

use std::fmt;

use rba_gl::ApiType;

use crate::format::{TexelFormat, IMAGE_SIZE};
use crate::resources::ProgramSources;
use crate::template::{Template, TemplateError, TemplateParams};

/// Value written by the vertex buffer test's fragment stage.
pub const DRAWN_MARKER: u8 = 255;

const PASSTHROUGH_VERTEX: Template = Template::new(
    "${VERSION}

layout (location = 0) in vec4 in_vs_position;

void main()
{
    gl_Position = in_vs_position;
}
",
);

const MARKER_FRAGMENT: Template = Template::new(
    "${VERSION}

layout (location = 0) out uvec4 out_fs_color;

void main()
{
    out_fs_color = uvec4(${MARKER});
}
",
);

const POINT_VERTEX: Template = Template::new(
    "${VERSION}

void main()
{
    gl_Position = vec4(0, 0, 0, 1);
}
",
);

const POINT_TO_QUAD_GEOMETRY: Template = Template::new(
    "${VERSION}

layout(points)                           in;
layout(triangle_strip, max_vertices = 4) out;

out vec2 gs_fs_tex_coord;

void main()
{
    gs_fs_tex_coord = vec2(0, 0);
    gl_Position     = vec4(-1, -1, 0, 1);
    EmitVertex();

    gs_fs_tex_coord = vec2(0, 1);
    gl_Position     = vec4(-1, 1, 0, 1);
    EmitVertex();

    gs_fs_tex_coord = vec2(1, 0);
    gl_Position     = vec4(1, -1, 0, 1);
    EmitVertex();

    gs_fs_tex_coord = vec2(1, 1);
    gl_Position     = vec4(1, 1, 0, 1);
    EmitVertex();
}
",
);

const TEXEL_FETCH_FRAGMENT: Template = Template::new(
    "${VERSION}

                      in  lowp vec2 gs_fs_tex_coord;
layout (location = 0) out lowp ${TYPE} out_fs_color;
layout (location = 0) uniform lowp ${SAMPLER} uni_texture;

void main()
{
    int   plane = ${PLANE};
    ivec2 point = ivec2(gs_fs_tex_coord * ${SIZE}.0) + ivec2(${OFFSET});
    out_fs_color = texelFetch(uni_texture, point, plane);
}
",
);

const BUFFER_COPY_COMPUTE: Template = Template::new(
    "${VERSION}

layout (local_size_x = 4, local_size_y = 1, local_size_z = 1) in;

${SOURCE_BLOCK}

layout (binding = 0, std430) buffer Destination {
    float data[];
} destination;

void main()
{
    uint index_destination = gl_LocalInvocationID.x + ${DESTINATION_OFFSET}u;
    uint index_source      = gl_LocalInvocationID.x + ${SOURCE_OFFSET}u;

    destination.data[index_destination] = source.data[index_source];
}
",
);

const STORAGE_SOURCE_BLOCK: &str = "layout (binding = 1, std430) buffer Source {
    float data[];
} source;";

const UNIFORM_SOURCE_BLOCK: &str = "layout (binding = 0, std140) uniform Source {
    float data[16];
} source;";

const IMAGE_COPY_COMPUTE: Template = Template::new(
    "${VERSION}

layout (local_size_x = 1, local_size_y = 1, local_size_z = 1) in;

layout (location = 1, ${FORMAT}) writeonly uniform ${PRECISION}${IMAGE} uni_destination_image;
layout (location = 0, ${FORMAT}) readonly  uniform ${PRECISION}${IMAGE} uni_source_image;

void main()
{
    ivec2 point_destination = ivec2(gl_WorkGroupID.xy) + ivec2(${DESTINATION_COORD_OFFSET});
    ivec2 point_source      = ivec2(gl_WorkGroupID.xy) + ivec2(${SOURCE_COORD_OFFSET});

${COPY}
}
",
);

const SINGLE_SAMPLE_COPY: Template = Template::new(
    "    ${TYPE} color = imageLoad(uni_source_image, point_source);

    imageStore(uni_destination_image, point_destination, color);",
);

const MULTISAMPLE_COPY: Template = Template::new(
    "    ${TYPE} color_0 = imageLoad(uni_source_image, point_source, 0 + ${SOURCE_SAMPLE_OFFSET});
    ${TYPE} color_1 = imageLoad(uni_source_image, point_source, 1 + ${SOURCE_SAMPLE_OFFSET});
    ${TYPE} color_2 = imageLoad(uni_source_image, point_source, 2 + ${SOURCE_SAMPLE_OFFSET});
    ${TYPE} color_3 = imageLoad(uni_source_image, point_source, 3 + ${SOURCE_SAMPLE_OFFSET});

    imageStore(uni_destination_image, point_destination, 0 + ${DESTINATION_SAMPLE_OFFSET}, color_0);
    imageStore(uni_destination_image, point_destination, 1 + ${DESTINATION_SAMPLE_OFFSET}, color_1);
    imageStore(uni_destination_image, point_destination, 2 + ${DESTINATION_SAMPLE_OFFSET}, color_2);
    imageStore(uni_destination_image, point_destination, 3 + ${DESTINATION_SAMPLE_OFFSET}, color_3);",
);

const MULTISAMPLE_FILL_COMPUTE: Template = Template::new(
    "${VERSION}

layout (local_size_x = 1, local_size_y = 1, local_size_z = 1) in;

layout (location = 0, r32ui) writeonly uniform ${PRECISION}uimage2DMS uni_image;

void main()
{
    ivec2 point = ivec2(gl_WorkGroupID.x, gl_WorkGroupID.y);
    uint  index = gl_WorkGroupID.y * ${WIDTH}u + gl_WorkGroupID.x;
    uint  base  = ${BASE}u;

    imageStore(uni_image, point, 0, uvec4(index + base + 0u, 0u, 0u, 0u));
    imageStore(uni_image, point, 1, uvec4(index + base + 1u, 0u, 0u, 0u));
    imageStore(uni_image, point, 2, uvec4(index + base + 2u, 0u, 0u, 0u));
    imageStore(uni_image, point, 3, uvec4(index + base + 3u, 0u, 0u, 0u));
}
",
);

const MULTISAMPLE_PROBE_COMPUTE: Template = Template::new(
    "${VERSION}

layout (local_size_x = 1, local_size_y = 1, local_size_z = 1) in;

layout (location = 1, r32ui) writeonly uniform ${PRECISION}uimage2D   uni_destination_image;
layout (location = 0, r32ui) readonly  uniform ${PRECISION}uimage2DMS uni_source_image;

void main()
{
    ivec2 point = ivec2(gl_WorkGroupID.x, gl_WorkGroupID.y);
    uint  index = gl_WorkGroupID.y * ${WIDTH}u + gl_WorkGroupID.x;

    uvec4 color_0 = imageLoad(uni_source_image, point, 0);
    uvec4 color_1 = imageLoad(uni_source_image, point, 1);
    uvec4 color_2 = imageLoad(uni_source_image, point, 2);
    uvec4 color_3 = imageLoad(uni_source_image, point, 3);

    if (any(equal(uvec4(color_0.r, color_1.r, color_2.r, color_3.r), uvec4(${EXPECTED}))))
    {
        imageStore(uni_destination_image, point, uvec4(1u));
    }
    else
    {
        imageStore(uni_destination_image, point, uvec4(0u));
    }
}
",
);

/// Third argument of `texelFetch`: a mip level, or a sample index for multisample samplers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchPlane {
    Index(u32),
    SampleId,
}

impl fmt::Display for FetchPlane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{index}"),
            Self::SampleId => f.write_str("gl_SampleID"),
        }
    }
}

/// Value the multisample probe looks for among the four samples of a texel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeExpectation {
    Zero,
    /// `index + n`, where `index` is the texel's row-major position.
    IndexPlus(u32),
}

impl fmt::Display for ProbeExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zero => f.write_str("0u"),
            Self::IndexPlus(n) => write!(f, "index + {n}u"),
        }
    }
}

/// Kind of block the buffer copy kernel reads from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferSource {
    /// `std430` storage block at binding 1.
    Storage,
    /// `std140` uniform block of 16 floats at binding 0.
    Uniform,
}

fn version(api: ApiType) -> TemplateParams {
    TemplateParams::new().with("VERSION", api.glsl_version_declaration())
}

/// ES has no default precision for image types.
fn image_params(api: ApiType) -> TemplateParams {
    let precision = if api.is_es() { "highp " } else { "" };
    version(api).with("PRECISION", precision)
}

pub fn vertex_buffer_program(api: ApiType) -> Result<ProgramSources, TemplateError> {
    Ok(ProgramSources {
        vertex: PASSTHROUGH_VERTEX.render(&version(api))?,
        fragment: MARKER_FRAGMENT.render(&version(api).with("MARKER", DRAWN_MARKER))?,
        ..ProgramSources::default()
    })
}

/// Full-viewport quad whose fragments fetch texel `point + offset` from `plane`.
pub fn texel_fetch_program(
    api: ApiType,
    format: TexelFormat,
    plane: FetchPlane,
    offset: u32,
) -> Result<ProgramSources, TemplateError> {
    let fragment = version(api)
        .with("TYPE", format.glsl_output())
        .with("SAMPLER", format.glsl_sampler())
        .with("PLANE", plane)
        .with("SIZE", IMAGE_SIZE)
        .with("OFFSET", offset);
    Ok(ProgramSources {
        vertex: POINT_VERTEX.render(&version(api))?,
        geometry: POINT_TO_QUAD_GEOMETRY.render(&version(api))?,
        fragment: TEXEL_FETCH_FRAGMENT.render(&fragment)?,
        ..ProgramSources::default()
    })
}

/// Copies one texel (four samples for multisample formats) per work group.
pub fn image_copy_program(
    api: ApiType,
    format: TexelFormat,
    source_coord_offset: u32,
    destination_coord_offset: u32,
    source_sample_offset: u32,
    destination_sample_offset: u32,
) -> Result<ProgramSources, TemplateError> {
    let copy = if format.is_multisample() {
        MULTISAMPLE_COPY.render(
            &TemplateParams::new()
                .with("TYPE", format.glsl_output())
                .with("SOURCE_SAMPLE_OFFSET", source_sample_offset)
                .with("DESTINATION_SAMPLE_OFFSET", destination_sample_offset),
        )?
    } else {
        SINGLE_SAMPLE_COPY.render(&TemplateParams::new().with("TYPE", format.glsl_output()))?
    };
    let params = image_params(api)
        .with("FORMAT", format.glsl_image_format())
        .with("IMAGE", format.glsl_image())
        .with("SOURCE_COORD_OFFSET", source_coord_offset)
        .with("DESTINATION_COORD_OFFSET", destination_coord_offset)
        .with("COPY", copy);
    Ok(ProgramSources::compute(IMAGE_COPY_COMPUTE.render(&params)?))
}

/// Stores `base + index + k` into sample `k` of every texel.
pub fn multisample_fill_program(api: ApiType, base: u32) -> Result<ProgramSources, TemplateError> {
    let params = image_params(api).with("WIDTH", IMAGE_SIZE).with("BASE", base);
    Ok(ProgramSources::compute(MULTISAMPLE_FILL_COMPUTE.render(&params)?))
}

pub fn multisample_probe_program(api: ApiType, expected: ProbeExpectation) -> Result<ProgramSources, TemplateError> {
    let params = image_params(api)
        .with("WIDTH", IMAGE_SIZE)
        .with("EXPECTED", expected);
    Ok(ProgramSources::compute(MULTISAMPLE_PROBE_COMPUTE.render(&params)?))
}

/// Copies four floats from `source.data[i + source_offset]` to
/// `destination.data[i + destination_offset]`.
pub fn buffer_copy_program(
    api: ApiType,
    source: BufferSource,
    source_offset: u32,
    destination_offset: u32,
) -> Result<ProgramSources, TemplateError> {
    let block = match source {
        BufferSource::Storage => STORAGE_SOURCE_BLOCK,
        BufferSource::Uniform => UNIFORM_SOURCE_BLOCK,
    };
    let params = version(api)
        .with("SOURCE_BLOCK", block)
        .with("SOURCE_OFFSET", source_offset)
        .with("DESTINATION_OFFSET", destination_offset);
    Ok(ProgramSources::compute(BUFFER_COPY_COMPUTE.render(&params)?))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rba_soft::SoftGl;

    use super::*;
    use crate::resources::Program;

    const API: ApiType = ApiType::core(4, 5);

    fn all_programs() -> Vec<ProgramSources> {
        let mut programs = vec![
            vertex_buffer_program(API).unwrap(),
            multisample_fill_program(API, 0).unwrap(),
            multisample_probe_program(API, ProbeExpectation::Zero).unwrap(),
            multisample_probe_program(API, ProbeExpectation::IndexPlus(3)).unwrap(),
            buffer_copy_program(API, BufferSource::Storage, 0, 1 << 20).unwrap(),
            buffer_copy_program(API, BufferSource::Uniform, 4096, 0).unwrap(),
        ];
        for format in TexelFormat::ALL {
            let plane = if format.is_multisample() {
                FetchPlane::SampleId
            } else {
                FetchPlane::Index(format.data_level())
            };
            programs.push(texel_fetch_program(API, format, plane, 16).unwrap());
            programs.push(image_copy_program(API, format, 0, 512, 0, 8).unwrap());
        }
        programs
    }

    #[test]
    fn generation_is_deterministic() {
        assert_eq!(all_programs(), all_programs());
    }

    #[test]
    fn every_program_builds() {
        let soft = SoftGl::default();
        for sources in all_programs() {
            let mut program = Program::new(&soft);
            if let Err(err) = program.init(&sources) {
                panic!("{err}\n{sources:#?}");
            }
        }
        assert_eq!(soft.live_objects().total(), 0);
    }

    #[test]
    fn texel_fetch_fragment_carries_offset_and_plane() {
        let sources = texel_fetch_program(API, TexelFormat::R32uiMultisample, FetchPlane::Index(9), 0).unwrap();
        assert!(sources.fragment.starts_with("#version 450 core\n"));
        assert!(sources.fragment.contains("uniform lowp usampler2DMS uni_texture;"));
        assert!(sources.fragment.contains("int   plane = 9;"));
        assert!(sources.fragment.contains("ivec2(gs_fs_tex_coord * 16.0) + ivec2(0);"));
    }

    #[test]
    fn multisample_copy_offsets_samples_independently() {
        let sources = image_copy_program(API, TexelFormat::R32uiMultisample, 0, 0, 4, 8).unwrap();
        assert!(sources.compute.contains("imageLoad(uni_source_image, point_source, 3 + 4);"));
        assert!(sources
            .compute
            .contains("imageStore(uni_destination_image, point_destination, 0 + 8, color_0);"));
        assert!(!sources.compute.contains("${"));
    }

    #[test]
    fn es_contexts_get_an_es_version_line() {
        let sources = buffer_copy_program(ApiType::es(3, 2), BufferSource::Storage, 0, 0).unwrap();
        assert!(sources.compute.starts_with("#version 320 es\n"));
    }

    #[test]
    fn compute_kernels_are_valid_glsl_es() {
        let es = ApiType::es(3, 2);
        let kernels = [
            buffer_copy_program(es, BufferSource::Storage, 0, 4096).unwrap(),
            image_copy_program(es, TexelFormat::R8, 0, 512, 0, 0).unwrap(),
            multisample_fill_program(es, 1000).unwrap(),
            multisample_probe_program(es, ProbeExpectation::IndexPlus(3)).unwrap(),
        ];
        for sources in &kernels {
            // Locals with non-constant initializers cannot be const.
            assert!(!sources.compute.contains("const "), "{}", sources.compute);
        }
        assert!(kernels[0].compute.contains("gl_LocalInvocationID.x + 4096u;"));
        assert!(kernels[1].compute.contains("writeonly uniform highp image2D uni_destination_image;"));
        assert!(kernels[2].compute.contains("uint  base  = 1000u;"));
        assert!(kernels[2].compute.contains("uvec4(index + base + 3u, 0u, 0u, 0u)"));
        assert!(kernels[3].compute.contains("readonly  uniform highp uimage2DMS uni_source_image;"));
        assert!(kernels[3].compute.contains("uvec4(index + 3u)"));

        let core = image_copy_program(API, TexelFormat::R8, 0, 0, 0, 0).unwrap();
        assert!(!core.compute.contains("highp"));
    }
}
