//! Execution of draws and dispatches for the recognised kernels.
//!
//! Every entry point returns the GL error to record on failure. Reads happen before writes so
//! a command either completes or leaves every resource untouched.

use rba_gl::enums as gl;

use crate::format::Texel;
use crate::kernel::{BlockKind, BufferCopyKernel, ComputeKernel, ImageCopyKernel, Pipeline, Plane, ProbeValue, StageKernel, TexelFetchKernel};
use crate::{Coord, ImageUnit, OutOfBoundsRead, OutOfBoundsWrite, Robustness, State, TexStorage};

type ExecResult<T> = Result<T, u32>;

/// Samples touched by the multisample helper kernels.
const KERNEL_SAMPLES: i64 = 4;

pub(crate) fn draw_elements(state: &mut State, mode: u32, count: u32, ty: u32, offset: usize) -> ExecResult<()> {
    if mode != gl::TRIANGLES || ty != gl::UNSIGNED_INT {
        return Err(gl::INVALID_ENUM);
    }
    let Some(Pipeline::Raster {
        vertex: StageKernel::PassthroughPosition,
        fragment: StageKernel::ConstantColor { value },
        ..
    }) = current_pipeline(state)
    else {
        return Err(gl::INVALID_OPERATION);
    };

    let vao = state
        .vertex_arrays
        .get(&state.current_vertex_array)
        .ok_or(gl::INVALID_OPERATION)?;
    let elements = state
        .buffers
        .get(&vao.element_buffer)
        .ok_or(gl::INVALID_OPERATION)?;
    let index_bytes = elements
        .data
        .get(offset..offset + count as usize * 4)
        .ok_or(gl::INVALID_OPERATION)?;
    let indices: Vec<u32> = index_bytes
        .chunks_exact(4)
        .map(bytemuck::pod_read_unaligned::<u32>)
        .collect();

    let attrib = vao.attribs[0];
    let binding = vao.bindings[0];
    if !attrib.enabled {
        return Err(gl::INVALID_OPERATION);
    }
    let vertices = &state.buffers.get(&binding.buffer).ok_or(gl::INVALID_OPERATION)?.data;

    let robustness = state.robustness();
    let mut triangles = Vec::with_capacity(indices.len() / 3);
    for tri in indices.chunks_exact(3) {
        let mut corners = [[0.0f32; 4]; 3];
        for (corner, &index) in corners.iter_mut().zip(tri) {
            *corner = fetch_position(vertices, binding.offset + attrib.relative_offset, binding.stride, attrib.size, index, robustness)?;
        }
        // A zero `w` collapses the clipped primitive onto an edge.
        if corners.iter().any(|c| c[3] <= 0.0) {
            continue;
        }
        triangles.push(corners.map(|c| [c[0] / c[3], c[1] / c[3]]));
    }

    let target = render_target(state)?;
    let viewport = state.viewport;
    let storage = target_storage(state, target.texture)?;
    let level = target.level as i64;
    let (width, height) = level_dims(storage, level);
    let marker = Texel::Uint([value; 4]);
    for corners in triangles {
        for (x, y) in covered_pixels(corners, viewport, width, height) {
            for sample in 0..i64::from(storage.samples) {
                store_texel(storage, Coord { level, x, y, sample }, marker);
            }
        }
    }
    Ok(())
}

pub(crate) fn draw_arrays(state: &mut State, mode: u32, _first: u32, count: u32) -> ExecResult<()> {
    if mode != gl::POINTS {
        return Err(gl::INVALID_ENUM);
    }
    let Some(Pipeline::Raster {
        vertex: StageKernel::PointOrigin,
        geometry: Some(StageKernel::PointToQuad),
        fragment: StageKernel::TexelFetch(kernel),
    }) = current_pipeline(state)
    else {
        return Err(gl::INVALID_OPERATION);
    };
    if count == 0 {
        return Ok(());
    }

    let unit = uniform(state, 0);
    let sampler_target = if kernel.multisample {
        gl::TEXTURE_2D_MULTISAMPLE
    } else {
        gl::TEXTURE_2D
    };
    let source = state
        .texture_units
        .get(&(unit, sampler_target))
        .and_then(|id| state.textures.get(id))
        .and_then(|t| t.storage.clone())
        .ok_or(gl::INVALID_OPERATION)?;

    let target = render_target(state)?;
    let (vx, vy, vw, vh) = state.viewport;
    let robustness = state.robustness();
    // Without GL_MULTISAMPLE each fragment is shaded once and its color covers every sample.
    let per_sample = state.is_enabled(gl::MULTISAMPLE);
    let level = target.level as i64;
    let (width, height, samples) = {
        let storage = target_storage(state, target.texture)?;
        let (w, h) = level_dims(storage, level);
        (w, h, i64::from(storage.samples))
    };

    let mut writes = Vec::new();
    for y in 0..height {
        for x in 0..width {
            let (rx, ry) = (x - i64::from(vx), y - i64::from(vy));
            if rx < 0 || ry < 0 || rx >= i64::from(vw) || ry >= i64::from(vh) {
                continue;
            }
            let tex_coord = |r: i64, size: u32| ((r as f32 + 0.5) / size as f32 * kernel.coord_scale).floor() as i64;
            for sample in 0..samples {
                let sample_id = if per_sample { sample } else { 0 };
                let fetched = fetch_texel(&source, &kernel, tex_coord(rx, vw), tex_coord(ry, vh), sample_id, robustness)?;
                writes.push((Coord { level, x, y, sample }, fetched));
            }
        }
    }

    let storage = target_storage(state, target.texture)?;
    for (coord, texel) in writes {
        store_texel(storage, coord, texel);
    }
    Ok(())
}

pub(crate) fn dispatch_compute(state: &mut State, x: u32, y: u32, z: u32) -> ExecResult<()> {
    let Some(Pipeline::Compute(kernel)) = current_pipeline(state) else {
        return Err(gl::INVALID_OPERATION);
    };
    match kernel {
        ComputeKernel::BufferCopy(k) => buffer_copy(state, &k, x * y * z),
        ComputeKernel::ImageCopy(k) => image_copy(state, &k, x, y),
        ComputeKernel::MultisampleFill { row_width, base } => multisample_fill(state, row_width, base, x, y),
        ComputeKernel::MultisampleProbe { row_width, expected } => multisample_probe(state, row_width, expected, x, y),
    }
}

fn buffer_copy(state: &mut State, kernel: &BufferCopyKernel, groups: u32) -> ExecResult<()> {
    let robustness = state.robustness();
    let source_id = indexed_buffer(state, kernel.source.target(), kernel.source.binding)?;
    let destination_id = indexed_buffer(state, kernel.destination.target(), kernel.destination.binding)?;
    let read_policy = match kernel.source.kind {
        BlockKind::Storage => robustness.storage_load,
        BlockKind::Uniform => robustness.uniform_load,
    };

    let source = &state.buffers.get(&source_id).ok_or(gl::INVALID_OPERATION)?.data;
    let mut copies = Vec::new();
    for _ in 0..groups {
        for lid in 0..u64::from(kernel.local_size) {
            let value = read_element(source, kernel.source.stride, lid + kernel.source_offset, read_policy, robustness)?;
            copies.push((lid + kernel.destination_offset, value));
        }
    }

    let destination = &mut state
        .buffers
        .get_mut(&destination_id)
        .ok_or(gl::INVALID_OPERATION)?
        .data;
    let stride = kernel.destination.stride;
    let mut resolved = Vec::with_capacity(copies.len());
    for (index, value) in copies {
        if let Some(at) = resolve_element_write(destination.len(), stride, index, robustness)? {
            resolved.push((at, value));
        }
    }
    for (at, value) in resolved {
        destination[at..at + 4].copy_from_slice(&value);
    }
    Ok(())
}

fn image_copy(state: &mut State, kernel: &ImageCopyKernel, x: u32, y: u32) -> ExecResult<()> {
    let robustness = state.robustness();
    let (source_unit, destination_unit) = (image_unit(state, uniform(state, 0))?, image_unit(state, uniform(state, 1))?);
    let source = image_storage(state, source_unit)?.clone();

    let samples = if kernel.multisample { KERNEL_SAMPLES } else { 1 };
    let mut writes = Vec::new();
    for gy in 0..i64::from(y) {
        for gx in 0..i64::from(x) {
            for k in 0..samples {
                let (src_sample, dst_sample) = if kernel.multisample {
                    (k + kernel.source_sample_offset, k + kernel.destination_sample_offset)
                } else {
                    (0, 0)
                };
                let from = Coord {
                    level: i64::from(source_unit.level),
                    x: gx + kernel.source_offset,
                    y: gy + kernel.source_offset,
                    sample: src_sample,
                };
                let texel = load_texel(&source, from, robustness.image_load, robustness)?;
                let to = Coord {
                    level: i64::from(destination_unit.level),
                    x: gx + kernel.destination_offset,
                    y: gy + kernel.destination_offset,
                    sample: dst_sample,
                };
                writes.push((to, texel));
            }
        }
    }
    apply_image_writes(state, destination_unit, writes, robustness)
}

fn multisample_fill(state: &mut State, row_width: u32, base: u32, x: u32, y: u32) -> ExecResult<()> {
    let robustness = state.robustness();
    let unit = image_unit(state, uniform(state, 0))?;
    let mut writes = Vec::new();
    for gy in 0..y {
        for gx in 0..x {
            let index = base + gy * row_width + gx;
            for k in 0..KERNEL_SAMPLES {
                let coord = Coord {
                    level: i64::from(unit.level),
                    x: i64::from(gx),
                    y: i64::from(gy),
                    sample: k,
                };
                writes.push((coord, Texel::Uint([index + k as u32, 0, 0, 0])));
            }
        }
    }
    apply_image_writes(state, unit, writes, robustness)
}

fn multisample_probe(state: &mut State, row_width: u32, expected: ProbeValue, x: u32, y: u32) -> ExecResult<()> {
    let robustness = state.robustness();
    let (source_unit, destination_unit) = (image_unit(state, uniform(state, 0))?, image_unit(state, uniform(state, 1))?);
    let source = image_storage(state, source_unit)?.clone();

    let mut writes = Vec::new();
    for gy in 0..y {
        for gx in 0..x {
            let index = gy * row_width + gx;
            let wanted = match expected {
                ProbeValue::Constant(value) => value,
                ProbeValue::IndexPlus(delta) => index + delta,
            };
            let mut hit = false;
            for k in 0..KERNEL_SAMPLES {
                let coord = Coord {
                    level: i64::from(source_unit.level),
                    x: i64::from(gx),
                    y: i64::from(gy),
                    sample: k,
                };
                hit |= red_uint(load_texel(&source, coord, robustness.image_load, robustness)?) == wanted;
            }
            let coord = Coord {
                level: i64::from(destination_unit.level),
                x: i64::from(gx),
                y: i64::from(gy),
                sample: 0,
            };
            writes.push((coord, Texel::Uint([u32::from(hit), 0, 0, 0])));
        }
    }
    apply_image_writes(state, destination_unit, writes, robustness)
}

fn current_pipeline(state: &State) -> Option<Pipeline> {
    state.programs.get(&state.current_program)?.pipeline
}

fn uniform(state: &State, location: i32) -> u32 {
    state
        .programs
        .get(&state.current_program)
        .and_then(|p| p.uniforms.get(&location))
        .map_or(0, |&v| v.max(0) as u32)
}

fn indexed_buffer(state: &State, target: u32, binding: u32) -> ExecResult<u32> {
    state
        .indexed_bindings
        .get(&(target, binding))
        .copied()
        .filter(|&id| id != 0)
        .ok_or(gl::INVALID_OPERATION)
}

fn image_unit(state: &State, unit: u32) -> ExecResult<ImageUnit> {
    state.image_units.get(&unit).copied().ok_or(gl::INVALID_OPERATION)
}

fn image_storage(state: &State, unit: ImageUnit) -> ExecResult<&TexStorage> {
    state
        .textures
        .get(&unit.texture)
        .and_then(|t| t.storage.as_ref())
        .ok_or(gl::INVALID_OPERATION)
}

fn render_target(state: &State) -> ExecResult<crate::Attachment> {
    state.color_target().ok_or(gl::INVALID_FRAMEBUFFER_OPERATION)
}

fn target_storage(state: &mut State, texture: u32) -> ExecResult<&mut TexStorage> {
    state
        .textures
        .get_mut(&texture)
        .and_then(|t| t.storage.as_mut())
        .filter(|s| s.layout.color_renderable)
        .ok_or(gl::INVALID_FRAMEBUFFER_OPERATION)
}

fn level_dims(storage: &TexStorage, level: i64) -> (i64, i64) {
    storage
        .levels
        .get(level as usize)
        .map_or((0, 0), |l| (i64::from(l.width), i64::from(l.height)))
}

fn lose_check(robustness: Robustness, overshoot: u64) -> ExecResult<()> {
    match robustness.lose_context_beyond {
        Some(limit) if overshoot > limit => Err(gl::CONTEXT_LOST),
        _ => Ok(()),
    }
}

fn fetch_position(
    data: &[u8],
    base: usize,
    stride: usize,
    size: u32,
    index: u32,
    robustness: Robustness,
) -> ExecResult<[f32; 4]> {
    let need = size as u64 * 4;
    let len = data.len() as u64;
    // Missing components default to (0, 0, 0, 1).
    let read = |index: u64| -> [f32; 4] {
        let at = (base as u64 + index * stride as u64) as usize;
        let mut out = [0.0, 0.0, 0.0, 1.0];
        for (c, value) in out.iter_mut().enumerate().take(size as usize) {
            *value = bytemuck::pod_read_unaligned::<f32>(&data[at + c * 4..at + c * 4 + 4]);
        }
        out
    };
    // Number of whole vertices available from `base`.
    let available = if len >= base as u64 + need {
        (len - base as u64 - need) / stride.max(1) as u64 + 1
    } else {
        0
    };
    let index = u64::from(index);
    if index < available {
        return Ok(read(index));
    }
    let end = base as u64 + index * stride as u64 + need;
    lose_check(robustness, end.saturating_sub(len))?;
    Ok(match robustness.vertex_fetch {
        OutOfBoundsRead::Zero => [0.0; 4],
        _ if available == 0 => [0.0; 4],
        OutOfBoundsRead::ClampToEdge => read(available - 1),
        OutOfBoundsRead::Wrap => read(index % available),
    })
}

fn fetch_texel(
    source: &TexStorage,
    kernel: &TexelFetchKernel,
    x: i64,
    y: i64,
    sample_id: i64,
    robustness: Robustness,
) -> ExecResult<Texel> {
    let plane = match kernel.plane {
        Plane::Fixed(plane) => plane,
        Plane::SampleId => sample_id,
    };
    let coord = if kernel.multisample {
        Coord { level: 0, x: x + kernel.offset, y: y + kernel.offset, sample: plane }
    } else {
        Coord { level: plane, x: x + kernel.offset, y: y + kernel.offset, sample: 0 }
    };
    load_texel(source, coord, robustness.texel_fetch, robustness)
}

fn load_texel(storage: &TexStorage, coord: Coord, policy: OutOfBoundsRead, robustness: Robustness) -> ExecResult<Texel> {
    let decode = |c: Coord| -> Texel {
        match storage.byte_offset(c) {
            Some(at) => {
                let level = &storage.levels[c.level as usize];
                storage.layout.decode(&level.data[at..at + storage.layout.bytes_per_texel()])
            }
            None => storage.layout.zero(),
        }
    };
    if storage.byte_offset(coord).is_some() {
        return Ok(decode(coord));
    }
    lose_check(robustness, storage.overshoot_bytes(coord))?;
    Ok(match policy {
        OutOfBoundsRead::Zero => storage.layout.zero(),
        OutOfBoundsRead::ClampToEdge => decode(storage.clamp(coord)),
        OutOfBoundsRead::Wrap => decode(storage.wrap(coord)),
    })
}

/// Final location of an image store, `None` when it is discarded.
fn resolve_texel_write(storage: &TexStorage, coord: Coord, robustness: Robustness) -> ExecResult<Option<Coord>> {
    if storage.byte_offset(coord).is_some() {
        return Ok(Some(coord));
    }
    lose_check(robustness, storage.overshoot_bytes(coord))?;
    Ok(match robustness.image_store {
        OutOfBoundsWrite::Discard => None,
        OutOfBoundsWrite::ClampToEdge => Some(storage.clamp(coord)),
        OutOfBoundsWrite::Wrap => Some(storage.wrap(coord)),
    })
}

fn apply_image_writes(
    state: &mut State,
    unit: ImageUnit,
    writes: Vec<(Coord, Texel)>,
    robustness: Robustness,
) -> ExecResult<()> {
    let storage = state
        .textures
        .get_mut(&unit.texture)
        .and_then(|t| t.storage.as_mut())
        .ok_or(gl::INVALID_OPERATION)?;
    let mut resolved = Vec::with_capacity(writes.len());
    for (coord, texel) in writes {
        if let Some(coord) = resolve_texel_write(storage, coord, robustness)? {
            resolved.push((coord, texel));
        }
    }
    for (coord, texel) in resolved {
        store_texel(storage, coord, texel);
    }
    Ok(())
}

fn store_texel(storage: &mut TexStorage, coord: Coord, texel: Texel) {
    let Some(at) = storage.byte_offset(coord) else {
        return;
    };
    let bpt = storage.layout.bytes_per_texel();
    let layout = storage.layout;
    let level = &mut storage.levels[coord.level as usize];
    layout.encode(texel, &mut level.data[at..at + bpt]);
}

fn read_element(
    data: &[u8],
    stride: usize,
    index: u64,
    policy: OutOfBoundsRead,
    robustness: Robustness,
) -> ExecResult<[u8; 4]> {
    let len = data.len() as u64;
    let count = element_count(len, stride);
    let read = |index: u64| -> [u8; 4] {
        let at = (index * stride as u64) as usize;
        let mut out = [0u8; 4];
        out.copy_from_slice(&data[at..at + 4]);
        out
    };
    if index < count {
        return Ok(read(index));
    }
    lose_check(robustness, (index * stride as u64 + 4).saturating_sub(len))?;
    Ok(match policy {
        OutOfBoundsRead::Zero => [0; 4],
        _ if count == 0 => [0; 4],
        OutOfBoundsRead::ClampToEdge => read(count - 1),
        OutOfBoundsRead::Wrap => read(index % count),
    })
}

fn resolve_element_write(len: usize, stride: usize, index: u64, robustness: Robustness) -> ExecResult<Option<usize>> {
    let count = element_count(len as u64, stride);
    let at = |index: u64| (index * stride as u64) as usize;
    if index < count {
        return Ok(Some(at(index)));
    }
    lose_check(robustness, (index * stride as u64 + 4).saturating_sub(len as u64))?;
    Ok(match robustness.storage_store {
        OutOfBoundsWrite::Discard => None,
        _ if count == 0 => None,
        OutOfBoundsWrite::ClampToEdge => Some(at(count - 1)),
        OutOfBoundsWrite::Wrap => Some(at(index % count)),
    })
}

/// Number of 4-byte elements fully inside a buffer of `len` bytes.
fn element_count(len: u64, stride: usize) -> u64 {
    if len < 4 {
        0
    } else {
        (len - 4) / stride as u64 + 1
    }
}

fn red_uint(texel: Texel) -> u32 {
    match texel {
        Texel::Uint(v) => v[0],
        Texel::Float(v) => v[0].max(0.0) as u32,
    }
}

/// Pixels whose centres lie inside or on the edge of the triangle, in framebuffer coordinates.
fn covered_pixels(corners: [[f32; 2]; 3], viewport: (i32, i32, u32, u32), width: i64, height: i64) -> Vec<(i64, i64)> {
    let (vx, vy, vw, vh) = viewport;
    let to_window = |p: [f32; 2]| -> [f32; 2] {
        [
            vx as f32 + (p[0] + 1.0) * 0.5 * vw as f32,
            vy as f32 + (p[1] + 1.0) * 0.5 * vh as f32,
        ]
    };
    let [a, b, c] = corners.map(to_window);
    let edge = |p: [f32; 2], q: [f32; 2], r: [f32; 2]| (q[0] - p[0]) * (r[1] - p[1]) - (q[1] - p[1]) * (r[0] - p[0]);
    let area = edge(a, b, c);
    if area.abs() < f32::EPSILON {
        return Vec::new();
    }

    let x_range = i64::from(vx).max(0)..(i64::from(vx) + i64::from(vw)).min(width);
    let y_range = i64::from(vy).max(0)..(i64::from(vy) + i64::from(vh)).min(height);
    let mut out = Vec::new();
    for y in y_range {
        for x in x_range.clone() {
            let p = [x as f32 + 0.5, y as f32 + 0.5];
            let w = [edge(b, c, p), edge(c, a, p), edge(a, b, p)];
            let inside = if area > 0.0 {
                w.iter().all(|&e| e >= 0.0)
            } else {
                w.iter().all(|&e| e <= 0.0)
            };
            if inside {
                out.push((x, y));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fan_triangle_covers_its_quadrant_corner() {
        let pixels = covered_pixels([[0.0, 0.0], [-1.0, 0.0], [-1.0, 1.0]], (0, 0, 8, 8), 8, 8);
        assert!(pixels.contains(&(0, 7)));
        assert!(pixels.contains(&(3, 4)));
        assert!(!pixels.contains(&(5, 5)));
    }

    #[test]
    fn degenerate_triangle_covers_nothing() {
        assert!(covered_pixels([[0.0, 0.0], [-1.0, 0.0], [0.0, 0.0]], (0, 0, 8, 8), 8, 8).is_empty());
    }

    #[test]
    fn out_of_bounds_positions_are_all_zero() {
        let data: Vec<u8> = bytemuck::cast_slice(&[0.5f32, -0.5, 0.0]).to_vec();
        let conformant = Robustness::conformant();
        assert_eq!(fetch_position(&data, 0, 12, 3, 0, conformant), Ok([0.5, -0.5, 0.0, 1.0]));
        assert_eq!(fetch_position(&data, 0, 12, 3, 1, conformant), Ok([0.0; 4]));
    }

    #[test]
    fn element_reads_follow_policy() {
        let data: Vec<u8> = [2.0f32, 3.0, 4.0, 5.0]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let conformant = Robustness::conformant();
        assert_eq!(read_element(&data, 4, 1, OutOfBoundsRead::Zero, conformant), Ok(3.0f32.to_le_bytes()));
        assert_eq!(read_element(&data, 4, 20, OutOfBoundsRead::Zero, conformant), Ok([0; 4]));
        assert_eq!(read_element(&data, 4, 20, OutOfBoundsRead::ClampToEdge, conformant), Ok(5.0f32.to_le_bytes()));
        assert_eq!(read_element(&data, 4, 5, OutOfBoundsRead::Wrap, conformant), Ok(3.0f32.to_le_bytes()));
    }

    #[test]
    fn far_reads_lose_the_context_when_configured() {
        let robustness = Robustness {
            lose_context_beyond: Some(1024),
            ..Robustness::conformant()
        };
        let data = [0u8; 16];
        assert_eq!(read_element(&data, 4, 100, OutOfBoundsRead::Zero, robustness), Ok([0; 4]));
        assert_eq!(read_element(&data, 4, 1 << 20, OutOfBoundsRead::Zero, robustness), Err(gl::CONTEXT_LOST));
    }

    #[test]
    fn std140_stride_limits_uniform_elements() {
        assert_eq!(element_count(64, 16), 4);
        assert_eq!(element_count(16, 4), 4);
        assert_eq!(element_count(3, 4), 0);
    }
}
