//! Deterministic software GL device.
//!
//! `SoftGl` implements [`rba_gl::Gl`] entirely on the CPU so the conformance suite can be tested
//! without a driver. It keeps real GL object state (names, bindings, immutable texture storage,
//! sticky error flag) and executes the kernels the suite generates, see `kernel`.
//!
//! Out-of-bounds behaviour is configurable through [`Robustness`]: the conformant profile returns
//! zero for every out-of-bounds read and discards every out-of-bounds write, while the other
//! settings reproduce the kinds of driver defects the suite is meant to catch.

mod exec;
mod format;
mod kernel;

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use rba_gl::enums as gl;
use rba_gl::{ApiType, BarrierBits, Gl};

use crate::format::TexelLayout;
use crate::kernel::{Pipeline, StageKernel};

pub const KHR_ROBUST_BUFFER_ACCESS_BEHAVIOR: &str = "GL_KHR_robust_buffer_access_behavior";
pub const ARB_ROBUST_BUFFER_ACCESS_BEHAVIOR: &str = "GL_ARB_robust_buffer_access_behavior";

const MAX_VERTEX_ATTRIBS: usize = 16;
const MAX_IMAGE_UNITS: u32 = 8;

/// What an out-of-bounds read returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutOfBoundsRead {
    /// Zero in every component.
    Zero,
    /// The nearest in-bounds element.
    ClampToEdge,
    /// The element at the index taken modulo the resource size.
    Wrap,
}

/// What happens to an out-of-bounds write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutOfBoundsWrite {
    Discard,
    ClampToEdge,
    Wrap,
}

/// Out-of-bounds behaviour per access path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Robustness {
    pub vertex_fetch: OutOfBoundsRead,
    pub texel_fetch: OutOfBoundsRead,
    pub image_load: OutOfBoundsRead,
    pub image_store: OutOfBoundsWrite,
    pub storage_load: OutOfBoundsRead,
    pub storage_store: OutOfBoundsWrite,
    pub uniform_load: OutOfBoundsRead,
    /// Raise `GL_CONTEXT_LOST` for accesses reaching further than this many bytes past the end
    /// of a resource.
    pub lose_context_beyond: Option<u64>,
}

impl Robustness {
    pub const fn conformant() -> Self {
        Self {
            vertex_fetch: OutOfBoundsRead::Zero,
            texel_fetch: OutOfBoundsRead::Zero,
            image_load: OutOfBoundsRead::Zero,
            image_store: OutOfBoundsWrite::Discard,
            storage_load: OutOfBoundsRead::Zero,
            storage_store: OutOfBoundsWrite::Discard,
            uniform_load: OutOfBoundsRead::Zero,
            lose_context_beyond: None,
        }
    }
}

impl Default for Robustness {
    fn default() -> Self {
        Self::conformant()
    }
}

#[derive(Clone, Debug)]
pub struct SoftConfig {
    pub api: ApiType,
    pub extensions: Vec<String>,
    pub max_integer_samples: i32,
    pub max_image_samples: i32,
    pub max_color_texture_samples: i32,
    pub robustness: Robustness,
    /// Make every `gen_*`/`create_*` call return the invalid name.
    pub fail_object_creation: bool,
}

impl Default for SoftConfig {
    fn default() -> Self {
        Self {
            api: ApiType::core(4, 5),
            extensions: vec![
                KHR_ROBUST_BUFFER_ACCESS_BEHAVIOR.to_string(),
                ARB_ROBUST_BUFFER_ACCESS_BEHAVIOR.to_string(),
            ],
            max_integer_samples: 4,
            max_image_samples: 4,
            max_color_texture_samples: 4,
            robustness: Robustness::conformant(),
            fail_object_creation: false,
        }
    }
}

/// Number of live objects of each kind.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ObjectCounts {
    pub buffers: usize,
    pub textures: usize,
    pub framebuffers: usize,
    pub shaders: usize,
    pub programs: usize,
    pub vertex_arrays: usize,
}

impl ObjectCounts {
    pub fn total(&self) -> usize {
        self.buffers + self.textures + self.framebuffers + self.shaders + self.programs + self.vertex_arrays
    }
}

pub(crate) struct BufferObject {
    pub data: Vec<u8>,
}

#[derive(Clone, Debug)]
pub(crate) struct Level {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Coord {
    pub level: i64,
    pub x: i64,
    pub y: i64,
    pub sample: i64,
}

#[derive(Clone, Debug)]
pub(crate) struct TexStorage {
    pub layout: TexelLayout,
    pub samples: u32,
    pub levels: Vec<Level>,
}

impl TexStorage {
    pub fn byte_offset(&self, c: Coord) -> Option<usize> {
        let level = self.levels.get(usize::try_from(c.level).ok()?)?;
        let (w, h, s) = (i64::from(level.width), i64::from(level.height), i64::from(self.samples));
        if !(0..w).contains(&c.x) || !(0..h).contains(&c.y) || !(0..s).contains(&c.sample) {
            return None;
        }
        let index = ((c.y * w + c.x) * s + c.sample) as usize;
        Some(index * self.layout.bytes_per_texel())
    }

    /// Rough distance in bytes between `c` and the nearest valid texel.
    pub fn overshoot_bytes(&self, c: Coord) -> u64 {
        let last_level = self.levels.len() as i64 - 1;
        let level = &self.levels[c.level.clamp(0, last_level.max(0)) as usize];
        let over = |v: i64, len: i64| -> u64 {
            if v < 0 {
                v.unsigned_abs()
            } else {
                (v - (len - 1)).max(0) as u64
            }
        };
        let texels = over(c.x, i64::from(level.width))
            + over(c.y, i64::from(level.height)) * u64::from(level.width)
            + over(c.level, last_level + 1) * u64::from(level.width) * u64::from(level.height);
        let samples = over(c.sample, i64::from(self.samples));
        (texels * u64::from(self.samples) + samples) * self.layout.bytes_per_texel() as u64
    }

    pub fn clamp(&self, c: Coord) -> Coord {
        let level = c.level.clamp(0, self.levels.len() as i64 - 1);
        let dims = &self.levels[level as usize];
        Coord {
            level,
            x: c.x.clamp(0, i64::from(dims.width) - 1),
            y: c.y.clamp(0, i64::from(dims.height) - 1),
            sample: c.sample.clamp(0, i64::from(self.samples) - 1),
        }
    }

    pub fn wrap(&self, c: Coord) -> Coord {
        let level = c.level.rem_euclid(self.levels.len() as i64);
        let dims = &self.levels[level as usize];
        Coord {
            level,
            x: c.x.rem_euclid(i64::from(dims.width)),
            y: c.y.rem_euclid(i64::from(dims.height)),
            sample: c.sample.rem_euclid(i64::from(self.samples)),
        }
    }
}

pub(crate) struct TextureObject {
    pub target: u32,
    pub storage: Option<TexStorage>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Attachment {
    pub texture: u32,
    pub level: u32,
}

#[derive(Default)]
struct FramebufferObject {
    color0: Option<Attachment>,
}

struct ShaderObject {
    stage: u32,
    source: String,
    kernel: Option<StageKernel>,
    log: String,
}

#[derive(Default)]
pub(crate) struct ProgramObject {
    attached: Vec<u32>,
    pub pipeline: Option<Pipeline>,
    log: String,
    pub uniforms: HashMap<i32, i32>,
}

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct VertexBinding {
    pub buffer: u32,
    pub offset: usize,
    pub stride: usize,
}

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct VertexAttrib {
    pub enabled: bool,
    pub size: u32,
    pub relative_offset: usize,
}

#[derive(Default)]
pub(crate) struct VertexArrayObject {
    pub element_buffer: u32,
    pub bindings: [VertexBinding; MAX_VERTEX_ATTRIBS],
    pub attribs: [VertexAttrib; MAX_VERTEX_ATTRIBS],
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ImageUnit {
    pub texture: u32,
    pub level: u32,
}

pub(crate) struct State {
    config: SoftConfig,
    error: u32,
    next_name: u32,
    retired: HashSet<u32>,
    double_deletes: usize,
    pub buffers: HashMap<u32, BufferObject>,
    pub textures: HashMap<u32, TextureObject>,
    framebuffers: HashMap<u32, FramebufferObject>,
    shaders: HashMap<u32, ShaderObject>,
    pub programs: HashMap<u32, ProgramObject>,
    pub vertex_arrays: HashMap<u32, VertexArrayObject>,
    buffer_bindings: HashMap<u32, u32>,
    pub indexed_bindings: HashMap<(u32, u32), u32>,
    active_unit: u32,
    pub texture_units: HashMap<(u32, u32), u32>,
    pub image_units: HashMap<u32, ImageUnit>,
    draw_framebuffer: u32,
    read_framebuffer: u32,
    pub viewport: (i32, i32, u32, u32),
    pub current_program: u32,
    pub current_vertex_array: u32,
    enabled: HashSet<u32>,
}

impl State {
    fn new(config: SoftConfig) -> Self {
        Self {
            config,
            error: gl::NO_ERROR,
            next_name: 1,
            retired: HashSet::new(),
            double_deletes: 0,
            buffers: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            vertex_arrays: HashMap::new(),
            buffer_bindings: HashMap::new(),
            indexed_bindings: HashMap::new(),
            active_unit: 0,
            texture_units: HashMap::new(),
            image_units: HashMap::new(),
            draw_framebuffer: 0,
            read_framebuffer: 0,
            viewport: (0, 0, 0, 0),
            current_program: 0,
            current_vertex_array: 0,
            enabled: HashSet::new(),
        }
    }

    pub fn robustness(&self) -> Robustness {
        self.config.robustness
    }

    pub fn set_error(&mut self, code: u32) {
        tracing::debug!(code = gl::error_name(code), "soft gl error");
        if self.error == gl::NO_ERROR {
            self.error = code;
        }
    }

    fn alloc_name(&mut self) -> Option<u32> {
        if self.config.fail_object_creation {
            return None;
        }
        let name = self.next_name;
        self.next_name += 1;
        Some(name)
    }

    fn retire(&mut self, name: u32, existed: bool) {
        if existed {
            self.retired.insert(name);
        } else if self.retired.contains(&name) {
            self.double_deletes += 1;
        }
    }

    fn bound_buffer(&self, target: u32) -> Option<u32> {
        let id = if target == gl::ELEMENT_ARRAY_BUFFER && self.current_vertex_array != 0 {
            self.vertex_arrays.get(&self.current_vertex_array)?.element_buffer
        } else {
            self.buffer_bindings.get(&target).copied().unwrap_or(0)
        };
        (id != 0).then_some(id)
    }

    fn bound_texture(&self, target: u32) -> Option<u32> {
        self.texture_units
            .get(&(self.active_unit, target))
            .copied()
            .filter(|&id| id != 0)
    }

    fn framebuffer_binding(&self, target: u32) -> Option<u32> {
        match target {
            gl::FRAMEBUFFER | gl::DRAW_FRAMEBUFFER => Some(self.draw_framebuffer),
            gl::READ_FRAMEBUFFER => Some(self.read_framebuffer),
            _ => None,
        }
    }

    /// Texture and level attached as color 0 of the draw framebuffer.
    pub fn color_target(&self) -> Option<Attachment> {
        self.framebuffers.get(&self.draw_framebuffer)?.color0
    }

    pub fn is_enabled(&self, cap: u32) -> bool {
        self.enabled.contains(&cap)
    }

    fn framebuffer_status(&self, framebuffer: u32) -> u32 {
        let Some(fbo) = self.framebuffers.get(&framebuffer) else {
            return gl::FRAMEBUFFER_UNSUPPORTED;
        };
        let Some(attachment) = fbo.color0 else {
            return gl::FRAMEBUFFER_INCOMPLETE_MISSING_ATTACHMENT;
        };
        let Some(storage) = self
            .textures
            .get(&attachment.texture)
            .and_then(|t| t.storage.as_ref())
        else {
            return gl::FRAMEBUFFER_INCOMPLETE_ATTACHMENT;
        };
        if attachment.level as usize >= storage.levels.len() {
            return gl::FRAMEBUFFER_INCOMPLETE_ATTACHMENT;
        }
        if !storage.layout.color_renderable {
            return gl::FRAMEBUFFER_UNSUPPORTED;
        }
        gl::FRAMEBUFFER_COMPLETE
    }
}

/// Software implementation of [`Gl`].
pub struct SoftGl {
    state: RefCell<State>,
}

impl Default for SoftGl {
    fn default() -> Self {
        Self::new(SoftConfig::default())
    }
}

impl SoftGl {
    pub fn new(config: SoftConfig) -> Self {
        Self {
            state: RefCell::new(State::new(config)),
        }
    }

    pub fn with_robustness(robustness: Robustness) -> Self {
        Self::new(SoftConfig {
            robustness,
            ..SoftConfig::default()
        })
    }

    pub fn live_objects(&self) -> ObjectCounts {
        let state = self.state.borrow();
        ObjectCounts {
            buffers: state.buffers.len(),
            textures: state.textures.len(),
            framebuffers: state.framebuffers.len(),
            shaders: state.shaders.len(),
            programs: state.programs.len(),
            vertex_arrays: state.vertex_arrays.len(),
        }
    }

    /// Deletions of names that had already been deleted.
    pub fn double_deletes(&self) -> usize {
        self.state.borrow().double_deletes
    }

    fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        f(&mut self.state.borrow_mut())
    }
}

impl Gl for SoftGl {
    fn api_type(&self) -> ApiType {
        self.state.borrow().config.api
    }

    fn is_extension_supported(&self, name: &str) -> bool {
        self.state.borrow().config.extensions.iter().any(|e| e == name)
    }

    fn get_error(&self) -> u32 {
        self.with(|s| std::mem::replace(&mut s.error, gl::NO_ERROR))
    }

    fn get_integer(&self, pname: u32) -> i32 {
        self.with(|s| match pname {
            gl::MAX_INTEGER_SAMPLES => s.config.max_integer_samples,
            gl::MAX_IMAGE_SAMPLES => s.config.max_image_samples,
            gl::MAX_COLOR_TEXTURE_SAMPLES => s.config.max_color_texture_samples,
            _ => {
                s.set_error(gl::INVALID_ENUM);
                0
            }
        })
    }

    fn enable(&self, cap: u32) {
        self.with(|s| {
            s.enabled.insert(cap);
        })
    }

    fn disable(&self, cap: u32) {
        self.with(|s| {
            s.enabled.remove(&cap);
        })
    }

    fn gen_buffer(&self) -> u32 {
        self.with(|s| match s.alloc_name() {
            Some(name) => {
                s.buffers.insert(name, BufferObject { data: Vec::new() });
                name
            }
            None => u32::MAX,
        })
    }

    fn delete_buffer(&self, buffer: u32) {
        self.with(|s| {
            let existed = s.buffers.remove(&buffer).is_some();
            if existed {
                s.buffer_bindings.retain(|_, id| *id != buffer);
                s.indexed_bindings.retain(|_, id| *id != buffer);
                for vao in s.vertex_arrays.values_mut() {
                    if vao.element_buffer == buffer {
                        vao.element_buffer = 0;
                    }
                    for binding in vao.bindings.iter_mut().filter(|b| b.buffer == buffer) {
                        binding.buffer = 0;
                    }
                }
            }
            s.retire(buffer, existed);
        })
    }

    fn bind_buffer(&self, target: u32, buffer: u32) {
        self.with(|s| {
            if buffer != 0 && !s.buffers.contains_key(&buffer) {
                s.set_error(gl::INVALID_OPERATION);
                return;
            }
            if target == gl::ELEMENT_ARRAY_BUFFER && s.current_vertex_array != 0 {
                if let Some(vao) = s.vertex_arrays.get_mut(&s.current_vertex_array) {
                    vao.element_buffer = buffer;
                }
                return;
            }
            s.buffer_bindings.insert(target, buffer);
        })
    }

    fn bind_buffer_base(&self, target: u32, index: u32, buffer: u32) {
        self.with(|s| {
            if !matches!(
                target,
                gl::SHADER_STORAGE_BUFFER
                    | gl::UNIFORM_BUFFER
                    | gl::ATOMIC_COUNTER_BUFFER
                    | gl::TRANSFORM_FEEDBACK_BUFFER
            ) {
                s.set_error(gl::INVALID_ENUM);
                return;
            }
            if buffer != 0 && !s.buffers.contains_key(&buffer) {
                s.set_error(gl::INVALID_OPERATION);
                return;
            }
            s.indexed_bindings.insert((target, index), buffer);
            s.buffer_bindings.insert(target, buffer);
        })
    }

    fn buffer_data(&self, target: u32, data: &[u8], _usage: u32) {
        self.with(|s| match s.bound_buffer(target).and_then(|id| s.buffers.get_mut(&id)) {
            Some(buffer) => buffer.data = data.to_vec(),
            None => s.set_error(gl::INVALID_OPERATION),
        })
    }

    fn buffer_sub_data(&self, target: u32, offset: usize, data: &[u8]) {
        self.with(|s| {
            let Some(buffer) = s.bound_buffer(target).and_then(|id| s.buffers.get_mut(&id)) else {
                s.set_error(gl::INVALID_OPERATION);
                return;
            };
            match buffer.data.get_mut(offset..offset.saturating_add(data.len())) {
                Some(dst) => dst.copy_from_slice(data),
                None => s.set_error(gl::INVALID_VALUE),
            }
        })
    }

    fn get_buffer_sub_data(&self, target: u32, offset: usize, out: &mut [u8]) {
        self.with(|s| {
            let Some(buffer) = s.bound_buffer(target).and_then(|id| s.buffers.get(&id)) else {
                s.set_error(gl::INVALID_OPERATION);
                return;
            };
            match buffer.data.get(offset..offset.saturating_add(out.len())) {
                Some(src) => out.copy_from_slice(src),
                None => s.set_error(gl::INVALID_VALUE),
            }
        })
    }

    fn gen_texture(&self) -> u32 {
        self.with(|s| match s.alloc_name() {
            Some(name) => {
                s.textures.insert(
                    name,
                    TextureObject {
                        target: 0,
                        storage: None,
                    },
                );
                name
            }
            None => u32::MAX,
        })
    }

    fn delete_texture(&self, texture: u32) {
        self.with(|s| {
            let existed = s.textures.remove(&texture).is_some();
            if existed {
                s.texture_units.retain(|_, id| *id != texture);
                s.image_units.retain(|_, unit| unit.texture != texture);
                for fbo in s.framebuffers.values_mut() {
                    if fbo.color0.is_some_and(|a| a.texture == texture) {
                        fbo.color0 = None;
                    }
                }
            }
            s.retire(texture, existed);
        })
    }

    fn active_texture(&self, unit: u32) {
        self.with(|s| match unit.checked_sub(gl::TEXTURE0) {
            Some(index) if index < 32 => s.active_unit = index,
            _ => s.set_error(gl::INVALID_ENUM),
        })
    }

    fn bind_texture(&self, target: u32, texture: u32) {
        self.with(|s| {
            if !matches!(
                target,
                gl::TEXTURE_1D | gl::TEXTURE_2D | gl::TEXTURE_3D | gl::TEXTURE_CUBE_MAP | gl::TEXTURE_2D_MULTISAMPLE
            ) {
                s.set_error(gl::INVALID_ENUM);
                return;
            }
            if texture != 0 {
                let Some(object) = s.textures.get_mut(&texture) else {
                    s.set_error(gl::INVALID_OPERATION);
                    return;
                };
                if object.target == 0 {
                    object.target = target;
                } else if object.target != target {
                    s.set_error(gl::INVALID_OPERATION);
                    return;
                }
            }
            let unit = s.active_unit;
            s.texture_units.insert((unit, target), texture);
        })
    }

    fn tex_parameter_i32(&self, target: u32, _pname: u32, _value: i32) {
        self.with(|s| {
            if s.bound_texture(target).is_none() {
                s.set_error(gl::INVALID_OPERATION);
            }
        })
    }

    fn tex_storage_2d(&self, target: u32, levels: u32, internal_format: u32, width: u32, height: u32) {
        self.with(|s| {
            if target == gl::TEXTURE_2D_MULTISAMPLE {
                s.set_error(gl::INVALID_ENUM);
                return;
            }
            let Some(layout) = TexelLayout::for_internal_format(internal_format) else {
                s.set_error(gl::INVALID_ENUM);
                return;
            };
            if width == 0 || height == 0 || levels == 0 {
                s.set_error(gl::INVALID_VALUE);
                return;
            }
            let max_levels = 32 - width.max(height).leading_zeros();
            if levels > max_levels {
                s.set_error(gl::INVALID_OPERATION);
                return;
            }
            let levels = (0..levels)
                .map(|l| {
                    let (w, h) = ((width >> l).max(1), (height >> l).max(1));
                    Level {
                        width: w,
                        height: h,
                        data: vec![0; (w * h) as usize * layout.bytes_per_texel()],
                    }
                })
                .collect();
            allocate_storage(s, target, TexStorage { layout, samples: 1, levels });
        })
    }

    fn tex_storage_2d_multisample(
        &self,
        target: u32,
        samples: u32,
        internal_format: u32,
        width: u32,
        height: u32,
        _fixed_sample_locations: bool,
    ) {
        self.with(|s| {
            if target != gl::TEXTURE_2D_MULTISAMPLE {
                s.set_error(gl::INVALID_ENUM);
                return;
            }
            let Some(layout) = TexelLayout::for_internal_format(internal_format) else {
                s.set_error(gl::INVALID_ENUM);
                return;
            };
            let limit = if layout.is_integer() {
                s.config.max_integer_samples
            } else {
                s.config.max_color_texture_samples
            };
            if samples == 0 || i64::from(samples) > i64::from(limit) {
                s.set_error(gl::INVALID_OPERATION);
                return;
            }
            if width == 0 || height == 0 {
                s.set_error(gl::INVALID_VALUE);
                return;
            }
            let level = Level {
                width,
                height,
                data: vec![0; (width * height * samples) as usize * layout.bytes_per_texel()],
            };
            allocate_storage(
                s,
                target,
                TexStorage {
                    layout,
                    samples,
                    levels: vec![level],
                },
            );
        })
    }

    fn tex_sub_image_2d(
        &self,
        target: u32,
        level: u32,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        format: u32,
        ty: u32,
        pixels: &[u8],
    ) {
        self.with(|s| {
            if target == gl::TEXTURE_2D_MULTISAMPLE {
                s.set_error(gl::INVALID_ENUM);
                return;
            }
            let Some(storage) = s
                .bound_texture(target)
                .and_then(|id| s.textures.get_mut(&id))
                .and_then(|t| t.storage.as_mut())
            else {
                s.set_error(gl::INVALID_OPERATION);
                return;
            };
            if (format, ty) != (storage.layout.transfer_format, storage.layout.transfer_type) {
                s.set_error(gl::INVALID_OPERATION);
                return;
            }
            let bpt = storage.layout.bytes_per_texel();
            let Some(dst) = storage.levels.get_mut(level as usize) else {
                s.set_error(gl::INVALID_VALUE);
                return;
            };
            let row = width as usize * bpt;
            if x + width > dst.width || y + height > dst.height || pixels.len() < row * height as usize {
                s.set_error(gl::INVALID_VALUE);
                return;
            }
            for r in 0..height as usize {
                let at = ((y as usize + r) * dst.width as usize + x as usize) * bpt;
                dst.data[at..at + row].copy_from_slice(&pixels[r * row..(r + 1) * row]);
            }
        })
    }

    fn get_tex_image(&self, target: u32, level: u32, format: u32, ty: u32, out: &mut [u8]) {
        self.with(|s| {
            if target == gl::TEXTURE_2D_MULTISAMPLE {
                s.set_error(gl::INVALID_ENUM);
                return;
            }
            let Some(storage) = s
                .bound_texture(target)
                .and_then(|id| s.textures.get(&id))
                .and_then(|t| t.storage.as_ref())
            else {
                s.set_error(gl::INVALID_OPERATION);
                return;
            };
            if (format, ty) != (storage.layout.transfer_format, storage.layout.transfer_type) {
                s.set_error(gl::INVALID_OPERATION);
                return;
            }
            let Some(src) = storage.levels.get(level as usize) else {
                s.set_error(gl::INVALID_VALUE);
                return;
            };
            match out.get_mut(..src.data.len()) {
                Some(dst) => dst.copy_from_slice(&src.data),
                None => s.set_error(gl::INVALID_OPERATION),
            }
        })
    }

    fn bind_image_texture(
        &self,
        unit: u32,
        texture: u32,
        level: u32,
        _layered: bool,
        _layer: u32,
        _access: u32,
        format: u32,
    ) {
        self.with(|s| {
            if unit >= MAX_IMAGE_UNITS {
                s.set_error(gl::INVALID_VALUE);
                return;
            }
            if texture == 0 {
                s.image_units.remove(&unit);
                return;
            }
            let Some(storage) = s.textures.get(&texture).and_then(|t| t.storage.as_ref()) else {
                s.set_error(gl::INVALID_VALUE);
                return;
            };
            if level as usize >= storage.levels.len() || TexelLayout::for_internal_format(format).is_none() {
                s.set_error(gl::INVALID_VALUE);
                return;
            }
            s.image_units.insert(unit, ImageUnit { texture, level });
        })
    }

    fn gen_framebuffer(&self) -> u32 {
        self.with(|s| match s.alloc_name() {
            Some(name) => {
                s.framebuffers.insert(name, FramebufferObject::default());
                name
            }
            None => u32::MAX,
        })
    }

    fn delete_framebuffer(&self, framebuffer: u32) {
        self.with(|s| {
            let existed = s.framebuffers.remove(&framebuffer).is_some();
            if existed {
                if s.draw_framebuffer == framebuffer {
                    s.draw_framebuffer = 0;
                }
                if s.read_framebuffer == framebuffer {
                    s.read_framebuffer = 0;
                }
            }
            s.retire(framebuffer, existed);
        })
    }

    fn bind_framebuffer(&self, target: u32, framebuffer: u32) {
        self.with(|s| {
            if framebuffer != 0 && !s.framebuffers.contains_key(&framebuffer) {
                s.set_error(gl::INVALID_OPERATION);
                return;
            }
            match target {
                gl::FRAMEBUFFER => {
                    s.draw_framebuffer = framebuffer;
                    s.read_framebuffer = framebuffer;
                }
                gl::DRAW_FRAMEBUFFER => s.draw_framebuffer = framebuffer,
                gl::READ_FRAMEBUFFER => s.read_framebuffer = framebuffer,
                _ => s.set_error(gl::INVALID_ENUM),
            }
        })
    }

    fn framebuffer_texture(&self, target: u32, attachment: u32, texture: u32, level: u32) {
        self.with(|s| {
            let Some(bound) = s.framebuffer_binding(target) else {
                s.set_error(gl::INVALID_ENUM);
                return;
            };
            if attachment != gl::COLOR_ATTACHMENT0 {
                s.set_error(gl::INVALID_ENUM);
                return;
            }
            if texture != 0 && !s.textures.contains_key(&texture) {
                s.set_error(gl::INVALID_VALUE);
                return;
            }
            let Some(fbo) = s.framebuffers.get_mut(&bound) else {
                s.set_error(gl::INVALID_OPERATION);
                return;
            };
            fbo.color0 = (texture != 0).then_some(Attachment { texture, level });
        })
    }

    fn check_framebuffer_status(&self, target: u32) -> u32 {
        self.with(|s| match s.framebuffer_binding(target) {
            Some(0) => gl::FRAMEBUFFER_UNSUPPORTED,
            Some(fbo) => s.framebuffer_status(fbo),
            None => {
                s.set_error(gl::INVALID_ENUM);
                0
            }
        })
    }

    fn viewport(&self, x: i32, y: i32, width: u32, height: u32) {
        self.with(|s| s.viewport = (x, y, width, height))
    }

    fn create_shader(&self, stage: u32) -> u32 {
        self.with(|s| {
            if !matches!(
                stage,
                gl::COMPUTE_SHADER
                    | gl::FRAGMENT_SHADER
                    | gl::GEOMETRY_SHADER
                    | gl::TESS_CONTROL_SHADER
                    | gl::TESS_EVALUATION_SHADER
                    | gl::VERTEX_SHADER
            ) {
                s.set_error(gl::INVALID_ENUM);
                return 0;
            }
            match s.alloc_name() {
                Some(name) => {
                    s.shaders.insert(
                        name,
                        ShaderObject {
                            stage,
                            source: String::new(),
                            kernel: None,
                            log: String::new(),
                        },
                    );
                    name
                }
                None => 0,
            }
        })
    }

    fn delete_shader(&self, shader: u32) {
        self.with(|s| {
            let existed = s.shaders.remove(&shader).is_some();
            s.retire(shader, existed);
        })
    }

    fn shader_source(&self, shader: u32, source: &str) {
        self.with(|s| match s.shaders.get_mut(&shader) {
            Some(object) => object.source = source.to_string(),
            None => s.set_error(gl::INVALID_VALUE),
        })
    }

    fn compile_shader(&self, shader: u32) {
        self.with(|s| {
            let Some(object) = s.shaders.get_mut(&shader) else {
                s.set_error(gl::INVALID_VALUE);
                return;
            };
            match kernel::compile(object.stage, &object.source) {
                Ok(kernel) => {
                    object.kernel = Some(kernel);
                    object.log.clear();
                }
                Err(log) => {
                    object.kernel = None;
                    object.log = log;
                }
            }
        })
    }

    fn shader_compile_status(&self, shader: u32) -> bool {
        self.with(|s| match s.shaders.get(&shader) {
            Some(object) => object.kernel.is_some(),
            None => {
                s.set_error(gl::INVALID_VALUE);
                false
            }
        })
    }

    fn shader_info_log(&self, shader: u32) -> String {
        self.with(|s| match s.shaders.get(&shader) {
            Some(object) => object.log.clone(),
            None => {
                s.set_error(gl::INVALID_VALUE);
                String::new()
            }
        })
    }

    fn create_program(&self) -> u32 {
        self.with(|s| match s.alloc_name() {
            Some(name) => {
                s.programs.insert(name, ProgramObject::default());
                name
            }
            None => 0,
        })
    }

    fn delete_program(&self, program: u32) {
        self.with(|s| {
            let existed = s.programs.remove(&program).is_some();
            if existed && s.current_program == program {
                s.current_program = 0;
            }
            s.retire(program, existed);
        })
    }

    fn attach_shader(&self, program: u32, shader: u32) {
        self.with(|s| {
            if !s.shaders.contains_key(&shader) {
                s.set_error(gl::INVALID_VALUE);
                return;
            }
            match s.programs.get_mut(&program) {
                Some(object) if object.attached.contains(&shader) => s.set_error(gl::INVALID_OPERATION),
                Some(object) => object.attached.push(shader),
                None => s.set_error(gl::INVALID_VALUE),
            }
        })
    }

    fn link_program(&self, program: u32) {
        self.with(|s| {
            let Some(object) = s.programs.get(&program) else {
                s.set_error(gl::INVALID_VALUE);
                return;
            };
            let stages: Option<Vec<StageKernel>> = object
                .attached
                .iter()
                .map(|id| s.shaders.get(id).and_then(|shader| shader.kernel))
                .collect();
            let result = match stages {
                Some(stages) => kernel::link(&stages),
                None => Err("error: an attached shader is not compiled".to_string()),
            };
            if let Some(object) = s.programs.get_mut(&program) {
                match result {
                    Ok(pipeline) => {
                        object.pipeline = Some(pipeline);
                        object.log.clear();
                    }
                    Err(log) => {
                        object.pipeline = None;
                        object.log = log;
                    }
                }
            }
        })
    }

    fn program_link_status(&self, program: u32) -> bool {
        self.with(|s| match s.programs.get(&program) {
            Some(object) => object.pipeline.is_some(),
            None => {
                s.set_error(gl::INVALID_VALUE);
                false
            }
        })
    }

    fn program_info_log(&self, program: u32) -> String {
        self.with(|s| match s.programs.get(&program) {
            Some(object) => object.log.clone(),
            None => {
                s.set_error(gl::INVALID_VALUE);
                String::new()
            }
        })
    }

    fn use_program(&self, program: u32) {
        self.with(|s| {
            if program != 0 && s.programs.get(&program).and_then(|p| p.pipeline).is_none() {
                s.set_error(gl::INVALID_OPERATION);
                return;
            }
            s.current_program = program;
        })
    }

    fn uniform_1_i32(&self, location: i32, value: i32) {
        self.with(|s| {
            let current = s.current_program;
            match s.programs.get_mut(&current) {
                Some(object) => {
                    object.uniforms.insert(location, value);
                }
                None => s.set_error(gl::INVALID_OPERATION),
            }
        })
    }

    fn gen_vertex_array(&self) -> u32 {
        self.with(|s| match s.alloc_name() {
            Some(name) => {
                s.vertex_arrays.insert(name, VertexArrayObject::default());
                name
            }
            None => u32::MAX,
        })
    }

    fn delete_vertex_array(&self, vertex_array: u32) {
        self.with(|s| {
            let existed = s.vertex_arrays.remove(&vertex_array).is_some();
            if existed && s.current_vertex_array == vertex_array {
                s.current_vertex_array = 0;
            }
            s.retire(vertex_array, existed);
        })
    }

    fn bind_vertex_array(&self, vertex_array: u32) {
        self.with(|s| {
            if vertex_array != 0 && !s.vertex_arrays.contains_key(&vertex_array) {
                s.set_error(gl::INVALID_OPERATION);
                return;
            }
            s.current_vertex_array = vertex_array;
        })
    }

    fn bind_vertex_buffer(&self, binding_index: u32, buffer: u32, offset: usize, stride: u32) {
        self.with(|s| {
            if buffer != 0 && !s.buffers.contains_key(&buffer) {
                s.set_error(gl::INVALID_OPERATION);
                return;
            }
            let current = s.current_vertex_array;
            match s
                .vertex_arrays
                .get_mut(&current)
                .and_then(|vao| vao.bindings.get_mut(binding_index as usize))
            {
                Some(binding) => {
                    *binding = VertexBinding {
                        buffer,
                        offset,
                        stride: stride as usize,
                    }
                }
                None => s.set_error(gl::INVALID_OPERATION),
            }
        })
    }

    fn vertex_attrib_pointer_f32(
        &self,
        index: u32,
        size: u32,
        ty: u32,
        _normalized: bool,
        stride: u32,
        offset: usize,
    ) {
        self.with(|s| {
            if ty != gl::FLOAT {
                s.set_error(gl::INVALID_ENUM);
                return;
            }
            if !(1..=4).contains(&size) || index as usize >= MAX_VERTEX_ATTRIBS {
                s.set_error(gl::INVALID_VALUE);
                return;
            }
            let array_buffer = s.bound_buffer(gl::ARRAY_BUFFER).unwrap_or(0);
            let current = s.current_vertex_array;
            let Some(vao) = s.vertex_arrays.get_mut(&current) else {
                s.set_error(gl::INVALID_OPERATION);
                return;
            };
            let stride = if stride == 0 { size as usize * 4 } else { stride as usize };
            vao.bindings[index as usize] = VertexBinding {
                buffer: array_buffer,
                offset,
                stride,
            };
            let attrib = &mut vao.attribs[index as usize];
            attrib.size = size;
            attrib.relative_offset = 0;
        })
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        self.with(|s| {
            let current = s.current_vertex_array;
            match s
                .vertex_arrays
                .get_mut(&current)
                .and_then(|vao| vao.attribs.get_mut(index as usize))
            {
                Some(attrib) => attrib.enabled = true,
                None => s.set_error(gl::INVALID_OPERATION),
            }
        })
    }

    fn draw_arrays(&self, mode: u32, first: u32, count: u32) {
        self.with(|s| {
            if let Err(code) = exec::draw_arrays(s, mode, first, count) {
                s.set_error(code);
            }
        })
    }

    fn draw_elements(&self, mode: u32, count: u32, ty: u32, offset: usize) {
        self.with(|s| {
            if let Err(code) = exec::draw_elements(s, mode, count, ty, offset) {
                s.set_error(code);
            }
        })
    }

    fn dispatch_compute(&self, x: u32, y: u32, z: u32) {
        self.with(|s| {
            if let Err(code) = exec::dispatch_compute(s, x, y, z) {
                s.set_error(code);
            }
        })
    }

    fn memory_barrier(&self, _barriers: BarrierBits) {
        // Every command executes to completion before returning.
    }
}

fn allocate_storage(s: &mut State, target: u32, storage: TexStorage) {
    let Some(texture) = s.bound_texture(target).and_then(|id| s.textures.get_mut(&id)) else {
        s.set_error(gl::INVALID_OPERATION);
        return;
    };
    if texture.storage.is_some() {
        s.set_error(gl::INVALID_OPERATION);
        return;
    }
    texture.storage = Some(storage);
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn error_flag_is_sticky_until_read() {
        let gl = SoftGl::default();
        gl.bind_buffer(gl::ARRAY_BUFFER, 42);
        gl.bind_texture(0x1234, 0);
        assert_eq!(gl.get_error(), gl::INVALID_OPERATION);
        assert_eq!(gl.get_error(), gl::NO_ERROR);
    }

    #[test]
    fn buffer_upload_and_readback() {
        let gl = SoftGl::default();
        let id = gl.gen_buffer();
        gl.bind_buffer(gl::COPY_READ_BUFFER, id);
        gl.buffer_data(gl::COPY_READ_BUFFER, &[1, 2, 3, 4], gl::STATIC_DRAW);
        gl.buffer_sub_data(gl::COPY_READ_BUFFER, 2, &[9]);
        let mut out = [0u8; 3];
        gl.get_buffer_sub_data(gl::COPY_READ_BUFFER, 1, &mut out);
        assert_eq!(out, [2, 9, 4]);
        assert_eq!(gl.get_error(), gl::NO_ERROR);

        gl.get_buffer_sub_data(gl::COPY_READ_BUFFER, 3, &mut out);
        assert_eq!(gl.get_error(), gl::INVALID_VALUE);
    }

    #[test]
    fn deleting_twice_is_counted() {
        let gl = SoftGl::default();
        let id = gl.gen_buffer();
        gl.delete_buffer(id);
        assert_eq!(gl.double_deletes(), 0);
        gl.delete_buffer(id);
        assert_eq!(gl.double_deletes(), 1);
        assert_eq!(gl.live_objects().total(), 0);
    }

    #[test]
    fn texture_storage_is_immutable() {
        let gl = SoftGl::default();
        let id = gl.gen_texture();
        gl.bind_texture(gl::TEXTURE_2D, id);
        gl.tex_storage_2d(gl::TEXTURE_2D, 2, gl::R32UI, 32, 32);
        assert_eq!(gl.get_error(), gl::NO_ERROR);
        gl.tex_storage_2d(gl::TEXTURE_2D, 1, gl::R32UI, 32, 32);
        assert_eq!(gl.get_error(), gl::INVALID_OPERATION);
    }

    #[test]
    fn snorm_attachment_is_unsupported() {
        let gl = SoftGl::default();
        let texture = gl.gen_texture();
        gl.bind_texture(gl::TEXTURE_2D, texture);
        gl.tex_storage_2d(gl::TEXTURE_2D, 1, gl::RG8_SNORM, 16, 16);
        let fbo = gl.gen_framebuffer();
        gl.bind_framebuffer(gl::DRAW_FRAMEBUFFER, fbo);
        gl.framebuffer_texture(gl::DRAW_FRAMEBUFFER, gl::COLOR_ATTACHMENT0, texture, 0);
        assert_eq!(gl.check_framebuffer_status(gl::DRAW_FRAMEBUFFER), gl::FRAMEBUFFER_UNSUPPORTED);
    }

    #[test]
    fn failing_object_creation_returns_sentinels() {
        let gl = SoftGl::new(SoftConfig {
            fail_object_creation: true,
            ..SoftConfig::default()
        });
        assert_eq!(gl.gen_buffer(), u32::MAX);
        assert_eq!(gl.create_program(), 0);
        assert_eq!(gl.create_shader(gl::COMPUTE_SHADER), 0);
    }
}
