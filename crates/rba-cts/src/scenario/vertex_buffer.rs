//! Indexed draws whose element indices reach past the end of the vertex buffer.

use rba_gl::{enums as gl, Gl};

use super::{invalid_runs, AccessPattern, AccessRun, Capabilities, CasePlan, Fixture, Mechanism, OffsetCategory, Validity};
use crate::check::expect_no_error;
use crate::resources::{Buffer, BufferTarget, Framebuffer, Program, Texture, VertexArray};
use crate::shaders::{self, DRAWN_MARKER};
use crate::verify::{MarkerVerifier, Observation, OutcomeVerifier};
use crate::CtsError;

const TARGET_SIZE: u32 = 8;
const TARGET_PIXELS: usize = (TARGET_SIZE * TARGET_SIZE) as usize;
const CLEAR_VALUE: u8 = 128;
const VERTEX_STRIDE: u32 = 12;

/// Centre vertex followed by the eight vertices of the viewport's outline.
#[rustfmt::skip]
const VERTICES: [f32; 27] = [
     0.0,  0.0, 0.0,
    -1.0,  0.0, 0.0,
    -1.0,  1.0, 0.0,
     0.0,  1.0, 0.0,
     1.0,  1.0, 0.0,
     1.0,  0.0, 0.0,
     1.0, -1.0, 0.0,
     0.0, -1.0, 0.0,
    -1.0, -1.0, 0.0,
];

/// Eight-triangle fan covering the whole viewport.
#[rustfmt::skip]
const VALID_ELEMENTS: [u32; 24] = [
    0, 1, 2,
    0, 2, 3,
    0, 3, 4,
    0, 4, 5,
    0, 5, 6,
    0, 6, 7,
    0, 7, 8,
    0, 8, 1,
];

/// Every triangle has a corner past the last vertex.
#[rustfmt::skip]
const INVALID_ELEMENTS: [u32; 24] = [
     9, 1, 12,
    10, 2,  3,
    11, 3,  4,
    12, 4,  5,
    13, 5,  6,
    14, 6,  7,
    15, 7,  8,
    16, 8,  1,
];

const OFFSETS: [AccessPattern; 4] = [
    AccessPattern::new(OffsetCategory::Close, 0),
    AccessPattern::new(OffsetCategory::Near, 4096),
    AccessPattern::new(OffsetCategory::Medium, 1 << 20),
    AccessPattern::new(OffsetCategory::High, 10 << 20),
];

pub(super) fn plan() -> Vec<CasePlan> {
    let mut runs = vec![AccessRun::VALID];
    runs.extend(invalid_runs(Validity::SourceInvalid, &OFFSETS));
    vec![CasePlan::new("Drawing from a vertex buffer", Mechanism::VertexBufferObjects, runs)]
}

/// Element indices for `run`.
fn elements(run: &AccessRun) -> [u32; 24] {
    match run.validity {
        Validity::Valid => VALID_ELEMENTS,
        Validity::SourceInvalid | Validity::DestinationInvalid => {
            INVALID_ELEMENTS.map(|index| index.wrapping_add(run.pattern.offset))
        }
    }
}

pub(super) struct VertexBufferFixture<'gl> {
    gl: &'gl dyn Gl,
    // Fields drop in declaration order; the program goes before the objects it draws from.
    program: Program<'gl>,
    framebuffer: Framebuffer<'gl>,
    target: Texture<'gl>,
    elements: Buffer<'gl>,
    vertices: Buffer<'gl>,
    vertex_array: VertexArray<'gl>,
    verifier: MarkerVerifier,
}

impl<'gl> VertexBufferFixture<'gl> {
    pub(super) fn new(gl: &'gl dyn Gl, caps: &Capabilities) -> Result<Self, CtsError> {
        let mut fixture = Self {
            gl,
            program: Program::new(gl),
            framebuffer: Framebuffer::new(gl),
            target: Texture::new(gl),
            elements: Buffer::new(gl),
            vertices: Buffer::new(gl),
            vertex_array: VertexArray::new(gl),
            verifier: MarkerVerifier::new(DRAWN_MARKER),
        };

        fixture.vertex_array.generate()?;
        fixture.vertex_array.bind()?;

        fixture
            .vertices
            .init_data(BufferTarget::Array, gl::STATIC_DRAW, bytemuck::cast_slice(&VERTICES))?;
        // The element binding is vertex array state, so the array must be bound first.
        fixture
            .elements
            .init_data(BufferTarget::ElementArray, gl::STATIC_DRAW, bytemuck::cast_slice(&VALID_ELEMENTS))?;

        fixture.target.generate()?;
        fixture
            .target
            .storage(gl::TEXTURE_2D, 1, gl::R8UI, TARGET_SIZE, TARGET_SIZE)?;
        fixture.target.set_nearest_filtering(gl::TEXTURE_2D)?;

        fixture.framebuffer.generate()?;
        fixture.framebuffer.bind(gl::DRAW_FRAMEBUFFER)?;
        fixture.framebuffer.attach_texture(
            gl::DRAW_FRAMEBUFFER,
            gl::COLOR_ATTACHMENT0,
            fixture.target.id(),
            0,
            TARGET_SIZE,
            TARGET_SIZE,
        )?;
        fixture.framebuffer.require_complete(gl::DRAW_FRAMEBUFFER)?;

        fixture.program.init(&shaders::vertex_buffer_program(caps.api)?)?;
        fixture.program.use_program()?;

        fixture.vertices.bind()?;
        gl.bind_vertex_buffer(0, fixture.vertices.id(), 0, VERTEX_STRIDE);
        expect_no_error(gl, "BindVertexBuffer")?;
        gl.vertex_attrib_pointer_f32(0, 3, gl::FLOAT, false, VERTEX_STRIDE, 0);
        expect_no_error(gl, "VertexAttribPointer")?;
        gl.enable_vertex_attrib_array(0);
        expect_no_error(gl, "EnableVertexAttribArray")?;

        Ok(fixture)
    }

    fn clear_target(&self) -> Result<(), CtsError> {
        self.target.sub_image(
            gl::TEXTURE_2D,
            0,
            TARGET_SIZE,
            TARGET_SIZE,
            gl::RED_INTEGER,
            gl::UNSIGNED_BYTE,
            &[CLEAR_VALUE; TARGET_PIXELS],
        )
    }
}

impl Fixture for VertexBufferFixture<'_> {
    fn execute(&mut self, run: &AccessRun) -> Result<Observation, CtsError> {
        self.elements.sub_data(0, bytemuck::cast_slice(&elements(run)))?;
        self.clear_target()?;

        self.gl
            .draw_elements(gl::TRIANGLES, VALID_ELEMENTS.len() as u32, gl::UNSIGNED_INT, 0);
        expect_no_error(self.gl, "DrawElements")?;

        let mut pixels = vec![0; TARGET_PIXELS];
        self.target
            .get_image(gl::TEXTURE_2D, 0, gl::RED_INTEGER, gl::UNSIGNED_BYTE, &mut pixels)?;
        Ok(Observation::new(pixels))
    }

    fn verifier(&self) -> &dyn OutcomeVerifier {
        &self.verifier
    }
}

#[cfg(test)]
mod tests {
    use rba_soft::{OutOfBoundsRead, Robustness, SoftGl};

    use super::*;
    use crate::verify::Verdict;

    fn observe(soft: &SoftGl, run: AccessRun) -> Observation {
        let caps = Capabilities::query(soft).unwrap();
        let mut fixture = VertexBufferFixture::new(soft, &caps).unwrap();
        fixture.execute(&run).unwrap()
    }

    fn close() -> AccessRun {
        AccessRun::invalid(Validity::SourceInvalid, OFFSETS[0])
    }

    #[test]
    fn valid_fan_covers_the_target() {
        let soft = SoftGl::default();
        let observation = observe(&soft, AccessRun::VALID);
        assert_eq!(observation.data, vec![DRAWN_MARKER; TARGET_PIXELS]);
        assert_eq!(soft.live_objects().total(), 0);
    }

    #[test]
    fn zeroed_vertices_draw_nothing() {
        let soft = SoftGl::default();
        let observation = observe(&soft, close());
        assert_eq!(observation.data, vec![CLEAR_VALUE; TARGET_PIXELS]);
    }

    #[test]
    fn wrapped_vertices_are_drawn_and_caught() {
        let soft = SoftGl::with_robustness(Robustness {
            vertex_fetch: OutOfBoundsRead::Wrap,
            ..Robustness::conformant()
        });
        let observation = observe(&soft, close());
        assert!(matches!(
            MarkerVerifier::new(DRAWN_MARKER).verify_invalid(Validity::SourceInvalid, &observation),
            Verdict::Violation(_)
        ));
    }

    #[test]
    fn offsets_shift_every_invalid_index() {
        let run = AccessRun::invalid(Validity::SourceInvalid, OFFSETS[1]);
        let shifted = elements(&run);
        assert_eq!(shifted[0], 9 + 4096);
        assert_eq!(shifted[1], 1 + 4096);
        assert_eq!(elements(&AccessRun::VALID), VALID_ELEMENTS);
    }
}
