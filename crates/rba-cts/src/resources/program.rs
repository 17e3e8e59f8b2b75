use rba_gl::{enums as gl, Gl};

use super::warn_on_error;
use crate::check::{expect_no_error, expect_valid_id};
use crate::CtsError;

/// Shader and program objects use GL's own "no object" name.
const NO_OBJECT: u32 = 0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    Compute,
    Fragment,
    Geometry,
    TessControl,
    TessEvaluation,
    Vertex,
}

impl ShaderStage {
    pub fn gl_enum(self) -> u32 {
        match self {
            Self::Compute => gl::COMPUTE_SHADER,
            Self::Fragment => gl::FRAGMENT_SHADER,
            Self::Geometry => gl::GEOMETRY_SHADER,
            Self::TessControl => gl::TESS_CONTROL_SHADER,
            Self::TessEvaluation => gl::TESS_EVALUATION_SHADER,
            Self::Vertex => gl::VERTEX_SHADER,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Compute => "compute",
            Self::Fragment => "fragment",
            Self::Geometry => "geometry",
            Self::TessControl => "tessellation control",
            Self::TessEvaluation => "tessellation evaluation",
            Self::Vertex => "vertex",
        }
    }
}

pub struct Shader<'gl> {
    gl: &'gl dyn Gl,
    id: u32,
}

impl<'gl> Shader<'gl> {
    pub fn new(gl: &'gl dyn Gl) -> Self {
        Self { gl, id: NO_OBJECT }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Compiles `source` for `stage`. An empty source leaves the wrapper empty.
    pub fn init(&mut self, stage: ShaderStage, source: &str) -> Result<(), CtsError> {
        self.release();
        if source.is_empty() {
            return Ok(());
        }

        let id = self.gl.create_shader(stage.gl_enum());
        expect_no_error(self.gl, "CreateShader")?;
        self.id = expect_valid_id(id, NO_OBJECT, "CreateShader")?;

        self.gl.shader_source(self.id, source);
        expect_no_error(self.gl, "ShaderSource")?;
        self.gl.compile_shader(self.id);
        expect_no_error(self.gl, "CompileShader")?;

        let compiled = self.gl.shader_compile_status(self.id);
        expect_no_error(self.gl, "GetShaderiv")?;
        if !compiled {
            let log = self.gl.shader_info_log(self.id);
            tracing::debug!(stage = stage.name(), %source, "shader source");
            return Err(CtsError::Compile {
                stage: stage.name(),
                log,
            });
        }
        Ok(())
    }

    pub fn release(&mut self) {
        if self.id == NO_OBJECT {
            return;
        }
        self.gl.delete_shader(self.id);
        self.id = NO_OBJECT;
        warn_on_error(self.gl, "DeleteShader");
    }
}

impl Drop for Shader<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Stage sources of one program; an empty string means the stage is absent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProgramSources {
    pub compute: String,
    pub fragment: String,
    pub geometry: String,
    pub tess_control: String,
    pub tess_evaluation: String,
    pub vertex: String,
}

impl ProgramSources {
    pub fn compute(source: String) -> Self {
        Self {
            compute: source,
            ..Self::default()
        }
    }

    fn stages(&self) -> [(ShaderStage, &str); 6] {
        [
            (ShaderStage::Compute, &self.compute),
            (ShaderStage::Fragment, &self.fragment),
            (ShaderStage::Geometry, &self.geometry),
            (ShaderStage::TessControl, &self.tess_control),
            (ShaderStage::TessEvaluation, &self.tess_evaluation),
            (ShaderStage::Vertex, &self.vertex),
        ]
    }
}

/// Linked program together with the shaders attached to it.
pub struct Program<'gl> {
    gl: &'gl dyn Gl,
    id: u32,
    shaders: Vec<Shader<'gl>>,
}

impl<'gl> Program<'gl> {
    pub fn new(gl: &'gl dyn Gl) -> Self {
        Self {
            gl,
            id: NO_OBJECT,
            shaders: Vec::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn init(&mut self, sources: &ProgramSources) -> Result<(), CtsError> {
        self.release();

        for (stage, source) in sources.stages() {
            if source.is_empty() {
                continue;
            }
            let mut shader = Shader::new(self.gl);
            shader.init(stage, source)?;
            self.shaders.push(shader);
        }

        let id = self.gl.create_program();
        expect_no_error(self.gl, "CreateProgram")?;
        self.id = expect_valid_id(id, NO_OBJECT, "CreateProgram")?;

        for shader in &self.shaders {
            self.gl.attach_shader(self.id, shader.id());
            expect_no_error(self.gl, "AttachShader")?;
        }

        self.gl.link_program(self.id);
        expect_no_error(self.gl, "LinkProgram")?;
        let linked = self.gl.program_link_status(self.id);
        expect_no_error(self.gl, "GetProgramiv")?;
        if !linked {
            return Err(CtsError::Link(self.gl.program_info_log(self.id)));
        }
        Ok(())
    }

    pub fn use_program(&self) -> Result<(), CtsError> {
        self.gl.use_program(self.id);
        expect_no_error(self.gl, "UseProgram")
    }

    /// Sets an `int`/sampler/image uniform of the current program.
    pub fn set_uniform_i32(&self, location: i32, value: i32) -> Result<(), CtsError> {
        self.gl.uniform_1_i32(location, value);
        expect_no_error(self.gl, "Uniform1i")
    }

    pub fn release(&mut self) {
        if self.id != NO_OBJECT {
            self.gl.delete_program(self.id);
            self.id = NO_OBJECT;
            warn_on_error(self.gl, "DeleteProgram");
        }
        self.shaders.clear();
    }
}

impl Drop for Program<'_> {
    fn drop(&mut self) {
        self.release();
    }
}
