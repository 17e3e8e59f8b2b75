//! Texture formats exercised by the texel fetch and image load/store tests.

use rba_gl::enums as gl;

/// Width and height of every image the tests compare.
pub const IMAGE_SIZE: u32 = 16;

/// Texels in one compared image.
pub const IMAGE_TEXELS: usize = (IMAGE_SIZE * IMAGE_SIZE) as usize;

/// Absolute tolerance for floating point channels.
pub const FLOAT_TOLERANCE: f32 = 1.0 / 1024.0;

/// Samples per texel of the multisample case.
pub const MULTISAMPLE_SAMPLES: u32 = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TexelFormat {
    R8,
    Rg8Snorm,
    Rgba32f,
    /// Level 1 of a two level `GL_R32UI` texture.
    R32uiMipmap,
    /// Four sample `GL_R32UI` texture.
    R32uiMultisample,
}

impl TexelFormat {
    pub const ALL: [Self; 5] = [
        Self::R8,
        Self::Rg8Snorm,
        Self::Rgba32f,
        Self::R32uiMipmap,
        Self::R32uiMultisample,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::R8 => "GL_R8",
            Self::Rg8Snorm => "GL_RG8_SNORM",
            Self::Rgba32f => "GL_RGBA32F",
            Self::R32uiMipmap => "mipmap of GL_R32UI",
            Self::R32uiMultisample => "multisampled GL_R32UI",
        }
    }

    pub fn internal_format(self) -> u32 {
        match self {
            Self::R8 => gl::R8,
            Self::Rg8Snorm => gl::RG8_SNORM,
            Self::Rgba32f => gl::RGBA32F,
            Self::R32uiMipmap | Self::R32uiMultisample => gl::R32UI,
        }
    }

    /// `(format, type)` pair for uploads and read-backs.
    pub fn transfer(self) -> (u32, u32) {
        match self {
            Self::R8 => (gl::RED, gl::UNSIGNED_BYTE),
            Self::Rg8Snorm => (gl::RG, gl::BYTE),
            Self::Rgba32f => (gl::RGBA, gl::FLOAT),
            Self::R32uiMipmap | Self::R32uiMultisample => (gl::RED_INTEGER, gl::UNSIGNED_INT),
        }
    }

    pub fn bytes_per_texel(self) -> usize {
        match self {
            Self::R8 => 1,
            Self::Rg8Snorm => 2,
            Self::Rgba32f => 16,
            Self::R32uiMipmap | Self::R32uiMultisample => 4,
        }
    }

    pub fn is_multisample(self) -> bool {
        self == Self::R32uiMultisample
    }

    pub fn texture_target(self) -> u32 {
        if self.is_multisample() {
            gl::TEXTURE_2D_MULTISAMPLE
        } else {
            gl::TEXTURE_2D
        }
    }

    /// Mip levels allocated; level 0 of the mipmap case is twice [`IMAGE_SIZE`].
    pub fn levels(self) -> u32 {
        if self == Self::R32uiMipmap {
            2
        } else {
            1
        }
    }

    pub fn base_size(self) -> u32 {
        IMAGE_SIZE << (self.levels() - 1)
    }

    /// Level holding the compared [`IMAGE_SIZE`] image.
    pub fn data_level(self) -> u32 {
        self.levels() - 1
    }

    pub fn glsl_sampler(self) -> &'static str {
        match self {
            Self::R8 | Self::Rg8Snorm | Self::Rgba32f => "sampler2D",
            Self::R32uiMipmap => "usampler2D",
            Self::R32uiMultisample => "usampler2DMS",
        }
    }

    pub fn glsl_output(self) -> &'static str {
        match self {
            Self::R8 | Self::Rg8Snorm | Self::Rgba32f => "vec4",
            Self::R32uiMipmap | Self::R32uiMultisample => "uvec4",
        }
    }

    pub fn glsl_image(self) -> &'static str {
        match self {
            Self::R8 | Self::Rg8Snorm | Self::Rgba32f => "image2D",
            Self::R32uiMipmap => "uimage2D",
            Self::R32uiMultisample => "uimage2DMS",
        }
    }

    pub fn glsl_image_format(self) -> &'static str {
        match self {
            Self::R8 => "r8",
            Self::Rg8Snorm => "rg8_snorm",
            Self::Rgba32f => "rgba32f",
            Self::R32uiMipmap | Self::R32uiMultisample => "r32ui",
        }
    }

    /// Source image contents, texel `i` in row-major order.
    ///
    /// The multisample source is written by a compute kernel instead (`index + sample`); its
    /// sample 0 matches this pattern.
    pub fn pattern(self) -> Vec<u8> {
        match self {
            Self::R8 => (0..IMAGE_TEXELS).map(|i| i as u8).collect(),
            Self::Rg8Snorm => (0..IMAGE_TEXELS)
                .flat_map(|i| [(i % 16) as i8 - 8, (i / 16) as i8 - 8])
                .map(|v| v as u8)
                .collect(),
            Self::Rgba32f => {
                let texels: Vec<f32> = (0..IMAGE_TEXELS)
                    .flat_map(|i| [(i % 16) as f32 / 16.0, (i / 16) as f32 / 16.0, i as f32 / 256.0, 1.0])
                    .collect();
                bytemuck::cast_slice(&texels).to_vec()
            }
            Self::R32uiMipmap | Self::R32uiMultisample => {
                let texels: Vec<u32> = (0..IMAGE_TEXELS as u32).collect();
                bytemuck::cast_slice(&texels).to_vec()
            }
        }
    }

    /// Whether an observed texel matches the expected one, exactly or within
    /// [`FLOAT_TOLERANCE`] for float channels.
    pub fn texels_match(self, observed: &[u8], expected: &[u8]) -> bool {
        match self {
            Self::Rgba32f => floats(observed)
                .zip(floats(expected))
                .all(|(o, e)| (o - e).abs() <= FLOAT_TOLERANCE),
            _ => observed == expected,
        }
    }

    /// Out-of-bounds fetch result: every channel zero, alpha of a float format 0 or 1.
    pub fn is_zero_texel(self, texel: &[u8]) -> bool {
        match self {
            Self::Rgba32f => {
                let channels: Vec<f32> = floats(texel).collect();
                let near = |v: f32, target: f32| (v - target).abs() <= FLOAT_TOLERANCE;
                channels[..3].iter().all(|&c| near(c, 0.0)) && (near(channels[3], 0.0) || near(channels[3], 1.0))
            }
            _ => texel.iter().all(|&b| b == 0),
        }
    }

    /// Human readable texel value for diagnostics.
    pub fn describe(self, texel: &[u8]) -> String {
        match self {
            Self::R8 => texel[0].to_string(),
            Self::Rg8Snorm => format!("({}, {})", texel[0] as i8, texel[1] as i8),
            Self::Rgba32f => {
                let c: Vec<f32> = floats(texel).collect();
                format!("({}, {}, {}, {})", c[0], c[1], c[2], c[3])
            }
            Self::R32uiMipmap | Self::R32uiMultisample => bytemuck::pod_read_unaligned::<u32>(texel).to_string(),
        }
    }
}

fn floats(bytes: &[u8]) -> impl Iterator<Item = f32> + '_ {
    bytes.chunks_exact(4).map(bytemuck::pod_read_unaligned::<f32>)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patterns_fill_one_image() {
        for format in TexelFormat::ALL {
            assert_eq!(format.pattern().len(), IMAGE_TEXELS * format.bytes_per_texel(), "{format:?}");
        }
    }

    #[test]
    fn snorm_pattern_is_centred() {
        let pattern = TexelFormat::Rg8Snorm.pattern();
        assert_eq!(pattern[0] as i8, -8);
        assert_eq!(pattern[1] as i8, -8);
        let last = &pattern[pattern.len() - 2..];
        assert_eq!((last[0] as i8, last[1] as i8), (7, 7));
    }

    #[test]
    fn float_alpha_may_be_zero_or_one() {
        let texel = |a: f32| bytemuck::cast_slice::<f32, u8>(&[0.0, 0.0, 0.0, a]).to_vec();
        assert!(TexelFormat::Rgba32f.is_zero_texel(&texel(0.0)));
        assert!(TexelFormat::Rgba32f.is_zero_texel(&texel(1.0)));
        assert!(!TexelFormat::Rgba32f.is_zero_texel(&texel(0.5)));
    }

    #[test]
    fn mipmap_data_lives_in_level_one() {
        assert_eq!(TexelFormat::R32uiMipmap.base_size(), 32);
        assert_eq!(TexelFormat::R32uiMipmap.data_level(), 1);
        assert_eq!(TexelFormat::R8.base_size(), IMAGE_SIZE);
        assert_eq!(TexelFormat::R8.data_level(), 0);
    }
}
