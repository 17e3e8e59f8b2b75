use rba_gl::enums as gl;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Channel {
    Unorm8,
    Snorm8,
    Float32,
    Uint8,
    Uint32,
}

impl Channel {
    fn size(self) -> usize {
        match self {
            Self::Unorm8 | Self::Snorm8 | Self::Uint8 => 1,
            Self::Float32 | Self::Uint32 => 4,
        }
    }
}

/// Value produced by a fetch, load or fragment output, before it is packed into a texel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Texel {
    Float([f32; 4]),
    Uint([u32; 4]),
}

/// How texels of one internal format are laid out in memory.
///
/// Texture storage uses the same packing as the matching client transfer format, so uploads and
/// read-backs are plain row copies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TexelLayout {
    pub channel: Channel,
    pub channels: usize,
    pub transfer_format: u32,
    pub transfer_type: u32,
    pub color_renderable: bool,
}

impl TexelLayout {
    pub fn for_internal_format(internal_format: u32) -> Option<Self> {
        let (channel, channels, transfer_format, transfer_type, color_renderable) = match internal_format {
            gl::R8 => (Channel::Unorm8, 1, gl::RED, gl::UNSIGNED_BYTE, true),
            gl::RG8_SNORM => (Channel::Snorm8, 2, gl::RG, gl::BYTE, false),
            gl::RGBA32F => (Channel::Float32, 4, gl::RGBA, gl::FLOAT, true),
            gl::R32UI => (Channel::Uint32, 1, gl::RED_INTEGER, gl::UNSIGNED_INT, true),
            gl::R8UI => (Channel::Uint8, 1, gl::RED_INTEGER, gl::UNSIGNED_BYTE, true),
            _ => return None,
        };
        Some(Self {
            channel,
            channels,
            transfer_format,
            transfer_type,
            color_renderable,
        })
    }

    pub fn bytes_per_texel(&self) -> usize {
        self.channel.size() * self.channels
    }

    pub fn is_integer(&self) -> bool {
        matches!(self.channel, Channel::Uint8 | Channel::Uint32)
    }

    pub fn zero(&self) -> Texel {
        if self.is_integer() {
            Texel::Uint([0; 4])
        } else {
            Texel::Float([0.0; 4])
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Texel {
        let size = self.channel.size();
        if self.is_integer() {
            let mut out = [0, 0, 0, 1];
            for (c, slot) in out.iter_mut().enumerate().take(self.channels) {
                let raw = &bytes[c * size..(c + 1) * size];
                *slot = match self.channel {
                    Channel::Uint8 => u32::from(raw[0]),
                    _ => bytemuck::pod_read_unaligned::<u32>(raw),
                };
            }
            Texel::Uint(out)
        } else {
            let mut out = [0.0, 0.0, 0.0, 1.0];
            for (c, slot) in out.iter_mut().enumerate().take(self.channels) {
                let raw = &bytes[c * size..(c + 1) * size];
                *slot = match self.channel {
                    Channel::Unorm8 => f32::from(raw[0]) / 255.0,
                    Channel::Snorm8 => (f32::from(raw[0] as i8) / 127.0).max(-1.0),
                    _ => bytemuck::pod_read_unaligned::<f32>(raw),
                };
            }
            Texel::Float(out)
        }
    }

    pub fn encode(&self, texel: Texel, out: &mut [u8]) {
        let size = self.channel.size();
        for c in 0..self.channels {
            let dst = &mut out[c * size..(c + 1) * size];
            match self.channel {
                Channel::Unorm8 => dst[0] = (float_channel(texel, c).clamp(0.0, 1.0) * 255.0).round() as u8,
                Channel::Snorm8 => {
                    dst[0] = ((float_channel(texel, c).clamp(-1.0, 1.0) * 127.0).round() as i8) as u8
                }
                Channel::Float32 => dst.copy_from_slice(bytemuck::bytes_of(&float_channel(texel, c))),
                Channel::Uint8 => dst[0] = uint_channel(texel, c).min(u32::from(u8::MAX)) as u8,
                Channel::Uint32 => dst.copy_from_slice(bytemuck::bytes_of(&uint_channel(texel, c))),
            }
        }
    }
}

fn float_channel(texel: Texel, c: usize) -> f32 {
    match texel {
        Texel::Float(v) => v[c],
        Texel::Uint(v) => v[c] as f32,
    }
}

fn uint_channel(texel: Texel, c: usize) -> u32 {
    match texel {
        Texel::Float(v) => v[c].max(0.0) as u32,
        Texel::Uint(v) => v[c],
    }
}
