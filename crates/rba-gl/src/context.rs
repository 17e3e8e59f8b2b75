use std::fmt;

/// Rendering API flavour and version of a context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ApiType {
    /// Desktop OpenGL, core profile.
    Core { major: u32, minor: u32 },
    /// OpenGL ES.
    Es { major: u32, minor: u32 },
}

impl ApiType {
    pub const fn core(major: u32, minor: u32) -> Self {
        Self::Core { major, minor }
    }

    pub const fn es(major: u32, minor: u32) -> Self {
        Self::Es { major, minor }
    }

    pub fn version(self) -> (u32, u32) {
        match self {
            Self::Core { major, minor } | Self::Es { major, minor } => (major, minor),
        }
    }

    pub fn is_es(self) -> bool {
        matches!(self, Self::Es { .. })
    }

    /// True for a desktop core context of at least `major.minor`.
    pub fn is_core_at_least(self, major: u32, minor: u32) -> bool {
        match self {
            Self::Core { .. } => self.version() >= (major, minor),
            Self::Es { .. } => false,
        }
    }

    /// `#version` line used for every generated program.
    ///
    /// Compute shaders, image load/store and storage blocks need GLSL 4.30, so desktop contexts
    /// older than that still get `#version 430 core`.
    pub fn glsl_version_declaration(self) -> String {
        match self {
            Self::Core { major, minor } => {
                let (major, minor) = (major, minor).max((4, 3));
                format!("#version {major}{minor}0 core")
            }
            Self::Es { major, minor } => format!("#version {major}{minor}0 es"),
        }
    }
}

impl fmt::Display for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Core { major, minor } => write!(f, "OpenGL {major}.{minor} core"),
            Self::Es { major, minor } => write!(f, "OpenGL ES {major}.{minor}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glsl_version_is_clamped_to_430_on_desktop() {
        assert_eq!(ApiType::core(4, 2).glsl_version_declaration(), "#version 430 core");
        assert_eq!(ApiType::core(4, 5).glsl_version_declaration(), "#version 450 core");
        assert_eq!(ApiType::es(3, 2).glsl_version_declaration(), "#version 320 es");
    }

    #[test]
    fn core_version_comparison() {
        assert!(ApiType::core(4, 5).is_core_at_least(4, 3));
        assert!(ApiType::core(4, 3).is_core_at_least(4, 3));
        assert!(!ApiType::core(4, 2).is_core_at_least(4, 3));
        assert!(!ApiType::es(3, 2).is_core_at_least(3, 0));
    }

    #[test]
    fn display_names_the_profile() {
        assert_eq!(ApiType::core(4, 5).to_string(), "OpenGL 4.5 core");
        assert_eq!(ApiType::es(3, 1).to_string(), "OpenGL ES 3.1");
        assert!(ApiType::es(3, 1).is_es());
        assert!(!ApiType::core(4, 5).is_es());
    }
}
