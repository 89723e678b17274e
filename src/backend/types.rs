//! Common types shared between the frame graph and backends

/// Texture format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Rgba32Float,
    Depth32Float,
    Depth24PlusStencil8,
    R32Float,
    Rg32Float,
}

impl TextureFormat {
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            TextureFormat::Depth32Float | TextureFormat::Depth24PlusStencil8
        )
    }

    pub fn has_stencil(&self) -> bool {
        matches!(self, TextureFormat::Depth24PlusStencil8)
    }
}

/// Image layout tracked per resource instance and required by accesses.
///
/// Transitions between these states are what the barrier component emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    Undefined,
    General,
    ColorAttachment,
    DepthStencilAttachment,
    ShaderReadOnly,
    TransferSrc,
    TransferDst,
    Present,
}

/// Texture usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureUsage(u32);

impl TextureUsage {
    pub const COPY_SRC: Self = Self(1 << 0);
    pub const COPY_DST: Self = Self(1 << 1);
    pub const SAMPLED: Self = Self(1 << 2);
    pub const STORAGE: Self = Self(1 << 3);
    pub const RENDER_ATTACHMENT: Self = Self(1 << 4);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for TextureUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Buffer usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferUsage(u32);

impl BufferUsage {
    pub const COPY_SRC: Self = Self(1 << 0);
    pub const COPY_DST: Self = Self(1 << 1);
    pub const INDEX: Self = Self(1 << 2);
    pub const VERTEX: Self = Self(1 << 3);
    pub const UNIFORM: Self = Self(1 << 4);
    pub const STORAGE: Self = Self(1 << 5);
    pub const INDIRECT: Self = Self(1 << 6);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for BufferUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Pipeline stage flags used to scope barrier transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageFlags(u32);

impl StageFlags {
    pub const TOP_OF_PIPE: Self = Self(1 << 0);
    pub const VERTEX_SHADER: Self = Self(1 << 1);
    pub const EARLY_FRAGMENT_TESTS: Self = Self(1 << 2);
    pub const FRAGMENT_SHADER: Self = Self(1 << 3);
    pub const LATE_FRAGMENT_TESTS: Self = Self(1 << 4);
    pub const COLOR_ATTACHMENT_OUTPUT: Self = Self(1 << 5);
    pub const COMPUTE_SHADER: Self = Self(1 << 6);
    pub const TRANSFER: Self = Self(1 << 7);
    pub const BOTTOM_OF_PIPE: Self = Self(1 << 8);
    pub const ALL_COMMANDS: Self = Self(1 << 9);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for StageFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Memory access flags carried by barrier transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessFlags(u32);

impl AccessFlags {
    pub const NONE: Self = Self(0);
    pub const SHADER_READ: Self = Self(1 << 0);
    pub const SHADER_WRITE: Self = Self(1 << 1);
    pub const COLOR_ATTACHMENT_READ: Self = Self(1 << 2);
    pub const COLOR_ATTACHMENT_WRITE: Self = Self(1 << 3);
    pub const DEPTH_STENCIL_ATTACHMENT_WRITE: Self = Self(1 << 4);
    pub const TRANSFER_READ: Self = Self(1 << 5);
    pub const TRANSFER_WRITE: Self = Self(1 << 6);
    pub const MEMORY_READ: Self = Self(1 << 7);
    pub const MEMORY_WRITE: Self = Self(1 << 8);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for AccessFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Attachment load behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOp {
    Clear,
    Load,
    DontCare,
}

/// Attachment store behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Store,
    DontCare,
}

/// Clear value accumulated per image write when a render scope opens
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

/// 2D extent in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent2d {
    pub width: u32,
    pub height: u32,
}

impl Extent2d {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Describes image dimensions that can be relative to the presentation surface
#[derive(Debug, Clone, Copy)]
pub enum TextureSize {
    /// Absolute size in pixels
    Absolute { width: u32, height: u32 },
    /// Relative to the surface size (1.0 = full surface)
    SurfaceRelative { width_scale: f32, height_scale: f32 },
}

impl Default for TextureSize {
    fn default() -> Self {
        TextureSize::SurfaceRelative {
            width_scale: 1.0,
            height_scale: 1.0,
        }
    }
}

impl TextureSize {
    /// Resolves against the current surface extent. Called at realization
    /// time, not declaration time, so relative sizes pick up the extent the
    /// surface had when the resource was first written.
    pub fn resolve(&self, surface: Extent2d) -> Extent2d {
        match self {
            TextureSize::Absolute { width, height } => Extent2d::new(*width, *height),
            TextureSize::SurfaceRelative {
                width_scale,
                height_scale,
            } => Extent2d::new(
                ((surface.width as f32) * width_scale) as u32,
                ((surface.height as f32) * height_scale) as u32,
            ),
        }
    }
}

/// Image dimensionality / view kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageKind {
    #[default]
    D2,
    Cube,
    Array,
}

/// Where a buffer's backing memory lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryLocation {
    #[default]
    GpuOnly,
    CpuToGpu,
    GpuToCpu,
}

/// Filter mode for samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    Nearest,
    #[default]
    Linear,
}

/// Address mode for samplers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressMode {
    ClampToEdge,
    #[default]
    Repeat,
    MirrorRepeat,
}

/// Sampler configuration attached to an image descriptor
#[derive(Debug, Clone, Copy, Default)]
pub struct SamplerDescriptor {
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    pub mipmap_filter: FilterMode,
    pub address_mode: AddressMode,
}

/// Immutable configuration for creating a buffer resource
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub element_size: u64,
    pub element_count: u32,
    pub usage: BufferUsage,
    pub memory: MemoryLocation,
    pub min_alignment: u64,
}

impl BufferDescriptor {
    /// Total allocation size with every element rounded up to the minimum
    /// alignment.
    pub fn total_size(&self) -> u64 {
        let stride = if self.min_alignment > 0 {
            self.element_size.div_ceil(self.min_alignment) * self.min_alignment
        } else {
            self.element_size
        };
        stride * self.element_count as u64
    }
}

/// Immutable configuration for creating an image resource
#[derive(Debug, Clone)]
pub struct ImageDescriptor {
    pub size: TextureSize,
    pub depth: u32,
    pub layers: u32,
    pub mips: u32,
    pub format: TextureFormat,
    pub usage: TextureUsage,
    pub kind: ImageKind,
    /// When set, a sampler is created alongside the image at realization.
    pub sampler: Option<SamplerDescriptor>,
}

impl Default for ImageDescriptor {
    fn default() -> Self {
        Self {
            size: TextureSize::default(),
            depth: 1,
            layers: 1,
            mips: 1,
            format: TextureFormat::Rgba8Unorm,
            usage: TextureUsage::SAMPLED | TextureUsage::COPY_DST,
            kind: ImageKind::D2,
            sampler: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_formats_are_classified() {
        assert!(TextureFormat::Depth32Float.is_depth());
        assert!(TextureFormat::Depth24PlusStencil8.is_depth());
        assert!(!TextureFormat::Rgba8Unorm.is_depth());
        assert!(!TextureFormat::Depth32Float.has_stencil());
        assert!(TextureFormat::Depth24PlusStencil8.has_stencil());
    }

    #[test]
    fn relative_size_resolves_against_surface() {
        let size = TextureSize::SurfaceRelative {
            width_scale: 0.5,
            height_scale: 1.0,
        };
        assert_eq!(
            size.resolve(Extent2d::new(1920, 1080)),
            Extent2d::new(960, 1080)
        );
    }

    #[test]
    fn absolute_size_ignores_surface() {
        let size = TextureSize::Absolute {
            width: 256,
            height: 256,
        };
        assert_eq!(
            size.resolve(Extent2d::new(1920, 1080)),
            Extent2d::new(256, 256)
        );
    }

    #[test]
    fn buffer_total_size_respects_alignment() {
        let desc = BufferDescriptor {
            element_size: 24,
            element_count: 3,
            usage: BufferUsage::UNIFORM,
            memory: MemoryLocation::GpuOnly,
            min_alignment: 16,
        };
        assert_eq!(desc.total_size(), 32 * 3);

        let packed = BufferDescriptor {
            min_alignment: 0,
            ..desc
        };
        assert_eq!(packed.total_size(), 24 * 3);
    }
}
