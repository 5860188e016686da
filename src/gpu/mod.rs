/// GPU conversion passes
///
/// Architecture:
/// - `context.rs` - adapter, device and queue acquisition
/// - `shaders.rs` - WGSL programs for each pass
/// - `pipeline.rs` - typestate stage chain, uniforms and readback
/// - `histogram.rs` - luminance equalization between the two stages
///
/// Stage 1 turns the RAW16 mosaic into an XYZ (D50) working image. Stage 2
/// blurs its luminance, then tone-maps the output region to 8-bit sRGB.

pub mod context;
pub mod histogram;
pub mod pipeline;
pub mod shaders;

pub use context::GpuContext;
pub use pipeline::{
    IntermediateFormats, OutputRegion, RenderedRegion, Stage1, Stage1Params, Stage2, Stage2Params,
    WorkingImage,
};
