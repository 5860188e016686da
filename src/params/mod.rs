/// Per-conversion parameters
///
/// This module handles:
/// - User-visible processing options and presets (`options.rs`)
/// - Validation and assembly of the per-frame GPU parameter set (`builder.rs`)

pub mod builder;
pub mod options;

pub use builder::{ConversionRequest, FrameParams};
pub use options::{PostProcessMode, ProcessingOptions};
