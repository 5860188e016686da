/// RAW sensor input model
///
/// This module handles:
/// - The RAW16 frame and its Bayer layout (`frame.rs`)
/// - Per-illuminant DNG calibration metadata (`metadata.rs`)
/// - Building both from a decoded RAW file (`loader.rs`)

pub mod frame;
pub mod loader;
pub mod metadata;

pub use frame::{CfaPattern, LensShadingMap, RawFrame};
pub use metadata::CalibrationMetadata;
