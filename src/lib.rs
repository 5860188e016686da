/// DNG RAW16 to sRGB conversion on the GPU.
///
/// A conversion takes a Bayer mosaic and its DNG color calibration, solves the
/// camera-to-XYZ transform for the scene illuminant, and renders a region of
/// the frame into a caller-supplied RGBA bitmap.
///
/// Architecture:
/// - `raw` - frame, CFA layout, lens shading and calibration inputs
/// - `color` - matrix kernel, illuminants, tone curves and the solver
/// - `params` - processing options and per-frame parameter assembly
/// - `gpu` - the two render stages and the histogram between them
/// - `convert` - entry points

pub mod bitmap;
pub mod color;
pub mod convert;
pub mod error;
pub mod gpu;
pub mod logging;
pub mod params;
pub mod raw;

pub use bitmap::{Bitmap, BitmapFormat};
pub use color::{ColorTransformSet, Illuminant, ToneCurve};
pub use convert::{convert_to_srgb, RawConverter};
pub use error::{ConvertError, Result};
pub use gpu::GpuContext;
pub use params::{ConversionRequest, FrameParams, PostProcessMode, ProcessingOptions};
pub use raw::{CalibrationMetadata, CfaPattern, LensShadingMap, RawFrame};
