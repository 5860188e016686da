/// Conversion entry points.

use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use crate::bitmap::Bitmap;
use crate::error::{ConvertError, Result};
use crate::gpu::pipeline::{OutputRegion, Stage1, Stage1Params, Stage2Params};
use crate::gpu::GpuContext;
use crate::params::{ConversionRequest, FrameParams};
use crate::raw::LensShadingMap;

/// Converts RAW16 frames on a GPU context it owns.
///
/// Conversions through one converter serialize on the context; parameter
/// validation and color solving run before the lock is taken.
///
/// ```no_run
/// use dng_processor::{Bitmap, BitmapFormat, ConversionRequest, RawConverter};
/// # fn run(frame: &dng_processor::RawFrame, calibration: &dng_processor::CalibrationMetadata) -> dng_processor::Result<()> {
/// let converter = RawConverter::new()?;
/// let mut output = Bitmap::new(frame.width, frame.height, BitmapFormat::Rgba8888);
/// converter.convert(&ConversionRequest::new(frame, calibration), &mut output)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct RawConverter {
    context: Mutex<GpuContext>,
}

impl RawConverter {
    /// Acquire a GPU adapter and device, blocking until ready.
    pub fn new() -> Result<Self> {
        Ok(Self::with_context(GpuContext::new_blocking()?))
    }

    pub fn with_context(context: GpuContext) -> Self {
        Self {
            context: Mutex::new(context),
        }
    }

    /// Convert the request's frame into `output`.
    ///
    /// `output` is written only if every stage succeeds.
    #[instrument(skip_all, fields(width = output.width, height = output.height))]
    pub fn convert(&self, request: &ConversionRequest<'_>, output: &mut Bitmap) -> Result<()> {
        let params = FrameParams::build(request, output)?;
        let pixels = {
            let context = self.context.lock();
            render(&context, request, &params)?
        };
        commit(output, pixels)
    }
}

/// Convert with a caller-managed context.
#[instrument(skip_all, fields(width = output.width, height = output.height))]
pub fn convert_to_srgb(
    context: &GpuContext,
    request: &ConversionRequest<'_>,
    output: &mut Bitmap,
) -> Result<()> {
    let params = FrameParams::build(request, output)?;
    let pixels = render(context, request, &params)?;
    commit(output, pixels)
}

/// Run both GPU stages and return the region as RGBA bytes.
fn render(
    context: &GpuContext,
    request: &ConversionRequest<'_>,
    params: &FrameParams,
) -> Result<Vec<u8>> {
    let unit = LensShadingMap::unit();
    let shading = request.lens_shading.unwrap_or(&unit);

    let working = Stage1::configure(
        context,
        request.frame,
        shading,
        Stage1Params::new(params, shading),
    )?
    .execute(OutputRegion::from(params))?;

    let lut = working.histogram().equalization_lut();
    if lut.is_none() {
        debug!("luminance histogram has a single level, equalization skipped");
    }
    let rendered = working
        .configure_stage2(Stage2Params::new(params, lut.as_ref()))?
        .execute()?;
    rendered.readback()
}

fn commit(output: &mut Bitmap, pixels: Vec<u8>) -> Result<()> {
    if pixels.len() != output.pixels.len() {
        return Err(ConvertError::Gpu(format!(
            "Readback returned {} bytes, bitmap holds {}",
            pixels.len(),
            output.pixels.len()
        )));
    }
    output.pixels = pixels;
    info!(width = output.width, height = output.height, "conversion finished");
    Ok(())
}
