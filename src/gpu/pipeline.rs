/// wgpu passes for RAW conversion
///
/// This module manages all the wgpu boilerplate:
/// - Texture creation and uploads
/// - Uniform buffers for the per-stage parameters
/// - Render pipeline state
/// - Draw commands and readback
///
/// The stages are a typestate chain, each consuming its predecessor:
/// `Stage1` → `WorkingImage` → `Stage2` → `RenderedRegion` → bytes.

use std::time::Instant;

use tracing::{debug, info};
use wgpu::util::DeviceExt;

use super::context::GpuContext;
use super::histogram::{self, LuminanceHistogram, BINS};
use super::shaders;
use crate::error::{ConvertError, Result};
use crate::params::FrameParams;
use crate::raw::{LensShadingMap, RawFrame};

const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Stage 1 uniforms
/// Must match the WGSL struct layout with proper alignment
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Stage1Params {
    // Matrix rows padded to vec4
    pub sensor_to_xyz_0: [f32; 4],
    pub sensor_to_xyz_1: [f32; 4],
    pub sensor_to_xyz_2: [f32; 4],
    pub neutral: [f32; 4],
    pub black_level: [f32; 4],
    pub white_level: f32,
    pub cfa_layout: u32,
    pub shading_width: u32,
    pub shading_height: u32,
}

impl Stage1Params {
    pub fn new(params: &FrameParams, shading: &LensShadingMap) -> Self {
        let [m0, m1, m2] = padded_rows(&params.sensor_to_xyz);
        let [r, g, b] = params.neutral;
        Self {
            sensor_to_xyz_0: m0,
            sensor_to_xyz_1: m1,
            sensor_to_xyz_2: m2,
            neutral: [r, g, b, 1.0],
            black_level: params.black_level.map(|v| v as f32),
            white_level: params.white_level as f32,
            cfa_layout: params.cfa.packed_layout(),
            shading_width: shading.columns,
            shading_height: shading.rows,
        }
    }
}

/// Stage 2 uniforms
/// Must match the WGSL struct layout with proper alignment
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Stage2Params {
    pub xyz_to_prophoto_0: [f32; 4],
    pub xyz_to_prophoto_1: [f32; 4],
    pub xyz_to_prophoto_2: [f32; 4],
    pub prophoto_to_srgb_0: [f32; 4],
    pub prophoto_to_srgb_1: [f32; 4],
    pub prophoto_to_srgb_2: [f32; 4],
    pub tone_curve: [f32; 4],
    pub post_curve: [f32; 4],
    pub offset: [u32; 2],
    pub sharpen_factor: f32,
    pub histogram_factor: f32,
    // 256 entries packed as array<vec4<f32>, 64>
    pub histogram_lut: [[f32; 4]; BINS / 4],
}

impl Stage2Params {
    /// Without an equalization table the histogram blend is switched off, so
    /// stage 2 leaves luminance untouched.
    pub fn new(params: &FrameParams, lut: Option<&[f32; BINS]>) -> Self {
        let identity = histogram::identity_lut();
        let histogram_factor = match lut {
            Some(_) => params.histogram_factor,
            None => 0.0,
        };
        let [p0, p1, p2] = padded_rows(&params.xyz_to_prophoto);
        let [s0, s1, s2] = padded_rows(&params.prophoto_to_srgb);
        Self {
            xyz_to_prophoto_0: p0,
            xyz_to_prophoto_1: p1,
            xyz_to_prophoto_2: p2,
            prophoto_to_srgb_0: s0,
            prophoto_to_srgb_1: s1,
            prophoto_to_srgb_2: s2,
            tone_curve: params.tone_curve.coeffs,
            post_curve: params.post_process_curve.coeffs,
            offset: [params.output_offset.0, params.output_offset.1],
            sharpen_factor: params.sharpen_factor,
            histogram_factor,
            histogram_lut: histogram::pack_lut(lut.unwrap_or(&identity)),
        }
    }
}

/// Render target formats of the working image and the luminance blur
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntermediateFormats {
    pub working: wgpu::TextureFormat,
    pub blur: wgpu::TextureFormat,
}

impl IntermediateFormats {
    /// Pick 32-bit float targets where `renderable` allows them, half float
    /// otherwise. Downlevel and GL adapters cannot render to `Rgba32Float`.
    pub fn select(renderable: impl Fn(wgpu::TextureFormat) -> bool) -> Self {
        let pick = |full, fallback| if renderable(full) { full } else { fallback };
        Self {
            working: pick(
                wgpu::TextureFormat::Rgba32Float,
                wgpu::TextureFormat::Rgba16Float,
            ),
            blur: pick(wgpu::TextureFormat::R32Float, wgpu::TextureFormat::R16Float),
        }
    }

    pub fn for_context(context: &GpuContext) -> Self {
        Self::select(|format| context.is_renderable(format))
    }

    fn working_bytes_per_pixel(&self) -> Result<u32> {
        match self.working {
            wgpu::TextureFormat::Rgba32Float => Ok(16),
            wgpu::TextureFormat::Rgba16Float => Ok(8),
            other => Err(unsupported_working_format(other)),
        }
    }
}

fn unsupported_working_format(format: wgpu::TextureFormat) -> ConvertError {
    ConvertError::Gpu(format!("Unsupported working image format {:?}", format))
}

/// Decode a tightly packed working image readback into f32 channels.
fn decode_pixels(bytes: &[u8], format: wgpu::TextureFormat) -> Result<Vec<f32>> {
    match format {
        wgpu::TextureFormat::Rgba32Float => Ok(bytes
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect()),
        wgpu::TextureFormat::Rgba16Float => Ok(bytes
            .chunks_exact(2)
            .map(|b| half::f16::from_ne_bytes([b[0], b[1]]).to_f32())
            .collect()),
        other => Err(unsupported_working_format(other)),
    }
}

/// Split a row-major 3x3 into three vec4 rows
fn padded_rows(m: &[f32; 9]) -> [[f32; 4]; 3] {
    [
        [m[0], m[1], m[2], 0.0],
        [m[3], m[4], m[5], 0.0],
        [m[6], m[7], m[8], 0.0],
    ]
}

/// Rectangle of the frame that ends up in the output bitmap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl From<&FrameParams> for OutputRegion {
    fn from(params: &FrameParams) -> Self {
        Self {
            x: params.output_offset.0,
            y: params.output_offset.1,
            width: params.output_size.0,
            height: params.output_size.1,
        }
    }
}

/// Stage 1, configured and ready to draw
pub struct Stage1<'a> {
    context: &'a GpuContext,
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    target: wgpu::Texture,
    formats: IntermediateFormats,
    width: u32,
    height: u32,
}

impl<'a> Stage1<'a> {
    /// Upload the raw frame, lens shading map and uniforms.
    pub fn configure(
        context: &'a GpuContext,
        frame: &RawFrame,
        shading: &LensShadingMap,
        params: Stage1Params,
    ) -> Result<Self> {
        let max = context.max_texture_dimension();
        for (what, w, h) in [
            ("Raw frame", frame.width, frame.height),
            ("Lens shading map", shading.columns, shading.rows),
        ] {
            if w > max || h > max {
                return Err(ConvertError::Gpu(format!(
                    "{} of {}x{} exceeds the device texture limit {}",
                    what, w, h, max
                )));
            }
        }

        let formats = IntermediateFormats::for_context(context);
        debug!(working = ?formats.working, blur = ?formats.blur, "intermediate formats");

        let device = &context.device;
        with_error_scope(device, "stage 1 setup", || {
            let raw_size = extent(frame.width, frame.height);
            let raw_texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some("RAW Input Texture (R16Uint)"),
                size: raw_size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::R16Uint,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });

            // Rows keep their stride, the copy skips the padding
            let raw_bytes: &[u8] = bytemuck::cast_slice(&frame.samples);
            debug!(bytes = raw_bytes.len(), "uploading RAW16 samples");
            context.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &raw_texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                raw_bytes,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(frame.stride),
                    rows_per_image: Some(frame.height),
                },
                raw_size,
            );

            let shading_size = extent(shading.columns, shading.rows);
            let shading_texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some("Lens Shading Texture"),
                size: shading_size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba32Float,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            context.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &shading_texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                bytemuck::cast_slice(&shading.gains),
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(shading.columns * 16),
                    rows_per_image: Some(shading.rows),
                },
                shading_size,
            );

            let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Stage 1 Uniform Buffer"),
                contents: bytemuck::cast_slice(&[params]),
                usage: wgpu::BufferUsages::UNIFORM,
            });

            let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Stage 1 Bind Group Layout"),
                entries: &[
                    texture_entry(0, wgpu::TextureSampleType::Uint),
                    texture_entry(1, wgpu::TextureSampleType::Float { filterable: false }),
                    uniform_entry(2),
                ],
            });

            let raw_view = raw_texture.create_view(&wgpu::TextureViewDescriptor::default());
            let shading_view = shading_texture.create_view(&wgpu::TextureViewDescriptor::default());
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Stage 1 Bind Group"),
                layout: &layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&raw_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&shading_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: uniform_buffer.as_entire_binding(),
                    },
                ],
            });

            let pipeline = render_pipeline(
                device,
                "Stage 1 Pipeline",
                &layout,
                shaders::STAGE1_FRAGMENT,
                formats.working,
            );

            let target = render_target(
                device,
                "Working Image (XYZ D50)",
                frame.width,
                frame.height,
                formats.working,
                wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_SRC,
            );

            Self {
                context,
                pipeline,
                bind_group,
                target,
                formats,
                width: frame.width,
                height: frame.height,
            }
        })
    }

    /// Render the working image and analyze `region` of it.
    ///
    /// Waits for the GPU: the histogram is computed from a readback, so the
    /// next stage cannot be configured before this one has finished.
    pub fn execute(self, region: OutputRegion) -> Result<WorkingImage<'a>> {
        let started = Instant::now();
        let device = &self.context.device;

        let view = self.target.create_view(&wgpu::TextureViewDescriptor::default());
        with_error_scope(device, "stage 1", || {
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Stage 1 Encoder"),
            });
            draw(&mut encoder, "Stage 1 Pass", &self.pipeline, &self.bind_group, &view);
            self.context.queue.submit(Some(encoder.finish()));
        })?;

        let bytes = read_texture(
            self.context,
            &self.target,
            (region.x, region.y),
            (region.width, region.height),
            self.formats.working_bytes_per_pixel()?,
        )?;
        let pixels = decode_pixels(&bytes, self.formats.working)?;
        let histogram = LuminanceHistogram::from_xyz_pixels(&pixels);

        info!(
            width = self.width,
            height = self.height,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "stage 1 finished"
        );

        Ok(WorkingImage {
            context: self.context,
            view,
            texture: self.target,
            formats: self.formats,
            width: self.width,
            height: self.height,
            region,
            histogram,
        })
    }
}

/// Stage 1 output: the frame in XYZ (D50), plus its luminance histogram
pub struct WorkingImage<'a> {
    context: &'a GpuContext,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    formats: IntermediateFormats,
    width: u32,
    height: u32,
    region: OutputRegion,
    histogram: LuminanceHistogram,
}

impl<'a> WorkingImage<'a> {
    pub fn histogram(&self) -> &LuminanceHistogram {
        &self.histogram
    }

    pub fn region(&self) -> OutputRegion {
        self.region
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Build the blur and output passes over this working image.
    pub fn configure_stage2(self, params: Stage2Params) -> Result<Stage2<'a>> {
        let device = &self.context.device;
        with_error_scope(device, "stage 2 setup", || {
            let blur_target = render_target(
                device,
                "Luminance Blur",
                self.width,
                self.height,
                self.formats.blur,
                wgpu::TextureUsages::TEXTURE_BINDING,
            );
            let blur_view = blur_target.create_view(&wgpu::TextureViewDescriptor::default());

            let blur_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Blur Bind Group Layout"),
                entries: &[texture_entry(0, wgpu::TextureSampleType::Float { filterable: false })],
            });
            let blur_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Blur Bind Group"),
                layout: &blur_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&self.view),
                }],
            });
            let blur_pipeline = render_pipeline(
                device,
                "Blur Pipeline",
                &blur_layout,
                shaders::BLUR_FRAGMENT,
                self.formats.blur,
            );

            let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Stage 2 Uniform Buffer"),
                contents: bytemuck::cast_slice(&[params]),
                usage: wgpu::BufferUsages::UNIFORM,
            });
            let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Stage 2 Bind Group Layout"),
                entries: &[
                    texture_entry(0, wgpu::TextureSampleType::Float { filterable: false }),
                    texture_entry(1, wgpu::TextureSampleType::Float { filterable: false }),
                    uniform_entry(2),
                ],
            });
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Stage 2 Bind Group"),
                layout: &layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&self.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&blur_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: uniform_buffer.as_entire_binding(),
                    },
                ],
            });
            let pipeline = render_pipeline(
                device,
                "Stage 2 Pipeline",
                &layout,
                shaders::STAGE2_FRAGMENT,
                OUTPUT_FORMAT,
            );

            let target = render_target(
                device,
                "Output Texture (sRGB)",
                self.region.width,
                self.region.height,
                OUTPUT_FORMAT,
                wgpu::TextureUsages::COPY_SRC,
            );

            Stage2 {
                context: self.context,
                _working: self.texture,
                blur_view,
                blur_pipeline,
                blur_bind_group,
                pipeline,
                bind_group,
                target,
                region: self.region,
            }
        })
    }
}

/// Stage 2, configured and ready to draw
pub struct Stage2<'a> {
    context: &'a GpuContext,
    // Sampled by both passes, must outlive them
    _working: wgpu::Texture,
    blur_view: wgpu::TextureView,
    blur_pipeline: wgpu::RenderPipeline,
    blur_bind_group: wgpu::BindGroup,
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    target: wgpu::Texture,
    region: OutputRegion,
}

impl<'a> Stage2<'a> {
    /// Run the blur pass, then the output pass, in one submission.
    pub fn execute(self) -> Result<RenderedRegion<'a>> {
        let started = Instant::now();
        let device = &self.context.device;
        let view = self.target.create_view(&wgpu::TextureViewDescriptor::default());

        with_error_scope(device, "stage 2", || {
            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Stage 2 Encoder"),
            });
            draw(
                &mut encoder,
                "Blur Pass",
                &self.blur_pipeline,
                &self.blur_bind_group,
                &self.blur_view,
            );
            draw(&mut encoder, "Stage 2 Pass", &self.pipeline, &self.bind_group, &view);
            self.context.queue.submit(Some(encoder.finish()));
        })?;
        device.poll(wgpu::Maintain::Wait);

        info!(
            width = self.region.width,
            height = self.region.height,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "stage 2 finished"
        );

        Ok(RenderedRegion {
            context: self.context,
            texture: self.target,
            width: self.region.width,
            height: self.region.height,
        })
    }
}

/// The finished sRGB region, still on the GPU
pub struct RenderedRegion<'a> {
    context: &'a GpuContext,
    texture: wgpu::Texture,
    width: u32,
    height: u32,
}

impl RenderedRegion<'_> {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Copy the region back as tightly packed RGBA bytes.
    pub fn readback(self) -> Result<Vec<u8>> {
        read_texture(self.context, &self.texture, (0, 0), (self.width, self.height), 4)
    }
}

/// Run `f` inside validation and out-of-memory error scopes.
fn with_error_scope<T>(device: &wgpu::Device, stage: &str, f: impl FnOnce() -> T) -> Result<T> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = f();
    let validation = pollster::block_on(device.pop_error_scope());
    let out_of_memory = pollster::block_on(device.pop_error_scope());
    match validation.or(out_of_memory) {
        Some(e) => Err(ConvertError::Gpu(format!("{} failed: {}", stage, e))),
        None => Ok(value),
    }
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

fn render_target(
    device: &wgpu::Device,
    label: &str,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    extra_usage: wgpu::TextureUsages,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: extent(width, height),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | extra_usage,
        view_formats: &[],
    })
}

fn texture_entry(binding: u32, sample_type: wgpu::TextureSampleType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type,
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Full-screen triangle pipeline around one fragment program
fn render_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::BindGroupLayout,
    fragment_source: &str,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let vertex = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Full-screen Triangle"),
        source: wgpu::ShaderSource::Wgsl(shaders::FULLSCREEN_VERTEX.into()),
    });
    let fragment = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(fragment_source.into()),
    });
    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &vertex,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[],
        },
        fragment: Some(wgpu::FragmentState {
            module: &fragment,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None, // Disable culling for full-screen triangle
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        cache: None,
    })
}

fn draw(
    encoder: &mut wgpu::CommandEncoder,
    label: &str,
    pipeline: &wgpu::RenderPipeline,
    bind_group: &wgpu::BindGroup,
    target: &wgpu::TextureView,
) {
    let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: target,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    });
    render_pass.set_pipeline(pipeline);
    render_pass.set_bind_group(0, bind_group, &[]);
    render_pass.draw(0..3, 0..1); // Full-screen triangle
}

/// Bytes per row of a texture copy, padded to the buffer copy alignment
fn padded_bytes_per_row(width: u32, bytes_per_pixel: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    (width * bytes_per_pixel).div_ceil(align) * align
}

/// Copy a rectangle of `texture` into host memory, without row padding.
fn read_texture(
    context: &GpuContext,
    texture: &wgpu::Texture,
    origin: (u32, u32),
    size: (u32, u32),
    bytes_per_pixel: u32,
) -> Result<Vec<u8>> {
    let (width, height) = size;
    let padded = padded_bytes_per_row(width, bytes_per_pixel);
    let device = &context.device;

    let buffer = with_error_scope(device, "readback", || {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: u64::from(padded) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: origin.0,
                    y: origin.1,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            extent(width, height),
        );
        context.queue.submit(Some(encoder.finish()));
        buffer
    })?;

    let slice = buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    device.poll(wgpu::Maintain::Wait);
    rx.recv()
        .map_err(|_| ConvertError::Gpu("Readback was never mapped".to_string()))?
        .map_err(|e| ConvertError::Gpu(format!("Failed to map readback buffer: {}", e)))?;

    let row_bytes = (width * bytes_per_pixel) as usize;
    let data = slice.get_mapped_range();
    let mut output = Vec::with_capacity(row_bytes * height as usize);
    for row in data.chunks_exact(padded as usize) {
        output.extend_from_slice(&row[..row_bytes]);
    }

    drop(data);
    buffer.unmap();
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::ToneCurve;
    use crate::color::solver::ColorTransformSet;
    use crate::raw::CfaPattern;
    use cgmath::SquareMatrix;

    fn frame_params() -> FrameParams {
        FrameParams {
            cfa: CfaPattern::Grbg,
            black_level: [64, 64, 60, 64],
            white_level: 1023,
            neutral: [0.5, 1.0, 0.7],
            sensor_to_xyz: [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0],
            xyz_to_prophoto: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            prophoto_to_srgb: [2.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 2.0],
            tone_curve: ToneCurve::ACR3_UNIT,
            post_process_curve: ToneCurve::IDENTITY,
            sharpen_factor: 0.25,
            histogram_factor: 0.15,
            output_offset: (2, 4),
            output_size: (8, 6),
            transforms: ColorTransformSet {
                sensor_to_xyz: crate::color::Mat3::identity(),
                sensor_to_working: crate::color::Mat3::identity(),
                working_to_srgb: crate::color::Mat3::identity(),
                interpolation_factor: 0.5,
                converged: true,
            },
        }
    }

    #[test]
    fn test_uniform_sizes_match_wgsl() {
        // WGSL sizes: 5 vec4 + 4 scalars, and 8 vec4 + vec2 + 2 scalars + 64 vec4
        assert_eq!(std::mem::size_of::<Stage1Params>(), 96);
        assert_eq!(std::mem::size_of::<Stage2Params>(), 1168);
    }

    #[test]
    fn test_stage1_params() {
        let p = Stage1Params::new(&frame_params(), &LensShadingMap::unit());
        assert_eq!(p.sensor_to_xyz_1, [4.0, 5.0, 6.0, 0.0]);
        assert_eq!(p.neutral, [0.5, 1.0, 0.7, 1.0]);
        assert_eq!(p.black_level, [64.0, 64.0, 60.0, 64.0]);
        assert_eq!(p.white_level, 1023.0);
        assert_eq!(p.cfa_layout, CfaPattern::Grbg.packed_layout());
        assert_eq!((p.shading_width, p.shading_height), (1, 1));
    }

    #[test]
    fn test_stage2_params() {
        let params = frame_params();
        let lut = [0.5; BINS];
        let p = Stage2Params::new(&params, Some(&lut));
        assert_eq!(p.prophoto_to_srgb_2, [0.0, 0.0, 2.0, 0.0]);
        assert_eq!(p.tone_curve, ToneCurve::ACR3_UNIT.coeffs);
        assert_eq!(p.offset, [2, 4]);
        assert_eq!(p.histogram_factor, 0.15);
        assert_eq!(p.histogram_lut[63][3], 0.5);
        assert_eq!(OutputRegion::from(&params).width, 8);
    }

    #[test]
    fn test_stage2_params_without_lut_disable_equalization() {
        let p = Stage2Params::new(&frame_params(), None);
        assert_eq!(p.histogram_factor, 0.0);
        assert_eq!(p.histogram_lut[63][3], 1.0);
        assert_eq!(p.sharpen_factor, 0.25);
    }

    #[test]
    fn test_intermediate_formats_fall_back_to_half_float() {
        let full = IntermediateFormats::select(|_| true);
        assert_eq!(full.working, wgpu::TextureFormat::Rgba32Float);
        assert_eq!(full.blur, wgpu::TextureFormat::R32Float);
        assert_eq!(full.working_bytes_per_pixel().unwrap(), 16);

        let fallback = IntermediateFormats::select(|format| {
            !matches!(
                format,
                wgpu::TextureFormat::Rgba32Float | wgpu::TextureFormat::R32Float
            )
        });
        assert_eq!(fallback.working, wgpu::TextureFormat::Rgba16Float);
        assert_eq!(fallback.blur, wgpu::TextureFormat::R16Float);
        assert_eq!(fallback.working_bytes_per_pixel().unwrap(), 8);
    }

    #[test]
    fn test_decode_half_float_pixels() {
        let values = [0.0f32, 0.25, 0.5, 1.0];
        let bytes: Vec<u8> = values
            .iter()
            .flat_map(|v| half::f16::from_f32(*v).to_ne_bytes())
            .collect();
        let pixels = decode_pixels(&bytes, wgpu::TextureFormat::Rgba16Float).unwrap();
        assert_eq!(pixels, values);

        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        let pixels = decode_pixels(&bytes, wgpu::TextureFormat::Rgba32Float).unwrap();
        assert_eq!(pixels, values);

        assert!(matches!(
            decode_pixels(&bytes, wgpu::TextureFormat::Rgba8Unorm),
            Err(ConvertError::Gpu(_))
        ));
    }

    #[test]
    fn test_padded_bytes_per_row() {
        assert_eq!(padded_bytes_per_row(1, 4), 256);
        assert_eq!(padded_bytes_per_row(64, 4), 256);
        assert_eq!(padded_bytes_per_row(65, 4), 512);
        assert_eq!(padded_bytes_per_row(16, 16), 256);
    }
}
