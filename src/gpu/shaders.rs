/// WGSL programs for the conversion passes
///
/// Every pass draws one full-screen triangle and reads its inputs with
/// `textureLoad`, so results are exact per pixel and independent of sampler
/// state. Fragment positions are pixel centers; `floor` yields the integer
/// pixel coordinate.

/// Full-screen triangle shared by every pass
///
/// Vertex 0: (-1, -1), vertex 1: (3, -1), vertex 2: (-1, 3)
pub const FULLSCREEN_VERTEX: &str = r#"
@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> @builtin(position) vec4<f32> {
    let x = f32(i32(vertex_index & 1u) * 4 - 1);
    let y = f32(i32(vertex_index >> 1u) * 4 - 1);
    return vec4<f32>(x, y, 0.0, 1.0);
}
"#;

/// Stage 1: RAW16 mosaic → CIE XYZ (D50)
///
/// Black/white normalization, lens shading, bilinear demosaic, white balance
/// and the camera transform. Renders the full frame into an `Rgba32Float`
/// target, or `Rgba16Float` where the adapter cannot render f32.
pub const STAGE1_FRAGMENT: &str = r#"
struct Stage1Params {
    sensor_to_xyz_0: vec4<f32>,
    sensor_to_xyz_1: vec4<f32>,
    sensor_to_xyz_2: vec4<f32>,
    neutral: vec4<f32>,
    black_level: vec4<f32>,   // per CFA tile site
    white_level: f32,
    cfa_layout: u32,          // 2 bits per tile site: 0 = R, 1 = G, 2 = B
    shading_width: u32,
    shading_height: u32,
}

@group(0) @binding(0)
var raw_texture: texture_2d<u32>;

// RGBA = gains for R, G on red rows, G on blue rows, B
@group(0) @binding(1)
var shading_texture: texture_2d<f32>;

@group(0) @binding(2)
var<uniform> params: Stage1Params;

fn tile_site(p: vec2<i32>) -> u32 {
    return u32((p.y & 1) * 2 + (p.x & 1));
}

fn cfa_color(p: vec2<i32>) -> u32 {
    return (params.cfa_layout >> (tile_site(p) * 2u)) & 3u;
}

// Reflect across the border without repeating the edge row, keeps CFA parity
fn mirror(q: i32, size: i32) -> i32 {
    var r = q;
    if (r < 0) {
        r = -r;
    }
    if (r >= size) {
        r = 2 * size - 2 - r;
    }
    return r;
}

fn shading_channel(p: vec2<i32>, color: u32) -> u32 {
    if (color == 0u) {
        return 0u;
    }
    if (color == 2u) {
        return 3u;
    }
    if (cfa_color(vec2<i32>(p.x ^ 1, p.y)) == 0u) {
        return 1u;
    }
    return 2u;
}

fn shading_gain(p: vec2<i32>, dims: vec2<i32>, channel: u32) -> f32 {
    let last = vec2<i32>(i32(params.shading_width) - 1, i32(params.shading_height) - 1);
    let span = vec2<f32>(max(dims - vec2<i32>(1), vec2<i32>(1)));
    let pos = vec2<f32>(p) / span * vec2<f32>(last);
    let base = vec2<i32>(floor(pos));
    let t = pos - floor(pos);

    let p0 = clamp(base, vec2<i32>(0), last);
    let p1 = clamp(base + vec2<i32>(1), vec2<i32>(0), last);
    let g00 = textureLoad(shading_texture, p0, 0);
    let g10 = textureLoad(shading_texture, vec2<i32>(p1.x, p0.y), 0);
    let g01 = textureLoad(shading_texture, vec2<i32>(p0.x, p1.y), 0);
    let g11 = textureLoad(shading_texture, p1, 0);
    let g = mix(mix(g00, g10, t.x), mix(g01, g11, t.x), t.y);
    return g[channel];
}

// Normalized, shading-corrected sample at an already mirrored position
fn load_sample(p: vec2<i32>, dims: vec2<i32>, color: u32) -> f32 {
    let black = params.black_level[tile_site(p)];
    let raw = f32(textureLoad(raw_texture, p, 0).r);
    let v = clamp((raw - black) / (params.white_level - black), 0.0, 1.0);
    return v * shading_gain(p, dims, shading_channel(p, color));
}

@fragment
fn fs_main(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    let dims = vec2<i32>(textureDimensions(raw_texture));
    let p = vec2<i32>(floor(frag.xy));
    let channels = vec3<u32>(0u, 1u, 2u);

    // Bilinear demosaic: average every same-color site of the 3x3 window
    var sum = vec3<f32>(0.0);
    var count = vec3<f32>(0.0);
    var center = 0.0;
    for (var dy = -1; dy <= 1; dy += 1) {
        for (var dx = -1; dx <= 1; dx += 1) {
            let q = p + vec2<i32>(dx, dy);
            let m = vec2<i32>(mirror(q.x, dims.x), mirror(q.y, dims.y));
            let color = cfa_color(m);
            let v = load_sample(m, dims, color);
            let mask = select(vec3<f32>(0.0), vec3<f32>(1.0), channels == vec3<u32>(color));
            sum += mask * v;
            count += mask;
            if (dx == 0 && dy == 0) {
                center = v;
            }
        }
    }
    var rgb = sum / max(count, vec3<f32>(1.0));
    rgb = select(rgb, vec3<f32>(center), channels == vec3<u32>(cfa_color(p)));

    let balanced = min(rgb / params.neutral.xyz, vec3<f32>(1.0));
    let xyz = vec3<f32>(
        dot(params.sensor_to_xyz_0.xyz, balanced),
        dot(params.sensor_to_xyz_1.xyz, balanced),
        dot(params.sensor_to_xyz_2.xyz, balanced),
    );
    return vec4<f32>(xyz, 1.0);
}
"#;

/// Stage 2a: 5x5 binomial blur of the luminance (Y) channel into `R32Float` (`R16Float`)
pub const BLUR_FRAGMENT: &str = r#"
@group(0) @binding(0)
var xyz_texture: texture_2d<f32>;

// Row of Pascal's triangle: 1 4 6 4 1
fn binomial(i: i32) -> f32 {
    let a = abs(i);
    if (a == 0) {
        return 6.0;
    }
    if (a == 1) {
        return 4.0;
    }
    return 1.0;
}

@fragment
fn fs_main(@builtin(position) frag: vec4<f32>) -> @location(0) f32 {
    let dims = vec2<i32>(textureDimensions(xyz_texture));
    let p = vec2<i32>(floor(frag.xy));
    var sum = 0.0;
    for (var dy = -2; dy <= 2; dy += 1) {
        for (var dx = -2; dx <= 2; dx += 1) {
            let q = clamp(p + vec2<i32>(dx, dy), vec2<i32>(0), dims - vec2<i32>(1));
            let y = max(textureLoad(xyz_texture, q, 0).y, 0.0);
            sum += binomial(dx) * binomial(dy) * y;
        }
    }
    return sum / 256.0;
}
"#;

/// Stage 2b: XYZ → sRGB for the output region
///
/// Unsharp mask and histogram equalization on luminance, ProPhoto tone
/// mapping, post-process curve and sRGB encoding.
pub const STAGE2_FRAGMENT: &str = r#"
struct Stage2Params {
    xyz_to_prophoto_0: vec4<f32>,
    xyz_to_prophoto_1: vec4<f32>,
    xyz_to_prophoto_2: vec4<f32>,
    prophoto_to_srgb_0: vec4<f32>,
    prophoto_to_srgb_1: vec4<f32>,
    prophoto_to_srgb_2: vec4<f32>,
    tone_curve: vec4<f32>,
    post_curve: vec4<f32>,
    offset: vec2<u32>,
    sharpen_factor: f32,
    histogram_factor: f32,
    histogram_lut: array<vec4<f32>, 64>,  // 256 entries, 4 per element
}

@group(0) @binding(0)
var xyz_texture: texture_2d<f32>;

@group(0) @binding(1)
var blur_texture: texture_2d<f32>;

@group(0) @binding(2)
var<uniform> params: Stage2Params;

fn equalize(v: f32) -> f32 {
    let i = u32(clamp(v, 0.0, 1.0) * 255.0 + 0.5);
    return params.histogram_lut[i / 4u][i % 4u];
}

// Horner's scheme, coefficients highest power first
fn apply_curve(c: vec4<f32>, x: vec3<f32>) -> vec3<f32> {
    return ((c.x * x + c.y) * x + c.z) * x + c.w;
}

fn srgb_encode(c: vec3<f32>) -> vec3<f32> {
    let low = c * 12.92;
    let high = 1.055 * pow(c, vec3<f32>(1.0 / 2.4)) - 0.055;
    return select(high, low, c <= vec3<f32>(0.0031308));
}

@fragment
fn fs_main(@builtin(position) frag: vec4<f32>) -> @location(0) vec4<f32> {
    let p = vec2<i32>(floor(frag.xy)) + vec2<i32>(params.offset);
    var xyz = textureLoad(xyz_texture, p, 0).xyz;

    let y = max(xyz.y, 0.0);
    let blurred = textureLoad(blur_texture, p, 0).r;
    let sharpened = max(y + params.sharpen_factor * (y - blurred), 0.0);
    var equalized_y = sharpened;
    if (params.histogram_factor > 0.0) {
        equalized_y = mix(sharpened, equalize(sharpened), params.histogram_factor);
    }
    if (y > 1e-6) {
        xyz = xyz * (equalized_y / y);
    }

    var pp = vec3<f32>(
        dot(params.xyz_to_prophoto_0.xyz, xyz),
        dot(params.xyz_to_prophoto_1.xyz, xyz),
        dot(params.xyz_to_prophoto_2.xyz, xyz),
    );
    pp = clamp(pp, vec3<f32>(0.0), vec3<f32>(1.0));
    pp = clamp(apply_curve(params.tone_curve, pp), vec3<f32>(0.0), vec3<f32>(1.0));
    pp = clamp(apply_curve(params.post_curve, pp), vec3<f32>(0.0), vec3<f32>(1.0));

    let srgb = vec3<f32>(
        dot(params.prophoto_to_srgb_0.xyz, pp),
        dot(params.prophoto_to_srgb_1.xyz, pp),
        dot(params.prophoto_to_srgb_2.xyz, pp),
    );
    return vec4<f32>(srgb_encode(clamp(srgb, vec3<f32>(0.0), vec3<f32>(1.0))), 1.0);
}
"#;
