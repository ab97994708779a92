//! Renderer unit tests.
//!
//! Frame planning and clip-space conversion run without a GPU. Tests that need a
//! real adapter are ignored by default.

use render_protocol::RenderParams;
use tiles::{TILE_LINES, TileAddress, TileCache, TileCacheConfig, TileResource};

use super::*;
use crate::geometry::{frame_uniform, tile_quad_gpu};

struct RowsOnly(u32);

impl TileResource for RowsOnly {
    fn row_count(&self) -> u32 {
        self.0
    }

    fn release(&mut self) {}
}

fn params() -> RenderParams {
    RenderParams {
        scroll_offset_x: 0.0,
        fft_size: 64,
        stride: 1,
        total_samples: 1000,
        viewport_width: 600,
        viewport_height: 200,
        power_min: -100.0,
        power_max: 0.0,
        zoom_y: 1.0,
        scroll_offset_y_norm: 0.0,
    }
}

fn tile(index: u64) -> TileAddress {
    TileAddress::for_index(index, 64, 1)
}

#[test]
fn plan_draws_only_cached_tiles_using_actual_row_counts() {
    let mut cache = TileCache::new(TileCacheConfig { capacity: 8 });
    cache.put(tile(0), RowsOnly(TILE_LINES));
    cache.put(tile(2), RowsOnly(100));

    let plan = plan_frame(&params(), &mut cache);

    assert_eq!(plan.visible_tiles, 3);
    assert_eq!(plan.quads.len(), 2);
    assert_eq!(plan.quads[0].address, tile(0));
    assert_eq!((plan.quads[0].left_px, plan.quads[0].right_px), (0.0, 256.0));
    assert_eq!(plan.quads[1].address, tile(2));
    assert_eq!((plan.quads[1].left_px, plan.quads[1].right_px), (512.0, 612.0));
}

#[test]
fn plan_ignores_tiles_for_other_configurations() {
    let mut cache = TileCache::new(TileCacheConfig { capacity: 8 });
    cache.put(TileAddress::for_index(0, 128, 1), RowsOnly(TILE_LINES));
    cache.put(TileAddress::for_index(0, 64, 2), RowsOnly(TILE_LINES));

    let plan = plan_frame(&params(), &mut cache);

    assert!(plan.quads.is_empty());
}

#[test]
fn plan_refreshes_recency_of_drawn_tiles() {
    let mut cache = TileCache::new(TileCacheConfig { capacity: 2 });
    cache.put(tile(0), RowsOnly(TILE_LINES));
    cache.put(tile(30), RowsOnly(TILE_LINES));

    plan_frame(&params(), &mut cache);
    let evicted = cache.put(tile(1), RowsOnly(TILE_LINES));

    assert_eq!(evicted, Some(tile(30)));
}

#[test]
fn scrolled_plan_offsets_quads_by_scroll_and_stride() {
    let mut cache = TileCache::new(TileCacheConfig { capacity: 8 });
    let stride4 = |index| TileAddress::for_index(index, 64, 4);
    cache.put(stride4(1), RowsOnly(TILE_LINES));
    let params = RenderParams {
        scroll_offset_x: 1000.0,
        stride: 4,
        total_samples: 1 << 20,
        ..params()
    };

    let plan = plan_frame(&params, &mut cache);

    assert_eq!(plan.quads.len(), 1);
    assert_eq!(plan.quads[0].left_px, (1024.0 - 1000.0) / 4.0);
    assert_eq!(plan.quads[0].right_px, 6.0 + 256.0);
}

#[test]
fn quads_map_pixels_to_clip_space() {
    let quad = TileQuad {
        address: tile(0),
        left_px: 0.0,
        right_px: 300.0,
    };
    assert_eq!(
        tile_quad_gpu(&quad, 600),
        TileQuadGpu {
            left: -1.0,
            right: 0.0
        }
    );
}

#[test]
fn frame_uniform_carries_power_range_and_frequency_view() {
    let params = RenderParams {
        zoom_y: 4.0,
        scroll_offset_y_norm: 0.5,
        power_min: -80.0,
        power_max: -20.0,
        ..params()
    };
    let uniform = frame_uniform(&params, DEFAULT_BACKGROUND);
    assert_eq!(uniform.power_min, -80.0);
    assert_eq!(uniform.power_max, -20.0);
    assert_eq!(uniform.zoom_y, 4.0);
    assert_eq!(uniform.y_offset, 0.5);
    assert_eq!(uniform.background, DEFAULT_BACKGROUND);
}

#[test]
fn gpu_structs_match_wgsl_layout() {
    assert_eq!(std::mem::size_of::<FrameUniformGpu>(), 32);
    assert_eq!(std::mem::size_of::<TileQuadGpu>(), 8);
}

#[test]
fn float_filtering_follows_device_features() {
    assert_eq!(
        TileFiltering::for_features(wgpu::Features::FLOAT32_FILTERABLE),
        TileFiltering::Linear
    );
    assert_eq!(
        TileFiltering::for_features(wgpu::Features::empty()),
        TileFiltering::Nearest
    );
}

fn create_device_queue() -> (wgpu::Device, wgpu::Queue) {
    pollster::block_on(async {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::LowPower,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .expect("request test adapter");
        adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("renderer.test_device"),
                required_features: adapter.features() & wgpu::Features::FLOAT32_FILTERABLE,
                required_limits: adapter.limits(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .expect("request test device")
    })
}

fn create_target(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("renderer.test.target"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8Unorm,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

fn rgba8_texture_readback(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    width: u32,
    height: u32,
) -> (Vec<u8>, u32) {
    // wgpu requires bytes_per_row to be a multiple of 256 for texture copies to buffers.
    let padded_bytes_per_row = (width * 4).div_ceil(256) * 256;
    let readback = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("renderer.test.readback"),
        size: u64::from(padded_bytes_per_row) * u64::from(height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("renderer.test.readback_encoder"),
    });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &readback,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    queue.submit(Some(encoder.finish()));

    let (sender, receiver) = std::sync::mpsc::channel();
    readback
        .slice(..)
        .map_async(wgpu::MapMode::Read, move |result| {
            sender.send(result).expect("send map result");
        });
    device
        .poll(wgpu::PollType::wait_indefinitely())
        .expect("device poll must succeed for readback mapping");
    receiver
        .recv()
        .expect("receive map result")
        .expect("map readback buffer");
    let mapped = readback.slice(..).get_mapped_range();
    let bytes = mapped.to_vec();
    drop(mapped);
    readback.unmap();
    (bytes, padded_bytes_per_row)
}

fn pixel(bytes: &[u8], bytes_per_row: u32, x: u32, y: u32) -> [u8; 4] {
    let offset = (y * bytes_per_row + x * 4) as usize;
    [
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ]
}

fn assert_close(actual: [u8; 4], expected: [u8; 4]) {
    for (a, e) in actual.iter().zip(expected) {
        assert!(
            a.abs_diff(e) <= 1,
            "pixel {actual:?} differs from {expected:?}"
        );
    }
}

#[test]
#[ignore = "needs a GPU adapter; run explicitly"]
fn render_draws_cached_tile_and_background_elsewhere() {
    let (device, queue) = create_device_queue();
    let mut renderer = Renderer::new(
        device.clone(),
        queue.clone(),
        wgpu::TextureFormat::Rgba8Unorm,
        RendererConfig::default(),
        TileCacheConfig::default(),
    )
    .expect("create renderer");

    let width = 64;
    let height = 16;
    let params = RenderParams {
        fft_size: 8,
        total_samples: 10_000,
        viewport_width: width,
        viewport_height: height,
        ..params()
    };
    // 32 rows at full power cover the left half of the viewport.
    let address = TileAddress::for_index(0, 8, 1);
    renderer
        .upload_tile(address, vec![0.0; 8 * 32])
        .expect("upload tile");
    assert!(renderer.has_tile(&address));

    let target = create_target(&device, width, height);
    let view = target.create_view(&wgpu::TextureViewDescriptor::default());
    let report = renderer.render(&params, &view);
    assert_eq!(report.drawn_tiles, 1);

    let (bytes, bytes_per_row) = rgba8_texture_readback(&device, &queue, &target, width, height);
    assert_close(pixel(&bytes, bytes_per_row, 10, 8), [255, 255, 255, 255]);
    assert_close(pixel(&bytes, bytes_per_row, 50, 8), [5, 9, 15, 255]);
}

#[test]
#[ignore = "needs a GPU adapter; run explicitly"]
fn rejected_uploads_never_register_a_tile() {
    let (device, queue) = create_device_queue();
    let max = device.limits().max_texture_dimension_2d;
    let mut renderer = Renderer::new(
        device,
        queue,
        wgpu::TextureFormat::Rgba8Unorm,
        RendererConfig::default(),
        TileCacheConfig::default(),
    )
    .expect("create renderer");

    let empty = TileAddress::for_index(0, 16, 1);
    assert!(matches!(
        renderer.upload_tile(empty, Vec::new()),
        Err(TileUploadError::Decode(tiles::TileDecodeError::Empty))
    ));
    assert!(!renderer.has_tile(&empty));

    let oversized = TileAddress::for_index(0, max + 1, 1);
    assert!(matches!(
        renderer.upload_tile(oversized, vec![0.0; (max + 1) as usize]),
        Err(TileUploadError::FftSizeExceedsDeviceLimit { .. })
    ));
    assert_eq!(renderer.cached_tile_count(), 0);

    renderer
        .upload_tile(empty, vec![-50.0; 16 * 4])
        .expect("upload tile");
    assert_eq!(renderer.clear_tiles(), 1);
    assert!(!renderer.has_tile(&empty));
}
