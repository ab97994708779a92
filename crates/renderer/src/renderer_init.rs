//! Renderer initialization and GPU resource construction.
//!
//! This module owns `Renderer::new` and the helpers that allocate the pipeline,
//! bind groups, the colour table texture and the tile quad buffer.

use colormap::{COLOR_MAP_SIZE, ColorMap, ColorMapKind};
use tiles::{TileCache, TileCacheConfig};

use crate::{
    CacheState, FrameUniformGpu, GpuState, INITIAL_TILE_QUAD_CAPACITY, Renderer, RendererConfig,
    RendererInitError, TileFiltering, TileQuadGpu,
};

impl Renderer {
    /// Builds the renderer for targets of `target_format`.
    ///
    /// Linear tile filtering is used only when `device` was created with
    /// `Features::FLOAT32_FILTERABLE`.
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        target_format: wgpu::TextureFormat,
        config: RendererConfig,
        cache_config: TileCacheConfig,
    ) -> Result<Self, RendererInitError> {
        let tile_filtering = TileFiltering::for_features(device.features());

        let shader_scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("renderer.spectrogram"),
            source: wgpu::ShaderSource::Wgsl(include_str!("spectrogram.wgsl").into()),
        });
        if let Some(error) = pollster::block_on(shader_scope.pop()) {
            tracing::error!(%error, "spectrogram shader failed validation");
            return Err(RendererInitError::Shader(error.to_string()));
        }

        let frame_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("renderer.frame_layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::VERTEX,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Storage { read_only: true },
                            has_dynamic_offset: false,
                            min_binding_size: None,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: false },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                ],
            });

        let tile_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("renderer.tile_layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float {
                                filterable: tile_filtering.is_filterable(),
                            },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(if tile_filtering.is_filterable() {
                            wgpu::SamplerBindingType::Filtering
                        } else {
                            wgpu::SamplerBindingType::NonFiltering
                        }),
                        count: None,
                    },
                ],
            });

        let tile_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("renderer.tile_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: tile_filtering.filter_mode(),
            min_filter: tile_filtering.filter_mode(),
            ..Default::default()
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("renderer.spectrogram_layout"),
            bind_group_layouts: &[&frame_bind_group_layout, &tile_bind_group_layout],
            immediate_size: 0,
        });

        let pipeline_scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("renderer.spectrogram_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });
        if let Some(error) = pollster::block_on(pipeline_scope.pop()) {
            tracing::error!(%error, ?target_format, "spectrogram pipeline failed validation");
            return Err(RendererInitError::Pipeline(error.to_string()));
        }

        let frame_uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("renderer.frame_uniform"),
            size: std::mem::size_of::<FrameUniformGpu>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let color_map_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("renderer.color_map"),
            size: wgpu::Extent3d {
                width: COLOR_MAP_SIZE as u32,
                height: 1,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        write_color_map(&queue, &color_map_texture, &ColorMap::new(config.color_map));
        let color_map_view = color_map_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let tile_quad_buffer = Self::create_tile_quad_buffer(&device, INITIAL_TILE_QUAD_CAPACITY);
        let frame_bind_group = Self::create_frame_bind_group(
            &device,
            &frame_bind_group_layout,
            &frame_uniform_buffer,
            &tile_quad_buffer,
            &color_map_view,
        );

        tracing::info!(
            ?target_format,
            ?tile_filtering,
            max_texture_dimension = device.limits().max_texture_dimension_2d,
            "spectrogram renderer initialised"
        );

        Ok(Self {
            gpu_state: GpuState {
                device,
                queue,
                target_format,
                pipeline,
                frame_bind_group_layout,
                frame_bind_group,
                tile_bind_group_layout,
                tile_sampler,
                tile_filtering,
                frame_uniform_buffer,
                color_map_texture,
                color_map_view,
                tile_quad_buffer,
                tile_quad_capacity: INITIAL_TILE_QUAD_CAPACITY,
                tile_quad_staging: Vec::with_capacity(INITIAL_TILE_QUAD_CAPACITY),
            },
            cache_state: CacheState {
                tiles: TileCache::new(cache_config),
            },
            config,
        })
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn target_format(&self) -> wgpu::TextureFormat {
        self.gpu_state.target_format
    }

    pub fn tile_filtering(&self) -> TileFiltering {
        self.gpu_state.tile_filtering
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.gpu_state.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.gpu_state.queue
    }

    /// Rewrites the colour table in place. Cached tiles are unaffected.
    pub fn set_color_map(&mut self, kind: ColorMapKind) {
        if self.config.color_map == kind {
            return;
        }
        write_color_map(
            &self.gpu_state.queue,
            &self.gpu_state.color_map_texture,
            &ColorMap::new(kind),
        );
        self.config.color_map = kind;
    }

    pub(super) fn create_tile_quad_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
        let quad_size = std::mem::size_of::<TileQuadGpu>() as u64;
        let capacity_u64 = u64::try_from(capacity).expect("tile quad capacity exceeds u64");
        let size = capacity_u64
            .checked_mul(quad_size)
            .expect("tile quad buffer size overflow");
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("renderer.tile_quads"),
            size,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    pub(super) fn create_frame_bind_group(
        device: &wgpu::Device,
        frame_bind_group_layout: &wgpu::BindGroupLayout,
        frame_uniform_buffer: &wgpu::Buffer,
        tile_quad_buffer: &wgpu::Buffer,
        color_map_view: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("renderer.frame_bind_group"),
            layout: frame_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: frame_uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: tile_quad_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(color_map_view),
                },
            ],
        })
    }

    pub(super) fn ensure_tile_quad_capacity(&mut self, required_len: usize) {
        if required_len <= self.gpu_state.tile_quad_capacity {
            return;
        }

        let required_capacity = required_len.max(INITIAL_TILE_QUAD_CAPACITY);
        let expanded_capacity = required_capacity
            .checked_next_power_of_two()
            .expect("tile quad capacity overflow");
        self.gpu_state.tile_quad_buffer =
            Self::create_tile_quad_buffer(&self.gpu_state.device, expanded_capacity);
        self.gpu_state.frame_bind_group = Self::create_frame_bind_group(
            &self.gpu_state.device,
            &self.gpu_state.frame_bind_group_layout,
            &self.gpu_state.frame_uniform_buffer,
            &self.gpu_state.tile_quad_buffer,
            &self.gpu_state.color_map_view,
        );
        self.gpu_state.tile_quad_capacity = expanded_capacity;
    }
}

fn write_color_map(queue: &wgpu::Queue, texture: &wgpu::Texture, color_map: &ColorMap) {
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        color_map.as_bytes(),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(COLOR_MAP_SIZE as u32 * 4),
            rows_per_image: Some(1),
        },
        wgpu::Extent3d {
            width: COLOR_MAP_SIZE as u32,
            height: 1,
            depth_or_array_layers: 1,
        },
    );
}
