use tiles::{TileAddress, TilePowers};

use crate::{GpuTile, Renderer, TileUploadError};

impl Renderer {
    /// Decodes `values` and caches them as the texture for `address`.
    ///
    /// On any error nothing is cached for `address`; a previously cached tile at the
    /// same address is kept.
    pub fn upload_tile(
        &mut self,
        address: TileAddress,
        values: Vec<f32>,
    ) -> Result<(), TileUploadError> {
        let powers = TilePowers::decode(values, address.fft_size)?;
        self.upload_tile_powers(address, &powers)
    }

    pub fn upload_tile_powers(
        &mut self,
        address: TileAddress,
        powers: &TilePowers,
    ) -> Result<(), TileUploadError> {
        let device = &self.gpu_state.device;
        let max = device.limits().max_texture_dimension_2d;
        if powers.fft_size() > max {
            return Err(TileUploadError::FftSizeExceedsDeviceLimit {
                fft_size: powers.fft_size(),
                max,
            });
        }
        if powers.rows() > max {
            return Err(TileUploadError::RowsExceedDeviceLimit {
                rows: powers.rows(),
                max,
            });
        }

        let size = wgpu::Extent3d {
            width: powers.fft_size(),
            height: powers.rows(),
            depth_or_array_layers: 1,
        };
        let error_scope = device.push_error_scope(wgpu::ErrorFilter::Validation);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("renderer.tile_powers"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::R32Float,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.gpu_state.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(powers.values()),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(powers.fft_size() * 4),
                rows_per_image: Some(powers.rows()),
            },
            size,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("renderer.tile_bind_group"),
            layout: &self.gpu_state.tile_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.gpu_state.tile_sampler),
                },
            ],
        });
        if let Some(error) = pollster::block_on(error_scope.pop()) {
            texture.destroy();
            return Err(TileUploadError::Validation(error.to_string()));
        }

        self.cache_state.tiles.put(
            address,
            GpuTile {
                texture,
                bind_group,
                rows: powers.rows(),
                released: false,
            },
        );
        Ok(())
    }

    pub fn has_tile(&self, address: &TileAddress) -> bool {
        self.cache_state.tiles.contains(address)
    }

    pub fn cached_tile_count(&self) -> usize {
        self.cache_state.tiles.len()
    }

    /// Drops every cached tile, for when the source behind the addresses changes.
    pub fn clear_tiles(&mut self) -> usize {
        let cleared = self.cache_state.tiles.clear();
        tracing::info!(cleared, "tile cache cleared");
        cleared
    }
}
