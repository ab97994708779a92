//! Frame recording and presentation.

use render_protocol::RenderParams;

use crate::geometry::{frame_uniform, plan_frame, tile_quad_gpu};
use crate::{PresentError, Renderer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameReport {
    pub visible_tiles: usize,
    pub drawn_tiles: usize,
}

impl Renderer {
    /// Draws every cached visible tile into `target`, clearing it to the background first.
    ///
    /// `target` must have the format the renderer was created for and be
    /// `params.viewport_width` pixels wide.
    pub fn render(&mut self, params: &RenderParams, target: &wgpu::TextureView) -> FrameReport {
        let plan = plan_frame(params, &mut self.cache_state.tiles);

        self.gpu_state.queue.write_buffer(
            &self.gpu_state.frame_uniform_buffer,
            0,
            bytemuck::bytes_of(&frame_uniform(params, self.config.background)),
        );
        if !plan.quads.is_empty() {
            self.ensure_tile_quad_capacity(plan.quads.len());
            let staging = &mut self.gpu_state.tile_quad_staging;
            staging.clear();
            staging.extend(
                plan.quads
                    .iter()
                    .map(|quad| tile_quad_gpu(quad, params.viewport_width)),
            );
            self.gpu_state.queue.write_buffer(
                &self.gpu_state.tile_quad_buffer,
                0,
                bytemuck::cast_slice(staging),
            );
        }

        let [r, g, b, a] = self.config.background;
        let mut encoder =
            self.gpu_state
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("renderer.frame"),
                });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("renderer.spectrogram"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: f64::from(r),
                            g: f64::from(g),
                            b: f64::from(b),
                            a: f64::from(a),
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });
            if !plan.quads.is_empty() {
                pass.set_pipeline(&self.gpu_state.pipeline);
                pass.set_bind_group(0, &self.gpu_state.frame_bind_group, &[]);
                for (instance, quad) in plan.quads.iter().enumerate() {
                    let Some(tile) = self.cache_state.tiles.peek(&quad.address) else {
                        continue;
                    };
                    let instance = instance as u32;
                    pass.set_bind_group(1, &tile.bind_group, &[]);
                    pass.draw(0..6, instance..instance + 1);
                }
            }
        }
        self.gpu_state.queue.submit(Some(encoder.finish()));

        FrameReport {
            visible_tiles: plan.visible_tiles,
            drawn_tiles: plan.quads.len(),
        }
    }

    /// Renders into the surface's next texture and presents it.
    pub fn render_to_surface(
        &mut self,
        params: &RenderParams,
        surface: &wgpu::Surface<'_>,
    ) -> Result<FrameReport, PresentError> {
        let frame = surface
            .get_current_texture()
            .map_err(PresentError::Surface)?;
        let frame_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let report = self.render(params, &frame_view);
        frame.present();
        Ok(report)
    }
}
