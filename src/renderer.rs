use crate::buffer::*;
use crate::model::Model;
use crate::pipeline::Pipeline;
use crate::texture::*;
use crate::util::as_bytes;
use crate::vulkan::*;
use crate::window::WindowData;
use crate::*;
use ash::vk;
use glam::{Mat4, Vec3};
use std::time::Instant;
use winit::event_loop::ActiveEventLoop;

pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

#[repr(C)]
pub struct UniformBufferObject {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

/// Model spins around Z at 90 degrees per second, viewed from (2, 2, 2).
/// The projection Y axis is negated since Vulkan clip space points down.
pub fn build_ubo(elapsed_secs: f32, aspect: f32) -> UniformBufferObject {
    let mut proj = Mat4::perspective_rh(45f32.to_radians(), aspect, 0.1, 10.0);
    proj.y_axis.y *= -1.0;
    UniformBufferObject {
        model: Mat4::from_rotation_z(elapsed_secs * 90f32.to_radians()),
        view: Mat4::look_at_rh(Vec3::new(2.0, 2.0, 2.0), Vec3::ZERO, Vec3::Z),
        proj,
    }
}

struct FrameSync {
    image_available: vk::Semaphore,
    render_finished: vk::Semaphore,
    in_flight: vk::Fence,
}

impl FrameSync {
    fn new() -> Self {
        unsafe {
            Self {
                image_available: DEVICE
                    .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                    .unwrap(),
                render_finished: DEVICE
                    .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)
                    .unwrap(),
                // signaled so the first wait on each frame slot passes
                in_flight: DEVICE
                    .create_fence(
                        &vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED),
                        None,
                    )
                    .unwrap(),
            }
        }
    }
}

pub struct Renderer {
    window: WindowData,
    pipeline: Pipeline,
    command_pool: vk::CommandPool,
    texture: Texture,
    model: Model,

    color_image: vk::Image,
    color_memory: vk::DeviceMemory,
    color_view: vk::ImageView,
    depth_image: vk::Image,
    depth_memory: vk::DeviceMemory,
    depth_view: vk::ImageView,
    framebuffers: Vec<vk::Framebuffer>,
    uniform_buffers: Vec<(vk::Buffer, vk::DeviceMemory)>,
    descriptor_pool: vk::DescriptorPool,
    descriptor_sets: Vec<vk::DescriptorSet>,
    command_buffers: Vec<vk::CommandBuffer>,

    frames: Vec<FrameSync>,
    images_in_flight: Vec<vk::Fence>,
    current_frame: usize,
    framebuffer_resized: bool,
    start_time: Instant,
}

impl Renderer {
    pub fn new(event_loop: &ActiveEventLoop, model_path: &str, texture_path: &str) -> Self {
        let window = WindowData::new(event_loop);
        let pipeline = Pipeline::new(window.swapchain.format, "shaders");

        let command_pool = unsafe {
            DEVICE
                .create_command_pool(
                    &vk::CommandPoolCreateInfo::default()
                        .queue_family_index(*QUEUE_FAMILY_INDEX),
                    None,
                )
                .unwrap()
        };

        let texture = Texture::load(command_pool, texture_path);
        let model = Model::load(command_pool, model_path);

        let frames = (0..MAX_FRAMES_IN_FLIGHT).map(|_| FrameSync::new()).collect();
        let images_in_flight = vec![vk::Fence::null(); window.swapchain.images.len()];

        let mut slf = Self {
            window,
            pipeline,
            command_pool,
            texture,
            model,
            color_image: vk::Image::null(),
            color_memory: vk::DeviceMemory::null(),
            color_view: vk::ImageView::null(),
            depth_image: vk::Image::null(),
            depth_memory: vk::DeviceMemory::null(),
            depth_view: vk::ImageView::null(),
            framebuffers: Vec::new(),
            uniform_buffers: Vec::new(),
            descriptor_pool: vk::DescriptorPool::null(),
            descriptor_sets: Vec::new(),
            command_buffers: Vec::new(),
            frames,
            images_in_flight,
            current_frame: 0,
            framebuffer_resized: false,
            start_time: Instant::now(),
        };
        slf.create_swapchain_resources();
        slf
    }

    fn create_swapchain_resources(&mut self) {
        let extent = self.window.swapchain.extent;
        let color_format = self.window.swapchain.format;
        let depth_format = find_depth_format();
        let image_count = self.window.swapchain.images.len();

        let (color_image, color_memory) = create_image(
            extent.width,
            extent.height,
            1,
            *MSAA_SAMPLES,
            color_format,
            vk::ImageTiling::OPTIMAL,
            vk::ImageUsageFlags::TRANSIENT_ATTACHMENT | vk::ImageUsageFlags::COLOR_ATTACHMENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        );
        self.color_image = color_image;
        self.color_memory = color_memory;
        self.color_view = create_image_view(
            color_image,
            color_format,
            vk::ImageAspectFlags::COLOR,
            1,
        );

        let (depth_image, depth_memory) = create_image(
            extent.width,
            extent.height,
            1,
            *MSAA_SAMPLES,
            depth_format,
            vk::ImageTiling::OPTIMAL,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        );
        self.depth_image = depth_image;
        self.depth_memory = depth_memory;
        self.depth_view =
            create_image_view(depth_image, depth_format, vk::ImageAspectFlags::DEPTH, 1);
        transition_image_layout(
            self.command_pool,
            depth_image,
            if has_stencil_component(depth_format) {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            } else {
                vk::ImageAspectFlags::DEPTH
            },
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            1,
        );

        self.framebuffers = self
            .window
            .swapchain
            .image_views
            .iter()
            .map(|&swapchain_view| {
                let attachments = [self.color_view, self.depth_view, swapchain_view];
                unsafe {
                    DEVICE
                        .create_framebuffer(
                            &vk::FramebufferCreateInfo::default()
                                .render_pass(self.pipeline.render_pass)
                                .attachments(&attachments)
                                .width(extent.width)
                                .height(extent.height)
                                .layers(1),
                            None,
                        )
                        .unwrap()
                }
            })
            .collect();

        self.uniform_buffers = (0..image_count)
            .map(|_| {
                create_buffer(
                    size_of::<UniformBufferObject>() as vk::DeviceSize,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
                )
            })
            .collect();

        let pool_sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(image_count as u32),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(image_count as u32),
        ];
        self.descriptor_pool = unsafe {
            DEVICE
                .create_descriptor_pool(
                    &vk::DescriptorPoolCreateInfo::default()
                        .pool_sizes(&pool_sizes)
                        .max_sets(image_count as u32),
                    None,
                )
                .unwrap()
        };
        let set_layouts = vec![self.pipeline.descriptor_set_layout; image_count];
        self.descriptor_sets = unsafe {
            DEVICE
                .allocate_descriptor_sets(
                    &vk::DescriptorSetAllocateInfo::default()
                        .descriptor_pool(self.descriptor_pool)
                        .set_layouts(&set_layouts),
                )
                .unwrap()
        };
        for (&descriptor_set, &(uniform_buffer, _)) in
            self.descriptor_sets.iter().zip(&self.uniform_buffers)
        {
            let buffer_infos = [vk::DescriptorBufferInfo::default()
                .buffer(uniform_buffer)
                .range(size_of::<UniformBufferObject>() as vk::DeviceSize)];
            let image_infos = [vk::DescriptorImageInfo::default()
                .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .image_view(self.texture.view)
                .sampler(self.texture.sampler)];
            unsafe {
                DEVICE.update_descriptor_sets(
                    &[
                        vk::WriteDescriptorSet::default()
                            .dst_set(descriptor_set)
                            .dst_binding(0)
                            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                            .buffer_info(&buffer_infos),
                        vk::WriteDescriptorSet::default()
                            .dst_set(descriptor_set)
                            .dst_binding(1)
                            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                            .image_info(&image_infos),
                    ],
                    &[],
                );
            }
        }

        self.record_command_buffers();
    }

    fn record_command_buffers(&mut self) {
        let extent = self.window.swapchain.extent;
        self.command_buffers = unsafe {
            DEVICE
                .allocate_command_buffers(
                    &vk::CommandBufferAllocateInfo::default()
                        .command_pool(self.command_pool)
                        .level(vk::CommandBufferLevel::PRIMARY)
                        .command_buffer_count(self.framebuffers.len() as u32),
                )
                .unwrap()
        };

        for (i, &command_buffer) in self.command_buffers.iter().enumerate() {
            let clear_values = [
                vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: [0.0, 0.0, 0.0, 1.0],
                    },
                },
                vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: 1.0,
                        stencil: 0,
                    },
                },
                vk::ClearValue::default(),
            ];
            unsafe {
                DEVICE
                    .begin_command_buffer(
                        command_buffer,
                        &vk::CommandBufferBeginInfo::default(),
                    )
                    .unwrap();
                DEVICE.cmd_begin_render_pass(
                    command_buffer,
                    &vk::RenderPassBeginInfo::default()
                        .render_pass(self.pipeline.render_pass)
                        .framebuffer(self.framebuffers[i])
                        .render_area(vk::Rect2D {
                            offset: vk::Offset2D { x: 0, y: 0 },
                            extent,
                        })
                        .clear_values(&clear_values),
                    vk::SubpassContents::INLINE,
                );
                DEVICE.cmd_bind_pipeline(
                    command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    self.pipeline.pipeline,
                );
                DEVICE.cmd_set_viewport(
                    command_buffer,
                    0,
                    &[vk::Viewport {
                        x: 0.0,
                        y: 0.0,
                        width: extent.width as f32,
                        height: extent.height as f32,
                        min_depth: 0.0,
                        max_depth: 1.0,
                    }],
                );
                DEVICE.cmd_set_scissor(
                    command_buffer,
                    0,
                    &[vk::Rect2D {
                        offset: vk::Offset2D { x: 0, y: 0 },
                        extent,
                    }],
                );
                DEVICE.cmd_bind_vertex_buffers(
                    command_buffer,
                    0,
                    &[self.model.vertex_buffer],
                    &[0],
                );
                DEVICE.cmd_bind_index_buffer(
                    command_buffer,
                    self.model.index_buffer,
                    0,
                    vk::IndexType::UINT32,
                );
                DEVICE.cmd_bind_descriptor_sets(
                    command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    self.pipeline.layout,
                    0,
                    &[self.descriptor_sets[i]],
                    &[],
                );
                DEVICE.cmd_draw_indexed(command_buffer, self.model.index_count, 1, 0, 0, 0);
                DEVICE.cmd_end_render_pass(command_buffer);
                DEVICE.end_command_buffer(command_buffer).unwrap();
            }
        }
    }

    fn destroy_swapchain_resources(&mut self) {
        unsafe {
            DEVICE.free_command_buffers(self.command_pool, &self.command_buffers);
            self.command_buffers.clear();
            self.descriptor_sets.clear();
            DEVICE.destroy_descriptor_pool(self.descriptor_pool, None);
            self.descriptor_pool = vk::DescriptorPool::null();
            for (uniform_buffer, uniform_memory) in self.uniform_buffers.drain(..) {
                DEVICE.destroy_buffer(uniform_buffer, None);
                DEVICE.free_memory(uniform_memory, None);
            }
            for framebuffer in self.framebuffers.drain(..) {
                DEVICE.destroy_framebuffer(framebuffer, None);
            }
            DEVICE.destroy_image_view(self.depth_view, None);
            DEVICE.destroy_image(self.depth_image, None);
            DEVICE.free_memory(self.depth_memory, None);
            DEVICE.destroy_image_view(self.color_view, None);
            DEVICE.destroy_image(self.color_image, None);
            DEVICE.free_memory(self.color_memory, None);
        }
    }

    fn update_uniform_buffer(&self, image_index: usize) {
        let extent = self.window.swapchain.extent;
        let ubo = build_ubo(
            self.start_time.elapsed().as_secs_f32(),
            extent.width as f32 / extent.height as f32,
        );
        let (_, uniform_memory) = self.uniform_buffers[image_index];
        unsafe {
            let data = DEVICE
                .map_memory(
                    uniform_memory,
                    0,
                    size_of::<UniformBufferObject>() as vk::DeviceSize,
                    vk::MemoryMapFlags::empty(),
                )
                .unwrap();
            let bytes = as_bytes(&ubo);
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), data as *mut u8, bytes.len());
            DEVICE.unmap_memory(uniform_memory);
        }
    }

    pub fn resized(&mut self) {
        self.framebuffer_resized = true;
    }

    pub fn request_redraw(&self) {
        self.window.window.request_redraw();
    }

    pub fn draw_frame(&mut self) {
        if self.window.width() == 0 || self.window.height() == 0 {
            return;
        }
        let image_available = self.frames[self.current_frame].image_available;
        let render_finished = self.frames[self.current_frame].render_finished;
        let in_flight = self.frames[self.current_frame].in_flight;

        unsafe {
            DEVICE
                .wait_for_fences(&[in_flight], true, u64::MAX)
                .unwrap();
        }

        let image_index = match unsafe {
            SWAPCHAIN_LOADER.acquire_next_image(
                *self.window.swapchain,
                u64::MAX,
                image_available,
                vk::Fence::null(),
            )
        } {
            Ok((image_index, _suboptimal)) => image_index as usize,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.recreate_swapchain();
                return;
            }
            Err(e) => fatal!("Failed to acquire swapchain image: {e}"),
        };

        // a previous frame may still be rendering into this image
        if self.images_in_flight[image_index] != vk::Fence::null() {
            unsafe {
                DEVICE
                    .wait_for_fences(&[self.images_in_flight[image_index]], true, u64::MAX)
                    .unwrap();
            }
        }
        self.images_in_flight[image_index] = in_flight;

        self.update_uniform_buffer(image_index);

        let wait_semaphores = [image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.command_buffers[image_index]];
        let signal_semaphores = [render_finished];
        unsafe {
            DEVICE.reset_fences(&[in_flight]).unwrap();
            DEVICE
                .queue_submit(
                    *QUEUE,
                    &[vk::SubmitInfo::default()
                        .wait_semaphores(&wait_semaphores)
                        .wait_dst_stage_mask(&wait_stages)
                        .command_buffers(&command_buffers)
                        .signal_semaphores(&signal_semaphores)],
                    in_flight,
                )
                .unwrap();
        }

        let swapchains = [*self.window.swapchain];
        let image_indices = [image_index as u32];
        let present_result = unsafe {
            SWAPCHAIN_LOADER.queue_present(
                *QUEUE,
                &vk::PresentInfoKHR::default()
                    .wait_semaphores(&signal_semaphores)
                    .swapchains(&swapchains)
                    .image_indices(&image_indices),
            )
        };
        let needs_recreate = match present_result {
            Ok(suboptimal) => suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => true,
            Err(e) => fatal!("Failed to present swapchain image: {e}"),
        };
        if needs_recreate || self.framebuffer_resized {
            self.framebuffer_resized = false;
            self.recreate_swapchain();
        }

        self.current_frame = (self.current_frame + 1) % MAX_FRAMES_IN_FLIGHT;
    }

    /// Rebuilds the swapchain and everything sized to it. Waits for the GPU to
    /// drain first. Does nothing while the window is minimized.
    fn recreate_swapchain(&mut self) {
        if self.window.width() == 0 || self.window.height() == 0 {
            return;
        }
        self.wait_idle();

        self.destroy_swapchain_resources();
        self.window.recreate_swapchain();
        self.images_in_flight = vec![vk::Fence::null(); self.window.swapchain.images.len()];
        self.create_swapchain_resources();
        log!(
            "Swapchain recreated at {}x{}",
            self.window.swapchain.extent.width,
            self.window.swapchain.extent.height
        );
    }

    pub fn wait_idle(&self) {
        unsafe { DEVICE.device_wait_idle().unwrap() };
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.wait_idle();
        self.destroy_swapchain_resources();
        unsafe {
            for frame in &self.frames {
                DEVICE.destroy_semaphore(frame.image_available, None);
                DEVICE.destroy_semaphore(frame.render_finished, None);
                DEVICE.destroy_fence(frame.in_flight, None);
            }
            DEVICE.destroy_command_pool(self.command_pool, None);
        }
        self.window.swapchain.destroy();
        unsafe { SURFACE_LOADER.destroy_surface(self.window.surface, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn projection_y_axis_is_flipped() {
        let ubo = build_ubo(0.0, 4.0 / 3.0);
        assert!(ubo.proj.y_axis.y < 0.0);
    }

    #[test]
    fn model_starts_unrotated() {
        let ubo = build_ubo(0.0, 1.0);
        assert!(ubo.model.abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    #[test]
    fn model_rotates_quarter_turn_per_second() {
        let ubo = build_ubo(1.0, 1.0);
        let expected = Mat4::from_rotation_z(90f32.to_radians());
        assert!(ubo.model.abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn view_looks_at_origin() {
        let ubo = build_ubo(0.0, 1.0);
        let eye = ubo.view.transform_point3(Vec3::new(2.0, 2.0, 2.0));
        assert!(eye.abs_diff_eq(Vec3::ZERO, 1e-5));
        // the target sits straight ahead, along -Z in view space
        let target = ubo.view.transform_point3(Vec3::ZERO);
        assert!(target.abs_diff_eq(Vec3::new(0.0, 0.0, -(12f32.sqrt())), 1e-5));
    }
}
