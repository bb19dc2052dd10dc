#[macro_use]
mod print;

mod buffer;
mod model;
mod pipeline;
mod renderer;
mod texture;
mod util;
mod vulkan;
mod window;

use renderer::Renderer;
use winit::{
    application::ApplicationHandler,
    error::EventLoopError,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::WindowId,
};

const DEFAULT_MODEL: &str = "assets/models/viking_room.obj";
const DEFAULT_TEXTURE: &str = "assets/textures/viking_room.png";

struct App {
    model_path: String,
    texture_path: String,
    renderer: Option<Renderer>,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.renderer.is_none() {
            self.renderer = Some(Renderer::new(
                event_loop,
                &self.model_path,
                &self.texture_path,
            ));
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(_) => renderer.resized(),
            WindowEvent::RedrawRequested => {
                renderer.draw_frame();
                renderer.request_redraw();
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(renderer) = &self.renderer {
            renderer.wait_idle();
        }
    }
}

fn main() -> Result<(), EventLoopError> {
    let mut args = std::env::args().skip(1);
    let model_path = args.next().unwrap_or_else(|| DEFAULT_MODEL.into());
    let texture_path = args.next().unwrap_or_else(|| DEFAULT_TEXTURE.into());
    info!("Model: {model_path}, texture: {texture_path}");

    let event_loop = EventLoop::builder().build().unwrap();
    event_loop.set_control_flow(ControlFlow::Poll);
    event_loop.run_app(&mut App {
        model_path,
        texture_path,
        renderer: None,
    })
}
