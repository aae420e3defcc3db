use anyhow::{Context, Result};
use clap::Parser;
use glam::IVec2;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;
use wallcast_present::{PipelineDriver, VulkanContext};
use wallcast_raster::{Rasterizer, Texture};
use wallcast_scene::{CameraPose, Scene};
use winit::application::ApplicationHandler;
use winit::dpi::PhysicalSize;
use winit::event::{ElementState, KeyEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

#[derive(Parser)]
#[command(name = "wallcast-desktop", about = "Wallcast desktop application")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Wall texture (128x128 PNG)
    #[arg(long, default_value = "res/t0.png")]
    texture: PathBuf,

    /// Treat the texture's alpha channel as meaningful
    #[arg(long)]
    alpha: bool,

    /// Window width in pixels
    #[arg(long, default_value_t = 800)]
    width: u32,

    /// Window height in pixels
    #[arg(long, default_value_t = 600)]
    height: u32,
}

/// A slow orbit around the demo scene so every wall face comes into view.
fn orbit_pose(elapsed: f32) -> CameraPose {
    let x = (elapsed.sin() * 180.0) as i32;
    let y = -260 + ((elapsed * 0.31).cos() * 60.0) as i32;
    let elev = 60 + ((elapsed * 0.7).sin() * 40.0) as i32;
    CameraPose::new(IVec2::new(x, y), elev)
}

struct WallcastApp {
    cli: Cli,
    window: Option<Window>,
    driver: Option<PipelineDriver>,
    started: Instant,
    fatal: Option<anyhow::Error>,
}

impl WallcastApp {
    fn new(cli: Cli) -> Self {
        Self {
            cli,
            window: None,
            driver: None,
            started: Instant::now(),
            fatal: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title("Wallcast")
            .with_inner_size(PhysicalSize::new(self.cli.width, self.cli.height))
            .with_resizable(false);
        let window = event_loop
            .create_window(attrs)
            .context("create window")?;

        let texture = Texture::load(&self.cli.texture, self.cli.alpha)
            .with_context(|| format!("load texture {}", self.cli.texture.display()))?;
        let rasterizer = Rasterizer::new(texture);

        let size = window.inner_size();
        let ctx = VulkanContext::new(&window, size.width.max(1), size.height.max(1))
            .context("vulkan setup")?;
        let driver =
            PipelineDriver::new(ctx, rasterizer, Scene::demo()).context("frame ring setup")?;

        self.started = Instant::now();
        self.window = Some(window);
        self.driver = Some(driver);
        Ok(())
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        tracing::error!("{err:#}");
        self.fatal = Some(err);
        event_loop.exit();
    }
}

impl ApplicationHandler for WallcastApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e);
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Escape),
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => {
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                let Some(driver) = &mut self.driver else {
                    return;
                };
                let pose = orbit_pose(self.started.elapsed().as_secs_f32());
                if let Err(e) = driver.frame(pose) {
                    self.fail(event_loop, anyhow::Error::from(e).context("frame failed"));
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    tracing::info!("wallcast-desktop starting");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = WallcastApp::new(cli);
    event_loop.run_app(&mut app)?;

    match app.fatal {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
