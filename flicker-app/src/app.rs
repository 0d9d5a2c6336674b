use ab_glyph::FontArc;
use anyhow::{Context, Result, anyhow};
use flicker_core::StandardPhase;
use flicker_experiment::{
    ExperimentConfig, ExperimentSession, InteractionMonitor, SessionEvent, TrialSpec, UiMode,
};
use flicker_render::SkiaRenderer;
use flicker_timing::{HighPrecisionTimer, Timer};
use pixels::{Pixels, SurfaceTexture};
use std::collections::BTreeSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Fullscreen, Window, WindowId},
};

const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

pub struct App {
    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    renderer: Option<SkiaRenderer>,
    session: ExperimentSession<StandardPhase, HighPrecisionTimer>,
    monitor: InteractionMonitor,
    font: FontArc,
    stimulus_size: (u32, u32),
    image_bytes: Vec<(String, Vec<u8>)>,
    cursor: (f64, f64),
    output: PathBuf,
    windowed: bool,
    exported: bool,
    should_exit: bool,
}

impl App {
    pub fn new(
        config: ExperimentConfig,
        trial_list: Vec<TrialSpec>,
        images_dir: &Path,
        font_path: Option<&Path>,
        output: PathBuf,
        windowed: bool,
    ) -> Result<Self> {
        let font = load_font(font_path)?;
        let stimulus_size = (config.stimulus_width, config.stimulus_height);
        let image_bytes = load_image_bytes(&config, &trial_list, images_dir)?;
        let timer = HighPrecisionTimer::new();
        // The real layout arrives with the window; no trial starts before it.
        let session = ExperimentSession::new(
            config,
            trial_list,
            flicker_core::SurfaceLayout::new(),
            timer,
        )?;
        let monitor = InteractionMonitor::new(if windowed {
            UiMode::Windowed
        } else {
            UiMode::Fullscreen
        });

        Ok(Self {
            window: None,
            pixels: None,
            renderer: None,
            session,
            monitor,
            font,
            stimulus_size,
            image_bytes,
            cursor: (0.0, 0.0),
            output,
            windowed,
            exported: false,
            should_exit: false,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        info!(platform = std::env::consts::OS, arch = std::env::consts::ARCH,
              "flicker change-detection runner starting");
        info!("press SPACE to advance, click to respond, ESC to abort");
        event_loop.run_app(&mut self)?;
        Ok(())
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let primary_monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .ok_or_else(|| anyhow!("no monitor available"))?;

        let mut attributes = Window::default_attributes()
            .with_title("Flicker Change Detection")
            .with_resizable(false);
        if !self.windowed {
            attributes = attributes
                .with_fullscreen(Some(Fullscreen::Borderless(Some(primary_monitor.clone()))));
        }

        let window = Arc::new(event_loop.create_window(attributes)?);
        let size = window.inner_size();
        if let Some(rate) = primary_monitor.refresh_rate_millihertz() {
            info!(
                width = size.width,
                height = size.height,
                refresh_hz = rate as f64 / 1000.0,
                "display configured"
            );
        }

        let surface_texture = SurfaceTexture::new(size.width, size.height, window.clone());
        self.pixels = Some(Pixels::new(size.width, size.height, surface_texture)?);

        let mut renderer = SkiaRenderer::new(
            size.width,
            size.height,
            self.stimulus_size,
            self.font.clone(),
        )?;
        for (name, bytes) in &self.image_bytes {
            renderer.load_image(name, bytes)?;
        }
        info!(images = self.image_bytes.len(), "stimulus images decoded");
        self.session.set_layout(renderer.layout());
        self.renderer = Some(renderer);

        // The cursor stays visible: responses are clicks.
        window.set_cursor_visible(true);
        window.request_redraw();
        self.window = Some(window);
        Ok(())
    }

    fn render(&mut self) -> Result<()> {
        let (Some(pixels), Some(renderer)) = (self.pixels.as_mut(), self.renderer.as_mut()) else {
            return Ok(());
        };
        let frame_start = self.session.timer.now();
        renderer.render_frame(
            &self.session.phase,
            self.session.stage(),
            self.session.visible_stimulus(),
            self.session.prompt(),
            self.session.progress(),
            self.session.summary(),
            pixels.frame_mut(),
        )?;
        pixels.render()?;
        self.session.timer.record_frame(self.session.timer.elapsed(frame_start));
        Ok(())
    }

    fn update(&mut self) -> Result<()> {
        let events = self.session.update()?;
        for event in events {
            self.session.handle_event(event);
        }
        if self.session.is_finished() {
            self.export_results();
            self.should_exit = true;
        }
        Ok(())
    }

    fn handle_key(&mut self, key: winit::keyboard::PhysicalKey, event_loop: &ActiveEventLoop) {
        use winit::keyboard::{KeyCode, PhysicalKey};
        if let PhysicalKey::Code(code) = key {
            match code {
                KeyCode::Space => {
                    self.session.handle_event(SessionEvent::Advance);
                }
                KeyCode::Escape => {
                    self.session.handle_event(SessionEvent::Abort);
                    self.cleanup_and_exit(event_loop);
                }
                _ => {}
            }
        }
    }

    fn handle_click(&mut self) {
        let Some(pixels) = self.pixels.as_ref() else {
            return;
        };
        let (x, y) = pixels
            .window_pos_to_pixel((self.cursor.0 as f32, self.cursor.1 as f32))
            .unwrap_or_else(|pos| pixels.clamp_pixel_pos(pos));
        self.session.handle_event(SessionEvent::Click {
            x: x as f64,
            y: y as f64,
        });
    }

    fn handle_resize(&mut self, new_size: PhysicalSize<u32>) {
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        if let Some(pixels) = &mut self.pixels {
            if let Err(e) = pixels.resize_surface(new_size.width, new_size.height) {
                warn!("failed to resize surface: {e}");
            }
            if let Err(e) = pixels.resize_buffer(new_size.width, new_size.height) {
                warn!("failed to resize buffer: {e}");
            }
        }
        if let Some(renderer) = &mut self.renderer {
            if let Err(e) = renderer.resize(new_size.width, new_size.height) {
                warn!("failed to resize canvas: {e}");
                return;
            }
            self.session.set_layout(renderer.layout());
        }
        info!(width = new_size.width, height = new_size.height, "display resized");
    }

    fn export_results(&mut self) {
        if self.exported {
            return;
        }
        let result = File::create(&self.output)
            .map_err(anyhow::Error::from)
            .and_then(|file| {
                self.session
                    .export_json(self.monitor.events(), file)
                    .map_err(anyhow::Error::from)
            });
        match result {
            Ok(()) => {
                self.exported = true;
                info!(output = %self.output.display(), trials = self.session.results().len(),
                      "results written");
            }
            Err(e) => error!("failed to write results: {e:#}"),
        }
    }

    fn cleanup_and_exit(&mut self, event_loop: &ActiveEventLoop) {
        self.export_results();
        if let Some(window) = &self.window {
            window.set_cursor_visible(true);
        }
        info!("session ended");
        self.should_exit = true;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(e) = self.create_window_and_surface(event_loop) {
                error!("failed to create window and surface: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.session.handle_event(SessionEvent::Abort);
                self.cleanup_and_exit(event_loop);
            }
            WindowEvent::RedrawRequested => {
                if let Err(e) = self.render().and_then(|_| self.update()) {
                    error!("frame failed: {e:#}");
                    self.cleanup_and_exit(event_loop);
                    return;
                }
                if self.should_exit {
                    event_loop.exit();
                } else if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() => {
                self.handle_key(event.physical_key, event_loop);
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = (position.x, position.y);
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => self.handle_click(),
            WindowEvent::Focused(gained) => {
                let now_ns = self.session.timer.now();
                self.monitor.record_focus(gained, now_ns);
            }
            WindowEvent::Resized(size) => self.handle_resize(size),
            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(window) = &self.window {
                    self.handle_resize(window.inner_size());
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_exit {
            event_loop.exit();
        }
    }
}

fn load_font(font_path: Option<&Path>) -> Result<FontArc> {
    let path = match font_path {
        Some(path) => path.to_path_buf(),
        None => FONT_CANDIDATES
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
            .ok_or_else(|| anyhow!("no system font found; pass one with --font"))?,
    };
    let bytes =
        std::fs::read(&path).with_context(|| format!("failed to read font {}", path.display()))?;
    FontArc::try_from_vec(bytes).with_context(|| format!("failed to parse font {}", path.display()))
}

/// Reads every image the session can show: both scenes of every trial, the
/// mask set, and the demonstration pair. A missing file fails before the
/// window opens.
fn load_image_bytes(
    config: &ExperimentConfig,
    trial_list: &[TrialSpec],
    images_dir: &Path,
) -> Result<Vec<(String, Vec<u8>)>> {
    let mut names = BTreeSet::new();
    for spec in trial_list {
        names.insert(spec.first.clone());
        names.insert(spec.second.clone());
    }
    names.extend(config.masks.iter().cloned());
    names.insert(config.example_first.clone());
    names.insert(config.example_second.clone());

    names
        .into_iter()
        .map(|name| {
            let path = images_dir.join(&name);
            let bytes = std::fs::read(&path)
                .with_context(|| format!("failed to read stimulus image {}", path.display()))?;
            Ok((name, bytes))
        })
        .collect()
}
