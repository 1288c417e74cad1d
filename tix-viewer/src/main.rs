//! TIX session viewer entry point.
//!
//! ```text
//! tix-viewer                                 Connect with config defaults
//! tix-viewer --server 10.0.0.5 -r 1280x720   Override connection fields
//! tix-viewer --config <path>                 Use custom config TOML
//! tix-viewer --gen-config                    Dump default config and exit
//! tix-viewer --write-config                  Write default config to --config
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tix_bridge::parse_resolution;
use tix_viewer::config::{ConfigSource, ViewerConfig};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "tix-viewer", about = "TIX remote session viewer")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "tix-viewer.toml")]
    config: PathBuf,

    /// Remote host (overrides config).
    #[arg(short, long)]
    server: Option<String>,

    /// Remote port (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    #[arg(short, long)]
    username: Option<String>,

    #[arg(long)]
    password: Option<String>,

    /// Desktop size, e.g. 1280x720 (overrides config).
    #[arg(short, long)]
    resolution: Option<String>,

    /// Bits per pixel: 16, 24 or 32 (overrides config).
    #[arg(long)]
    color_depth: Option<u32>,

    /// Bridge library path (overrides config).
    #[arg(long)]
    bridge: Option<PathBuf>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Write the default configuration to the --config path and exit.
    #[arg(long)]
    write_config: bool,
}

impl Cli {
    fn apply(self, config: &mut ViewerConfig) -> Result<(), Box<dyn std::error::Error>> {
        let conn = &mut config.connection;
        if let Some(server) = self.server {
            conn.server = server;
        }
        if let Some(port) = self.port {
            conn.port = port;
        }
        if let Some(username) = self.username {
            conn.username = username;
        }
        if let Some(password) = self.password {
            conn.password = password;
        }
        if let Some(text) = self.resolution {
            (conn.width, conn.height) = parse_resolution(&text)?;
        }
        if let Some(depth) = self.color_depth {
            conn.color_depth = depth;
        }
        if let Some(path) = self.bridge {
            config.bridge.library_path = path;
        }
        Ok(())
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ViewerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    if cli.write_config {
        ViewerConfig::write_default(&cli.config)?;
        println!("wrote {}", cli.config.display());
        return Ok(());
    }

    let config_path = cli.config.clone();
    let (mut config, source) = ViewerConfig::load(&config_path);
    cli.apply(&mut config)?;

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("tix-viewer v{}", env!("CARGO_PKG_VERSION"));
    match source {
        ConfigSource::File => info!("config loaded from {}", config_path.display()),
        ConfigSource::Missing => info!("no config at {}; using defaults", config_path.display()),
        ConfigSource::Invalid(e) => {
            warn!("invalid config {}: {e}; using defaults", config_path.display())
        }
    }

    run(config).await
}

#[cfg(target_os = "windows")]
async fn run(config: ViewerConfig) -> Result<(), Box<dyn std::error::Error>> {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use tix_bridge::{
        HostBridge, LowLevelHook, NativeBridge, Session, SessionEvent, SessionId,
        SessionRegistry, Win32Ipc, Win32Keyboard,
    };
    use tix_viewer::config::disconnect_notice;
    use tix_viewer::display::GdiSink;
    use tix_viewer::input::{Viewport, route_event};
    use tix_viewer::window::{NativeWindow, WindowEvent};
    use tokio::sync::mpsc;
    use tracing::error;

    const TITLE: &str = "TIX Viewer";

    // ── 1. Load the bridge and create the window ────────────────

    let conn = config.connection.clone();
    let window = NativeWindow::create(&config.window_title(), conn.width, conn.height)?;

    let bridge: Arc<dyn HostBridge> = match NativeBridge::load(&config.bridge.library_path) {
        Ok(bridge) => Arc::new(bridge),
        Err(e) => {
            error!("{e}");
            window.show_notice(TITLE, &e.to_string());
            return Err(e.into());
        }
    };
    let mut sink = GdiSink::for_window(&window);

    // ── 2. Start the session ────────────────────────────────────

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let session = match Session::start(
        SessionId::next(),
        bridge,
        Win32Ipc,
        &conn,
        Arc::new(Win32Keyboard),
        config.session_options(),
        event_tx,
    ) {
        Ok(session) => session,
        Err(e) => {
            error!("session start failed: {e}");
            window.show_notice(TITLE, &e.to_string());
            return Err(e.into());
        }
    };

    let hook = config.input.intercept_reserved_keys.then(LowLevelHook::new);
    let mut registry = SessionRegistry::<Win32Ipc, _>::new(hook);
    let id = registry.insert(window.id(), session);
    let remote = registry.get(id).map_or((conn.width, conn.height), |s| s.remote_size());
    let mut viewport = Viewport::new(window.client_size(), remote);

    // ── 3. Event loop ───────────────────────────────────────────

    'running: loop {
        let now = Instant::now();

        for ev in window.poll_events() {
            let Some(session) = registry.get_mut(id) else {
                break 'running;
            };
            match ev {
                WindowEvent::Close => break 'running,
                WindowEvent::Resize(w, h) => {
                    viewport.window = (w, h);
                    sink.resize(w, h);
                }
                WindowEvent::Visible(visible) => {
                    let restored = visible && !session.is_visible();
                    session.set_visible(visible);
                    if restored {
                        if let Err(e) = session.repaint(&mut sink) {
                            warn!("repaint error: {e}");
                        }
                    }
                }
                other => route_event(&other, session.input_mut(), &config.input, &viewport, now),
            }
        }

        while let Ok(event) = event_rx.try_recv() {
            let sid = event.session();
            match event {
                SessionEvent::FrameReady(_) => {
                    if let Some(session) = registry.get_mut(sid) {
                        if let Err(e) = session.pump_frame(&mut sink) {
                            warn!("render error: {e}");
                        }
                    }
                }
                SessionEvent::Disconnected(_) => {
                    let server = registry.get(sid).map(|s| s.server().to_string());
                    registry.remove(sid);
                    if let Some(server) = server {
                        window.show_notice(TITLE, &disconnect_notice(&server));
                    }
                    break 'running;
                }
            }
        }

        let mut next = now + Duration::from_millis(1);
        if let Some(session) = registry.get_mut(id) {
            let input = session.input_mut();
            input.tick(Instant::now());
            if let Some(deadline) = input.next_deadline() {
                next = next.min(deadline);
            }
        }

        // Yield briefly so the watcher threads' signals get drained.
        tokio::time::sleep_until(next.into()).await;
    }

    // ── 4. Shutdown ─────────────────────────────────────────────

    info!("shutting down");
    registry.close_all();
    drop(sink);
    drop(window);

    Ok(())
}

#[cfg(not(target_os = "windows"))]
async fn run(config: ViewerConfig) -> Result<(), Box<dyn std::error::Error>> {
    use tix_viewer::window::NativeWindow;

    let conn = &config.connection;
    NativeWindow::create(&config.window_title(), conn.width, conn.height)?;
    Ok(())
}
