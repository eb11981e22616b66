use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use env_logger::{Builder, Env};
use log::{Level, LevelFilter};
use termcolor::{BufferWriter, Color, ColorChoice, ColorSpec, WriteColor};

pub use log::{debug, error, info, trace, warn};

const DEFAULT_FILTER: &str = "twinview=info";
const QUIET_MODULES: [&str; 4] = ["naga", "wgpu", "wgpu_core", "wgpu_hal"];

static STARTED: OnceLock<Instant> = OnceLock::new();

/// Colored `[LEVEL][+secs][module] message` lines on stderr. `RUST_LOG`
/// replaces the default filter; GPU crates stay at `warn` regardless.
pub fn init_logger() {
    let started = *STARTED.get_or_init(Instant::now);

    let mut builder =
        Builder::from_env(Env::default().default_filter_or(DEFAULT_FILTER));
    for module in QUIET_MODULES {
        builder.filter_module(module, LevelFilter::Warn);
    }

    builder.format(move |_buf, record| {
        let writer = BufferWriter::stderr(ColorChoice::Auto);
        let mut buffer = writer.buffer();

        buffer.set_color(ColorSpec::new().set_fg(Some(level_color(record.level()))))?;
        write!(
            buffer,
            "[{}][+{:.3}]",
            record.level(),
            started.elapsed().as_secs_f32()
        )?;
        buffer.reset()?;

        let module = record.module_path().unwrap_or("?");
        writeln!(
            buffer,
            "[{}] {}",
            module.strip_prefix("twinview::").unwrap_or(module),
            record.args()
        )?;
        writer.print(&buffer)
    });

    let _ = builder.try_init();
}

fn level_color(level: Level) -> Color {
    match level {
        Level::Error => Color::Red,
        Level::Warn => Color::Yellow,
        Level::Info => Color::Green,
        Level::Debug => Color::Blue,
        Level::Trace => Color::Cyan,
    }
}
