//! Structured logging setup

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{filter, fmt, EnvFilter, Layer};

/// Renders event timestamps in IST as `YYYY-MM-DD HH:mm:ss.SSS`
pub(super) struct IstTimer;

impl FormatTime for IstTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", crate::clock::ist_now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Install the tracing registry with the console and file layers.
///
/// `trading.log` carries info and above except websocket chatter;
/// `debug.log` carries everything at debug and above; `websocket.log`
/// carries only the `ws` target.
pub fn init_logging(level: &str) -> anyhow::Result<Vec<WorkerGuard>> {
    // The env filter gates the console only; the file layers carry their
    // own filters so debug.log keeps receiving debug events regardless of
    // the console level.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (trading_writer, trading_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(".", "trading.log"));
    let (debug_writer, debug_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(".", "debug.log"));
    let (ws_writer, ws_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(".", "websocket.log"));

    let trading_layer = fmt::layer()
        .with_writer(trading_writer)
        .with_ansi(false)
        .with_timer(IstTimer)
        .with_filter(filter::filter_fn(|meta| {
            *meta.level() <= Level::INFO && !meta.target().starts_with("ws")
        }));

    let debug_layer = fmt::layer()
        .with_writer(debug_writer)
        .with_ansi(false)
        .with_timer(IstTimer)
        .with_filter(filter::LevelFilter::DEBUG);

    let ws_layer = fmt::layer()
        .with_writer(ws_writer)
        .with_ansi(false)
        .with_timer(IstTimer)
        .with_filter(filter::filter_fn(|meta| meta.target().starts_with("ws")));

    tracing_subscriber::registry()
        .with(fmt::layer().with_timer(IstTimer).with_filter(env_filter))
        .with(trading_layer)
        .with(debug_layer)
        .with(ws_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to init logging: {e}"))?;

    Ok(vec![trading_guard, debug_guard, ws_guard])
}
