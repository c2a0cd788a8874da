use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Initialize logging.
///
/// The level comes from `--log-level`, falling back to the `NAGARE_LOG`
/// environment variable (a full tracing filter), then to `NAGARE_DEBUG`
/// (any non-empty value means DEBUG), then to INFO.
pub fn init(cli_level: Option<LevelFilter>) {
    let debug_env = std::env::var("NAGARE_DEBUG").is_ok_and(|v| !v.is_empty() && v != "0");
    let default = cli_level.unwrap_or(if debug_env {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    });
    let env_filter = EnvFilter::try_from_env("NAGARE_LOG").unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(default.into())
            .parse_lossy("")
    });

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
