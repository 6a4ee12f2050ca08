//! Log initialization.
//!
//! Dispatches to stderr and, when configured, a log file. The `MINIDB_LOG`
//! environment variable overrides the configured level.

use std::path::Path;

pub fn init(level: &str, file: Option<&Path>) -> Result<(), fern::InitError> {
    let level = std::env::var("MINIDB_LOG")
        .ok()
        .and_then(|s| s.parse().ok())
        .or_else(|| level.parse().ok())
        .unwrap_or(log::LevelFilter::Info);

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}] [{}] {}",
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    if let Some(path) = file {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    dispatch.apply()?;
    Ok(())
}
