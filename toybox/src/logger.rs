use std::{fs::File, path::Path};

use anyhow::*;
use simplelog::*;

/// Logs to terminal at `log_level` and to `log_file` at info level.
pub fn initialize_logger(log_level: LevelFilter, log_file: impl AsRef<Path>) -> Result<()> {
    let log_file = log_file.as_ref();
    CombinedLogger::init(vec![
        TermLogger::new(log_level, Config::default(), TerminalMode::Mixed),
        WriteLogger::new(
            LevelFilter::Info,
            Config::default(),
            File::create(log_file)
                .with_context(|| format!("Failed to create log file {}", log_file.display()))?,
        ),
    ])?;
    Ok(())
}
