use flexi_logger::{
    colored_default_format, opt_format, Cleanup, Criterion, Duplicate, FileSpec, FlexiLoggerError,
    Logger, LoggerHandle, Naming,
};

/// Start the global logger.
///
/// `RUST_LOG` overrides `level`. With a directory, logs go to rotated files
/// there and are duplicated to stderr.
pub fn setup_logging(level: &str, directory: Option<&str>) -> Result<LoggerHandle, FlexiLoggerError> {
    let logger = Logger::try_with_env_or_str(level)?;

    match directory {
        Some(dir) => logger
            .log_to_file(FileSpec::default().directory(dir))
            .format_for_files(opt_format)
            .format_for_stderr(colored_default_format)
            .duplicate_to_stderr(Duplicate::Info)
            .rotate(
                Criterion::Size(10 * 1024 * 1024), // 10 MB
                Naming::Numbers,
                Cleanup::KeepLogFiles(7),
            )
            .start(),
        None => logger.format(colored_default_format).start(),
    }
}
