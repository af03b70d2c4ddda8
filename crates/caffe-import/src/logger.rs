use log::{LevelFilter, SetLoggerError};
use log4rs::{
    append::console::ConsoleAppender,
    config::{runtime::ConfigErrors, Appender, Config, Root},
    encode::pattern::PatternEncoder,
};
use thiserror::Error;

/// Errors raised while installing the logger.
#[derive(Error, Debug)]
pub enum LogError {
    /// The log4rs configuration was rejected.
    #[error("invalid logger config: {0}")]
    Config(#[from] ConfigErrors),

    /// A logger is already installed.
    #[error(transparent)]
    SetLogger(#[from] SetLoggerError),
}

/// Install the console logger used by the converter.
///
/// Progress notices (one per transferred or skipped layer) go through `log::info!`, so the
/// default `level` keeps them visible on stdout.
pub fn init_log(level: LevelFilter) -> Result<(), LogError> {
    let stdout = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new("[{h({l})} - {f}:{L}] {m}{n}")))
        .build();
    let appender = Appender::builder().build("stdout", Box::new(stdout));

    let config = Config::builder()
        .appender(appender)
        .build(Root::builder().appender("stdout").build(level))?;

    log4rs::init_config(config)?;
    update_panic_hook();

    Ok(())
}

fn update_panic_hook() {
    let hook = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |info| {
        log::error!("PANIC => {info}");
        hook(info);
    }));
}
