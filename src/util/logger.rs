use log::SetLoggerError;

/// Attempt to init a env_logger for the harness.
/// Does nothing if the "builtin_env_logger" feature is disabled.
///
/// Embedders that bring their own logger should disable the default feature and install it
/// before driving a [`Runtime`](crate::Runtime).
pub fn try_init() -> Result<(), SetLoggerError> {
    cfg_if::cfg_if! {
        if #[cfg(feature = "builtin_env_logger")] {
            env_logger::try_init_from_env(
                // By default, use info level logging.
                env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
            )
        } else {
            Ok(())
        }
    }
}
