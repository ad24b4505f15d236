pub mod settings;

pub use settings::Config;

use crate::error::Result;
use std::sync::Arc;

/// Loads `.env` (if present), reads the environment and validates the result.
/// Runs before logging is installed; callers log the summary with
/// [`Config::log_settings`] once it is.
pub fn load_config() -> Result<Arc<Config>> {
    dotenv::dotenv().ok();

    let config = Config::from_env();
    config.validate()?;

    Ok(Arc::new(config))
}
