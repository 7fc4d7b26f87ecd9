pub mod settings;

pub use settings::{LoggingConfig, PackConfig, PackageConfig, CONFIG_FILE};
