pub mod config;
pub mod loader;
pub mod validate;

pub use config::{
    AdminConfig, CacheConfig, Config, LogConfig, PrefetchConfig, SitemapConfig, TtlRule,
};
pub use loader::{load_config, read_config_file};
pub use validate::validate_config;
