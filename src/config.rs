pub use self::parser::{Config, DatabaseConfig, ImportConfig, LoggingConfig};
pub use self::validator::ConfigError;

mod parser;
mod validator;
