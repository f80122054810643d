pub use self::parser::{ApiConfig, AuthConfig, Config, LimitsConfig, LoggingConfig};
pub use self::validator::ConfigError;

mod parser;
mod validator;
