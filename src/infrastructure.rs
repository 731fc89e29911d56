//! Infrastructure layer for configuration, HTTP, HTML extraction and files
//!
//! Everything that touches the network, the filesystem or the process
//! environment lives here, behind the traits the application layer uses.

pub mod checkpoint_store;
pub mod config;
pub mod html_extract;
pub mod html_page_source;
pub mod http_client;
pub mod logging;
pub mod retry_calculator;
pub mod signals;
pub mod site_profiles;
pub mod tabular;

// Re-export commonly used items
pub use checkpoint_store::FileProgressStore;
pub use config::{AppConfig, ConfigManager};
pub use html_page_source::HtmlPageSource;
pub use http_client::{HttpClient, HttpClientConfig};
pub use logging::{get_log_directory, init_logging_with_config, log_system_info};
pub use retry_calculator::RetryCalculator;
pub use site_profiles::{MatchMode, SiteProfile};
