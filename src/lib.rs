// Library surface shared by the binary and the integration tests.
pub mod alignment;
pub mod app;
pub mod app_dirs;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod results;
pub mod runtime;
pub mod sampler;
pub mod score;
pub mod session;
pub mod text;
pub mod time_series;
pub mod transcript;
pub mod ui;
pub mod util;
