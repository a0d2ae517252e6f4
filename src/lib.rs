pub mod app;
pub mod constants;
pub mod errors;
pub mod mcp;
pub mod services;
pub mod utils;
