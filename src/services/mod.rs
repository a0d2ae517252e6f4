pub mod classifier;
pub mod config;
pub mod dispatcher;
pub mod executor;
pub mod logger;
pub mod renderer;
pub mod validation;
