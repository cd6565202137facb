pub mod models;
pub mod pipeline;
pub mod recorder;
pub mod service;
