pub mod camera;
pub mod config;
pub mod decode;
pub mod recognize;
pub mod scheduler;
pub mod service;
pub mod state_machine;
pub mod status;
