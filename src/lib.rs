pub mod app;
pub mod audio;
pub mod config;
pub mod controller;
pub mod core;
pub mod crossfade;
pub mod library;
pub mod model;
pub mod queue;
pub mod store;
pub mod timer;
pub mod ui;
