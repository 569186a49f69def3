pub mod app;
pub mod cli;
pub mod config;
pub mod data;
pub mod directory;
pub mod logging;
pub mod services;
pub mod settings;
pub mod state;
pub mod store;
pub mod sync;
pub mod utils;
pub mod web;
