//! GUI module - egui-based front end for starting and watching the file server

mod components;
mod constants;
mod manager;

pub use manager::run_gui;
