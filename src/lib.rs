// Session persistence library - backup cycles, restore and their storage

pub mod config;
pub mod config_io;
pub mod model;
pub mod services;
