pub mod bootstrap;
pub mod commands;
pub mod library;
pub mod notes_buffer;
pub mod session;
pub mod stats;
pub mod timer_driver;
