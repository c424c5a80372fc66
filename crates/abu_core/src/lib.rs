pub mod animation;
pub mod command;
pub mod config;
pub mod input;
pub mod time;
pub mod vector;
