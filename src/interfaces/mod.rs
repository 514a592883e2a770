pub mod commands;
pub mod discord;
pub mod spectrum;
