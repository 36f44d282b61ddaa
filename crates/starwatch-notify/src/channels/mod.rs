pub mod file;
pub mod telegram;
pub mod webhook;
