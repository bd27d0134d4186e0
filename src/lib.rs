pub mod clipboard;
pub mod config;
pub mod errors;
pub mod history;
pub mod storage;
pub mod tui;
pub mod watcher;
