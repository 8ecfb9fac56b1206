pub mod cache;
pub mod files;
pub mod logging;
pub mod notifier;
pub mod storage;
