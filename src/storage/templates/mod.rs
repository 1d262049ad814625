//! Durable template artifact implementations.

mod filesystem;

pub use filesystem::FilesystemTemplateStore;
