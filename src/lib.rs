pub mod collection;
pub mod config;
pub mod embeddings;
pub mod experience;
pub mod paths;
pub mod registry;
pub mod resolver;

// Re-export commonly used types
pub use config::Config;
pub use experience::{ExperienceStore, Feedback};
pub use registry::{Registry, RegistryRecord};
