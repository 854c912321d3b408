pub mod toml_loader;

pub use toml_loader::{load_generation_request, parse_generation_request, GenerationRequest};
