//! Configuration: settings merge, credential resolution, and the model
//! descriptor file.

pub mod credentials;
pub mod models_file;
pub mod settings;
