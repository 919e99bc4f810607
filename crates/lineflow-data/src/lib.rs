pub mod loader;
pub mod schema;

pub use loader::{build_line, load_line_file, DataLoadError};
pub use schema::LineFile;
