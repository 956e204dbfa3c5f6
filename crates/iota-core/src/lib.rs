pub mod document;
pub mod error;
pub mod traits;
pub mod types;
pub mod version;

pub use document::{embedded_version, parse_document, stored_version, Document};
pub use error::*;
pub use traits::*;
pub use types::*;
