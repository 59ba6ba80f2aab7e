//! Document materialization and output
//!
//! - [`materializer`]: in-memory joins from flat rows to nested documents
//! - [`writer`]: one JSON file per root collection
//! - [`validator`]: `$jsonSchema` validators inferred from the documents

pub mod materializer;
pub mod validator;
pub mod writer;

pub use materializer::{CollectionDocuments, DocumentMaterializer};
pub use validator::{infer_validator, ValidatorBuilder};
pub use writer::{CollectionWriter, DocumentWriter};
