//! Request/response model and its error taxonomy.

pub mod error;
pub mod fields;
pub mod query;
pub mod request;
pub mod response;

pub use error::{ParseError, SendError, ServerError};
pub use fields::{FieldMap, FieldValue};
pub use request::{Body, Request};
pub use response::Response;
