//! Types related to GraphQL requests.

pub use crate::request::Request;
