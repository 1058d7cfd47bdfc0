//! Validation collaborators.
//!
//! - [`ReplayValidator`]: returns recorded findings payloads in order
//! - [`HttpValidator`] (feature `http`): posts the check to a validation
//!   endpoint and returns its JSON body

mod replay;

#[cfg(feature = "http")]
mod http;

pub use replay::{RecordedCheck, ReplayValidator};

#[cfg(feature = "http")]
pub use http::HttpValidator;
