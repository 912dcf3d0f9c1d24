//! Filter domain: parameters, block tags, responses, config and errors.

pub mod config;
pub mod error;
pub mod filter;

pub use config::FilterConfig;
pub use error::FilterError;
pub use filter::{BlockTag, FilterKind, FilterNotFound, FilterResponse, LogFilter};
