//! Auth-domain value types: scope sets, token requests, authorization codes, and tokens.

pub mod code;
pub mod request;
pub mod scope;
pub mod token;

pub use code::*;
pub use request::*;
pub use scope::*;
pub use token::{jwt::*, record::*, secret::*};
