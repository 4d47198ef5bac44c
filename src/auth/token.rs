//! Token value types: granted token sets, ID tokens, and redacted secrets.

pub mod jwt;
pub mod record;
pub mod secret;
