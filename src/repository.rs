//! Token repositories: cached retrieval with refresh-then-renew fallback.
//!
//! [`TokenExchanger`] owns the collaborators and performs the network exchanges.
//! [`IdentityTokenRepository`] and [`AccessTokenRepository`] layer a caching rule and per-key
//! single-flight deduplication on top of it:
//!
//! 1. A cached, unexpired token is returned without touching the network.
//! 2. Otherwise a stored refresh token is exchanged.
//! 3. Without one, a full renewal runs (silent redirect chase, then the login presenter).
//!
//! A refresh rejected by the token endpoint clears the stored refresh token before the error
//! surfaces, so the following call renews.

mod access;
mod exchanger;
mod identity;
mod metrics;

pub use access::AccessTokenRepository;
pub use exchanger::TokenExchanger;
pub use identity::IdentityTokenRepository;
pub use metrics::ExchangeMetrics;
