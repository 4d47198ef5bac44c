//! Authorization flows: PKCE attempt construction, silent renewal, interactive login, and the
//! retry policy wrapped around token endpoint calls.

pub mod pkce;
pub mod presenter;
pub mod retry;
pub mod silent_renewal;

pub use pkce::*;
pub use presenter::*;
pub use retry::*;
pub use silent_renewal::*;
