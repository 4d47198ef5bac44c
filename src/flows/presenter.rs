//! Interactive login seam.

// self
use crate::{_prelude::*, flows::AuthorizationAttempt};

/// Boxed future returned by [`LoginPresenter::present`].
pub type PresenterFuture<'a> = Pin<Box<dyn Future<Output = Result<Url>> + 'a + Send>>;

/// Shows the authorization URL to the user (typically in a web view).
///
/// Implementations watch navigation with [`AuthorizationAttempt::is_redirect`] and resolve
/// with the intercepted callback URL, or fail with [`Error::CancelledByUser`] when the user
/// dismisses the login. The callback is validated and exchanged by the caller.
pub trait LoginPresenter
where
	Self: Send + Sync,
{
	/// Presents `attempt` and waits for the callback URL.
	fn present<'a>(&'a self, attempt: &'a AuthorizationAttempt) -> PresenterFuture<'a>;
}
