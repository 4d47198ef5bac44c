//! Optional observability helpers for token lifecycle flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `oauth2_lifecycle.flow` with the `flow`
//!   and `stage` fields, plus debug/info/warn events for retries, cleared refresh tokens, and
//!   undecodable ID token claims.
//! - Enable `metrics` to increment the `oauth2_lifecycle_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Token lifecycle flows observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Refresh token grant.
	Refresh,
	/// Full renewal (silent attempt plus optional interactive fallback).
	Renewal,
	/// Cookie-driven redirect chase.
	SilentRenewal,
	/// Login presenter round trip.
	Interactive,
	/// Authorization code exchange.
	CodeExchange,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Refresh => "refresh",
			FlowKind::Renewal => "renewal",
			FlowKind::SilentRenewal => "silent_renewal",
			FlowKind::Interactive => "interactive",
			FlowKind::CodeExchange => "code_exchange",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Records an attempt, awaits `fut` inside a span, then records its outcome.
pub(crate) async fn observe<T, Fut>(kind: FlowKind, stage: &'static str, fut: Fut) -> Result<T>
where
	Fut: Future<Output = Result<T>>,
{
	let span = FlowSpan::new(kind, stage);

	record_flow_outcome(kind, FlowOutcome::Attempt);

	let result = span.instrument(fut).await;

	match &result {
		Ok(_) => record_flow_outcome(kind, FlowOutcome::Success),
		Err(_) => record_flow_outcome(kind, FlowOutcome::Failure),
	}

	result
}
