// self
use crate::{_prelude::*, obs::FlowKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by lifecycle flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("oauth2_lifecycle.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

pub(crate) fn claim_decode_failed(claim: &'static str, err: &dyn Display) {
	#[cfg(feature = "tracing")]
	tracing::warn!(claim, error = %err, "Failed to decode ID token claim.");
	#[cfg(not(feature = "tracing"))]
	let _ = (claim, err);
}

pub(crate) fn retry_scheduled(attempt: u32, delay: Duration, err: &dyn Display) {
	#[cfg(feature = "tracing")]
	tracing::debug!(
		attempt,
		delay_ms = delay.whole_milliseconds() as u64,
		error = %err,
		"Retrying token lifecycle operation."
	);
	#[cfg(not(feature = "tracing"))]
	let _ = (attempt, delay, err);
}

pub(crate) fn refresh_token_cleared(storage_key: &str, err: &dyn Display) {
	#[cfg(feature = "tracing")]
	tracing::info!(storage_key, error = %err, "Refresh token rejected; cleared from storage.");
	#[cfg(not(feature = "tracing"))]
	let _ = (storage_key, err);
}

pub(crate) fn flights_cancelled(count: usize) {
	#[cfg(feature = "tracing")]
	tracing::debug!(count, "Cancelled in-flight token operations.");
	#[cfg(not(feature = "tracing"))]
	let _ = count;
}

pub(crate) fn silent_renewal_unavailable(reason: &dyn Display) {
	#[cfg(feature = "tracing")]
	tracing::debug!(reason = %reason, "Silent renewal did not produce an authorization code.");
	#[cfg(not(feature = "tracing"))]
	let _ = reason;
}
