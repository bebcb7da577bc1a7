use thiserror::Error;

/// Reasons an offloaded layout request can be rejected.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum OffloadError {
	#[error("layout request {request_id} timed out after {timeout_ms}ms")]
	Timeout { request_id: u64, timeout_ms: u64 },

	#[error("layout worker error: {0}")]
	Worker(String),

	#[error("layout channel terminated")]
	Terminated,

	#[error("layout worker unavailable: {0}")]
	Unavailable(String),

	#[error("failed to encode layout message: {0}")]
	Encode(String),
}

impl From<serde_json::Error> for OffloadError {
	fn from(err: serde_json::Error) -> Self {
		OffloadError::Encode(err.to_string())
	}
}

/// A drawing call failed while painting a frame.
#[derive(Debug, Error)]
pub enum RenderError {
	#[error("canvas call failed: {0}")]
	Canvas(String),
}
