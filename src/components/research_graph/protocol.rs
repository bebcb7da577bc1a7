//! Messages exchanged with the background layout worker, and the handler
//! the worker runs on its side of the boundary.

use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

use super::config::LayoutConfig;
use super::error::OffloadError;
use super::layout::LayoutEngine;
use super::types::{GraphEdgeSpec, GraphNodeSpec, LayoutResult, PositionedNode, RoutedEdge};

/// Body of a `LAYOUT_GRAPH` message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutRequest {
	pub request_id: u64,
	pub nodes: Vec<GraphNodeSpec>,
	pub edges: Vec<GraphEdgeSpec>,
	/// Engine settings of the requesting side; the worker uses its defaults when absent.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub layout: Option<LayoutConfig>,
}

/// Body of a `LAYOUT_COMPLETE` message. Carries either a layout or an error.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutResponse {
	pub request_id: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub nodes: Option<Vec<PositionedNode>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub edges: Option<Vec<RoutedEdge>>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl LayoutResponse {
	pub fn completed(request_id: u64, result: LayoutResult) -> Self {
		Self {
			request_id,
			nodes: Some(result.nodes),
			edges: Some(result.edges),
			error: None,
		}
	}

	pub fn failed(request_id: u64, error: impl Into<String>) -> Self {
		Self {
			request_id,
			nodes: None,
			edges: None,
			error: Some(error.into()),
		}
	}

	/// Turn the response into the caller-facing outcome.
	pub fn into_result(self, cache_key: String) -> Result<LayoutResult, OffloadError> {
		if let Some(error) = self.error {
			return Err(OffloadError::Worker(error));
		}
		match (self.nodes, self.edges) {
			(Some(nodes), Some(edges)) => Ok(LayoutResult {
				nodes,
				edges,
				cache_key,
				version: None,
			}),
			_ => Err(OffloadError::Worker(format!(
				"response {} carried neither a layout nor an error",
				self.request_id
			))),
		}
	}
}

/// Envelope for both directions, tagged by `type`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
	LayoutGraph(LayoutRequest),
	LayoutComplete(LayoutResponse),
}

impl WorkerMessage {
	pub fn to_json(&self) -> Result<String, OffloadError> {
		Ok(serde_json::to_string(self)?)
	}

	pub fn from_json(json: &str) -> Result<Self, OffloadError> {
		serde_json::from_str(json).map_err(|e| OffloadError::Worker(format!("malformed message: {e}")))
	}
}

/// Worker-side handling of one incoming message.
///
/// Always produces a response so the requester's pending entry is settled,
/// falling back to request id 0 when the id itself cannot be recovered.
pub fn respond(message: &str) -> LayoutResponse {
	match serde_json::from_str::<WorkerMessage>(message) {
		Ok(WorkerMessage::LayoutGraph(request)) => {
			let engine = LayoutEngine::new(request.layout.unwrap_or_default());
			let result = engine.layout(&request.nodes, &request.edges);
			LayoutResponse::completed(request.request_id, result)
		}
		Ok(WorkerMessage::LayoutComplete(response)) => LayoutResponse::failed(
			response.request_id,
			"worker received LAYOUT_COMPLETE; expected LAYOUT_GRAPH",
		),
		Err(err) => {
			let request_id = serde_json::from_str::<serde_json::Value>(message)
				.ok()
				.and_then(|v| v.get("requestId").and_then(serde_json::Value::as_u64))
				.unwrap_or(0);
			LayoutResponse::failed(request_id, format!("malformed request: {err}"))
		}
	}
}

/// Entry point for the worker script: takes a `LAYOUT_GRAPH` JSON message
/// and returns the `LAYOUT_COMPLETE` JSON reply.
#[wasm_bindgen(js_name = "handleLayoutMessage")]
pub fn handle_layout_message(message: &str) -> String {
	let response = respond(message);
	let request_id = response.request_id;
	WorkerMessage::LayoutComplete(response)
		.to_json()
		.unwrap_or_else(|err| {
			format!(
				r#"{{"type":"LAYOUT_COMPLETE","requestId":{request_id},"error":{}}}"#,
				serde_json::Value::String(err.to_string())
			)
		})
}
