//!
//! GraphQL client for the Midnight public data indexer.
//!
//! This module provides an async client for the indexer's GraphQL API: plain queries over HTTP
//! and subscriptions over WebSocket using the `graphql-transport-ws` protocol. All methods are
//! async and designed for use with Tokio.

use super::types::*;
use futures_util::{SinkExt, Stream, StreamExt};
use reqwest::Client;
use serde_json::json;
use std::pin::Pin;
use std::time::Duration;
use tokio_tungstenite::{
	connect_async,
	tungstenite::{Message, client::IntoClientRequest},
};
use tracing::{debug, error};

/// Stream of subscription payloads.
pub type SubscriptionStream =
	Pin<Box<dyn Stream<Item = Result<serde_json::Value, IndexerError>> + Send>>;

/// Midnight GraphQL indexer client
#[derive(Clone)]
pub struct MidnightIndexerClient {
	/// The underlying HTTP client for GraphQL queries.
	http_client: Client,
	/// The base URL for the indexer GraphQL HTTP endpoint.
	indexer_url: String,
	/// The WebSocket URL for real-time subscriptions.
	ws_url: String,
}

impl MidnightIndexerClient {
	/// Create a new indexer client.
	///
	/// # Arguments
	/// * `indexer_url` - The HTTP endpoint for GraphQL queries.
	/// * `ws_url` - The WebSocket endpoint for subscriptions.
	pub fn new(indexer_url: String, ws_url: String) -> Result<Self, IndexerError> {
		let http_client = Client::builder().timeout(Duration::from_secs(30)).build()?;

		Ok(Self {
			http_client,
			indexer_url,
			ws_url,
		})
	}

	/// Execute a GraphQL query.
	///
	/// # Arguments
	/// * `query` - The GraphQL query string.
	/// * `variables` - Optional variables for the query.
	///
	/// # Returns
	/// The `data` object of the response, or an `IndexerError` if the request fails or the
	/// indexer reports GraphQL errors.
	pub async fn execute_query(
		&self,
		query: &str,
		variables: Option<serde_json::Value>,
	) -> Result<serde_json::Value, IndexerError> {
		let request_body = json!({
			"query": query,
			"variables": variables
		});

		let response = self
			.http_client
			.post(&self.indexer_url)
			.header("Content-Type", "application/json")
			.json(&request_body)
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(IndexerError::GraphQLError(format!(
				"HTTP error: {}",
				response.status()
			)));
		}

		let response_json: serde_json::Value = response.json().await?;

		if let Some(errors) = response_json.get("errors") {
			return Err(IndexerError::GraphQLError(format!(
				"GraphQL errors: {}",
				errors
			)));
		}

		response_json
			.get("data")
			.cloned()
			.ok_or(IndexerError::NoData)
	}

	/// Start a GraphQL subscription.
	///
	/// # Arguments
	/// * `operation_id` - Client-chosen id for the subscription.
	/// * `query` - The subscription document.
	/// * `variables` - Variables for the subscription.
	/// * `field` - Name of the root field whose value each `next` message carries.
	///
	/// # Returns
	/// A pinned async stream of the `field` payloads. The stream ends when the server completes
	/// the subscription.
	///
	/// # Errors
	/// Returns `IndexerError` if the WebSocket connection or handshake fails.
	pub async fn subscribe(
		&self,
		operation_id: &str,
		query: &str,
		variables: serde_json::Value,
		field: &'static str,
	) -> Result<SubscriptionStream, IndexerError> {
		debug!("Attempting WebSocket connection to: {}", self.ws_url);

		// Create WebSocket request with required subprotocol
		let mut request = self.ws_url.clone().into_client_request()?;
		request.headers_mut().insert(
			"Sec-WebSocket-Protocol",
			"graphql-transport-ws".parse().map_err(|_| {
				IndexerError::GraphQLError("Invalid WebSocket subprotocol header value".to_string())
			})?,
		);

		let (ws_stream, response) = connect_async(request).await?;
		debug!(
			"WebSocket connection established, response status: {}",
			response.status()
		);
		let (mut ws_sender, mut ws_receiver) = ws_stream.split();

		let init_message = json!({
			"type": "connection_init"
		});
		ws_sender
			.send(Message::Text(init_message.to_string()))
			.await?;

		match ws_receiver.next().await {
			Some(msg) => match msg? {
				Message::Text(text) => {
					let parsed: serde_json::Value = serde_json::from_str(&text)?;
					if parsed.get("type").and_then(|t| t.as_str()) != Some("connection_ack") {
						return Err(IndexerError::SessionError(
							"Connection not acknowledged".to_string(),
						));
					}
				}
				_ => {
					return Err(IndexerError::SessionError(
						"Unexpected message type during handshake".to_string(),
					));
				}
			},
			None => {
				return Err(IndexerError::SessionError(
					"Connection closed during handshake".to_string(),
				));
			}
		}

		let start_message = json!({
			"id": operation_id,
			"type": "subscribe",
			"payload": {
				"query": query,
				"variables": variables
			}
		});

		ws_sender
			.send(Message::Text(start_message.to_string()))
			.await?;

		// The sender half must outlive the stream or the server sees the socket close.
		let stream = ws_receiver
			.map(move |msg| {
				let _keep_open = &ws_sender;
				msg
			})
			.take_while(|msg| {
				let complete = matches!(msg, Ok(Message::Text(text)) if is_complete(text));
				if complete {
					debug!("Subscription completed");
				}
				futures_util::future::ready(!complete && !matches!(msg, Ok(Message::Close(_))))
			})
			.filter_map(move |msg| async move { parse_subscription_message(msg, field) });

		Ok(Box::pin(stream))
	}
}

fn is_complete(text: &str) -> bool {
	serde_json::from_str::<serde_json::Value>(text)
		.ok()
		.and_then(|parsed| parsed.get("type").and_then(|t| t.as_str()).map(|t| t == "complete"))
		.unwrap_or(false)
}

/// Turn one WebSocket message into a payload, an error, or nothing for protocol chatter.
fn parse_subscription_message(
	msg: Result<Message, tokio_tungstenite::tungstenite::Error>,
	field: &str,
) -> Option<Result<serde_json::Value, IndexerError>> {
	let text = match msg {
		Ok(Message::Text(text)) => text,
		Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => return None,
		Ok(_) => {
			return Some(Err(IndexerError::GraphQLError(
				"Unexpected message type".to_string(),
			)));
		}
		Err(e) => return Some(Err(IndexerError::WebSocketError(e))),
	};

	let parsed = match serde_json::from_str::<serde_json::Value>(&text) {
		Ok(parsed) => parsed,
		Err(e) => return Some(Err(IndexerError::JsonError(e))),
	};

	let Some(msg_type) = parsed.get("type").and_then(|t| t.as_str()) else {
		return Some(Err(IndexerError::GraphQLError(
			"Message missing type field".to_string(),
		)));
	};

	match msg_type {
		"next" => match parsed
			.get("payload")
			.and_then(|p| p.get("data"))
			.and_then(|d| d.get(field))
		{
			Some(data) => Some(Ok(data.clone())),
			None => {
				error!("Subscription payload without {}: {}", field, parsed);
				Some(Err(IndexerError::NoData))
			}
		},
		"error" => {
			let error_msg = parsed
				.get("payload")
				.and_then(|p| p.as_array().and_then(|a| a.first()).or(Some(p)))
				.and_then(|p| p.get("message"))
				.and_then(|m| m.as_str())
				.unwrap_or("Unknown subscription error");
			Some(Err(IndexerError::GraphQLError(error_msg.to_string())))
		}
		_ => {
			debug!("Ignoring message type: {}", msg_type);
			None
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn text(value: serde_json::Value) -> Result<Message, tokio_tungstenite::tungstenite::Error> {
		Ok(Message::Text(value.to_string()))
	}

	#[test]
	fn next_message_yields_field() {
		let msg = text(json!({
			"id": "1",
			"type": "next",
			"payload": { "data": { "contractActions": { "state": "00ff" } } }
		}));
		let value = parse_subscription_message(msg, "contractActions")
			.unwrap()
			.unwrap();
		assert_eq!(value, json!({ "state": "00ff" }));
	}

	#[test]
	fn error_message_surfaces_text() {
		let msg = text(json!({
			"id": "1",
			"type": "error",
			"payload": [{ "message": "boom" }]
		}));
		let err = parse_subscription_message(msg, "contractActions")
			.unwrap()
			.unwrap_err();
		assert!(err.to_string().contains("boom"));
	}

	#[test]
	fn protocol_chatter_is_skipped() {
		assert!(parse_subscription_message(text(json!({ "type": "ka" })), "x").is_none());
		assert!(parse_subscription_message(Ok(Message::Ping(vec![])), "x").is_none());
		assert!(is_complete(&json!({ "id": "1", "type": "complete" }).to_string()));
	}
}
