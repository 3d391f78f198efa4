//! Capstan HTTP Client
//!
//! A simple, type-safe HTTP client for the Capstan controller API.
//!
//! The CLI and any external tooling talk to the controller through this
//! crate, so request/response handling lives in exactly one place.
//!
//! # Example
//!
//! ```no_run
//! use capstan_client::ControllerClient;
//! use capstan_core::dto::application::CreateApplication;
//! use capstan_core::domain::application::SyncPolicy;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ControllerClient::new("http://localhost:7070");
//!
//!     let app = client.create_application(CreateApplication {
//!         name: "shop".to_string(),
//!         repo_url: "https://git.example/acme/shop.git".to_string(),
//!         path: "deploy".to_string(),
//!         target_revision: "main".to_string(),
//!         dest_namespace: "shop".to_string(),
//!         sync_policy: SyncPolicy::default(),
//!     }).await?;
//!
//!     println!("Created application: {}", app.name);
//!     Ok(())
//! }
//! ```

pub mod error;
mod applications;
mod pipelines;

// Re-export commonly used types
pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;
use tracing::debug;

/// HTTP client for the Capstan controller API
///
/// Methods are organized into logical groups:
/// - Application management (create, list, get, delete)
/// - Sync and status (trigger a pass, read the aggregated report)
/// - Pipeline runs (submit, get, wait, list)
#[derive(Debug, Clone)]
pub struct ControllerClient {
    /// Base URL of the controller (e.g., "http://localhost:7070")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl ControllerClient {
    /// Create a new controller client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the controller API (e.g., "http://localhost:7070")
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// Create a new controller client with a custom HTTP client
    ///
    /// This allows configuring timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the controller
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    ///
    /// Checks the status code and returns an appropriate error if the
    /// request failed, or deserializes the response body if successful.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = extract_message(&error_text);
            debug!("API request failed with {}: {}", status, message);
            return Err(ClientError::api_error(status.as_u16(), message));
        }

        response.json().await.map_err(|e| {
            ClientError::ParseError(format!(
                "Failed to parse JSON response: {}",
                e
            ))
        })
    }

    /// Handle an API response that returns no content (e.g., DELETE operations)
    async fn handle_empty_response(
        &self,
        response: reqwest::Response,
    ) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            let message = extract_message(&error_text);
            debug!("API request failed with {}: {}", status, message);
            return Err(ClientError::api_error(status.as_u16(), message));
        }

        Ok(())
    }
}

/// Pulls the message out of an `{"error": "..."}` body, falling back to
/// the raw text for anything else
fn extract_message(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(value) => match value.get("error").and_then(|v| v.as_str()) {
            Some(message) => message.to_string(),
            None => body.to_string(),
        },
        Err(_) => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = ControllerClient::new("http://localhost:7070");
        assert_eq!(client.base_url(), "http://localhost:7070");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = ControllerClient::new("http://localhost:7070/");
        assert_eq!(client.base_url(), "http://localhost:7070");
    }

    #[test]
    fn test_client_with_custom_client() {
        let http_client = Client::new();
        let client =
            ControllerClient::with_client("http://localhost:7070", http_client);
        assert_eq!(client.base_url(), "http://localhost:7070");
    }

    #[test]
    fn test_extract_message_unwraps_error_bodies() {
        assert_eq!(
            extract_message("{\"error\": \"Application shop not found\"}"),
            "Application shop not found"
        );
        assert_eq!(extract_message("plain text"), "plain text");
        assert_eq!(extract_message("{\"other\": 1}"), "{\"other\": 1}");
    }
}
