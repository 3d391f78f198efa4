//! Application-related API endpoints

use crate::ControllerClient;
use crate::error::Result;
use capstan_core::domain::application::Application;
use capstan_core::dto::application::CreateApplication;
use capstan_core::dto::status::StatusReport;
use capstan_core::dto::sync::{SyncReport, SyncRequest};

impl ControllerClient {
    // =============================================================================
    // Application Management
    // =============================================================================

    /// Register an application with the controller
    ///
    /// # Arguments
    /// * `request` - The application declaration (name, repo URL, path, revision, destination)
    ///
    /// # Returns
    /// The created application
    ///
    /// # Example
    /// ```no_run
    /// # use capstan_client::ControllerClient;
    /// # use capstan_core::dto::application::CreateApplication;
    /// # use capstan_core::domain::application::SyncPolicy;
    /// # async fn example() -> anyhow::Result<()> {
    /// let client = ControllerClient::new("http://localhost:7070");
    /// let app = client.create_application(CreateApplication {
    ///     name: "shop".to_string(),
    ///     repo_url: "https://git.example/acme/shop.git".to_string(),
    ///     path: "deploy".to_string(),
    ///     target_revision: "main".to_string(),
    ///     dest_namespace: "shop".to_string(),
    ///     sync_policy: SyncPolicy::default(),
    /// }).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn create_application(
        &self,
        request: CreateApplication,
    ) -> Result<Application> {
        let url = format!("{}/application/create", self.base_url);
        let response = self.client.post(&url).json(&request).send().await?;

        self.handle_response(response).await
    }

    /// List all registered applications
    ///
    /// # Returns
    /// A list of all applications
    pub async fn list_applications(&self) -> Result<Vec<Application>> {
        let url = format!("{}/application/list", self.base_url);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Get details for a specific application
    ///
    /// # Arguments
    /// * `name` - The application name
    ///
    /// # Returns
    /// The application declaration
    pub async fn get_application(&self, name: &str) -> Result<Application> {
        let url = format!("{}/application/{}", self.base_url, name);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Delete an application registration
    ///
    /// # Arguments
    /// * `name` - The application name to delete
    /// * `cascade` - Whether to also delete the objects the application owns
    pub async fn delete_application(&self, name: &str, cascade: bool) -> Result<()> {
        let url = format!("{}/application/{}", self.base_url, name);
        let response = self
            .client
            .delete(&url)
            .query(&[("cascade", cascade)])
            .send()
            .await?;

        self.handle_empty_response(response).await
    }

    // =============================================================================
    // Sync & Status
    // =============================================================================

    /// Trigger a sync pass and wait for its report
    ///
    /// The controller resolves the tracked revision, renders the manifests
    /// and applies the differences before answering, so this call blocks
    /// for the duration of the pass.
    ///
    /// # Arguments
    /// * `name` - The application to sync
    /// * `request` - Pass options (prune override, dry-run)
    ///
    /// # Returns
    /// The per-object report of the finished pass
    ///
    /// # Example
    /// ```no_run
    /// # use capstan_client::ControllerClient;
    /// # use capstan_core::dto::sync::SyncRequest;
    /// # async fn example() -> anyhow::Result<()> {
    /// let client = ControllerClient::new("http://localhost:7070");
    /// let report = client.sync_application("shop", SyncRequest {
    ///     prune: Some(true),
    ///     dry_run: false,
    /// }).await?;
    /// println!("{} resources touched", report.resources.len());
    /// # Ok(())
    /// # }
    /// ```
    pub async fn sync_application(
        &self,
        name: &str,
        request: SyncRequest,
    ) -> Result<SyncReport> {
        let url = format!("{}/application/{}/sync", self.base_url, name);
        let response = self.client.post(&url).json(&request).send().await?;

        self.handle_response(response).await
    }

    /// Get the aggregated status of an application
    ///
    /// # Arguments
    /// * `name` - The application name
    ///
    /// # Returns
    /// The declaration, the last sync record and the latest pipeline run
    pub async fn get_status(&self, name: &str) -> Result<StatusReport> {
        let url = format!("{}/application/{}/status", self.base_url, name);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}
