//! Pipeline-run-related API endpoints

use crate::ControllerClient;
use crate::error::Result;
use capstan_core::domain::run::PipelineRun;
use capstan_core::dto::run::SubmitRun;
use uuid::Uuid;

impl ControllerClient {
    // =============================================================================
    // Run Submission
    // =============================================================================

    /// Submit a pipeline run for execution
    ///
    /// The run is accepted immediately; use [`wait_run`](Self::wait_run) or
    /// [`get_run`](Self::get_run) to observe its outcome.
    ///
    /// # Arguments
    /// * `request` - Source reference, image tag and the optionally linked application
    ///
    /// # Returns
    /// The pending run, including its assigned ID
    ///
    /// # Example
    /// ```no_run
    /// # use capstan_client::ControllerClient;
    /// # use capstan_core::dto::run::SubmitRun;
    /// # async fn example() -> anyhow::Result<()> {
    /// let client = ControllerClient::new("http://localhost:7070");
    /// let run = client.submit_run(SubmitRun {
    ///     source_ref: "refs/heads/main".to_string(),
    ///     image_tag: "registry.example/shop:abc123".to_string(),
    ///     application: Some("shop".to_string()),
    /// }).await?;
    /// println!("Submitted run {}", run.id);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn submit_run(&self, request: SubmitRun) -> Result<PipelineRun> {
        let url = format!("{}/pipeline/run", self.base_url);
        let response = self.client.post(&url).json(&request).send().await?;

        self.handle_response(response).await
    }

    // =============================================================================
    // Run Query
    // =============================================================================

    /// Get details for a specific run
    ///
    /// # Arguments
    /// * `run_id` - The run ID
    ///
    /// # Returns
    /// The run in its current state
    pub async fn get_run(&self, run_id: Uuid) -> Result<PipelineRun> {
        let url = format!("{}/pipeline/run/{}", self.base_url, run_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Wait for a run to reach a terminal outcome
    ///
    /// Blocks server-side until the run succeeds, fails or the timeout
    /// elapses. On timeout the run is returned as-is, still pending.
    ///
    /// # Arguments
    /// * `run_id` - The run ID
    /// * `timeout_secs` - How long the controller should wait before answering
    ///
    /// # Returns
    /// The run, terminal unless the wait timed out
    pub async fn wait_run(&self, run_id: Uuid, timeout_secs: u64) -> Result<PipelineRun> {
        let url = format!("{}/pipeline/run/{}/wait", self.base_url, run_id);
        let response = self
            .client
            .get(&url)
            .query(&[("timeout_secs", timeout_secs)])
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// List submitted runs, most recent last
    ///
    /// # Arguments
    /// * `application` - Restrict the list to runs linked to this application
    ///
    /// # Returns
    /// The matching runs in submission order
    pub async fn list_runs(&self, application: Option<&str>) -> Result<Vec<PipelineRun>> {
        let url = format!("{}/pipeline/runs", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(application) = application {
            request = request.query(&[("application", application)]);
        }
        let response = request.send().await?;

        self.handle_response(response).await
    }
}
