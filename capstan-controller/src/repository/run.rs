//! Pipeline run record persistence
//!
//! Runs are keyed by id and labeled with their application (when linked)
//! so per-application history is one labeled list away.

use capstan_core::domain::object::{OWNER_LABEL, ObjectKey};
use capstan_core::domain::run::PipelineRun;
use capstan_core::error::StoreError;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::repository::{KIND_PIPELINE_RUN, SYSTEM_NAMESPACE, decode};
use crate::store::ObjectStore;

fn record_key(id: Uuid) -> ObjectKey {
    ObjectKey::new(KIND_PIPELINE_RUN, SYSTEM_NAMESPACE, id.to_string())
}

/// Persists a run record
pub async fn save(
    store: &dyn ObjectStore,
    run: &PipelineRun,
) -> Result<(), StoreError> {
    let mut labels = BTreeMap::new();
    if let Some(application) = &run.application {
        labels.insert(OWNER_LABEL.to_string(), application.clone());
    }
    super::save_record(store, record_key(run.id), labels, run).await
}

/// Finds a run by id
pub async fn find_by_id(
    store: &dyn ObjectStore,
    id: Uuid,
) -> Result<Option<PipelineRun>, StoreError> {
    match store.get(&record_key(id)).await {
        Ok(live) => Ok(Some(decode(&live)?)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Lists runs in submission order, optionally for one application
pub async fn list(
    store: &dyn ObjectStore,
    application: Option<&str>,
) -> Result<Vec<PipelineRun>, StoreError> {
    let selector = application.map(|app| (OWNER_LABEL, app));
    let records = store.list(SYSTEM_NAMESPACE, selector).await?;
    let mut runs = Vec::new();
    for live in records
        .iter()
        .filter(|live| live.key.kind == KIND_PIPELINE_RUN)
    {
        runs.push(decode::<PipelineRun>(live)?);
    }
    runs.sort_by_key(|run| run.submitted_at);
    Ok(runs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use capstan_core::domain::run::RunOutcome;

    #[tokio::test]
    async fn test_run_round_trip_and_application_filter() {
        let store = MemoryStore::new();
        let linked = PipelineRun::pending(
            "main",
            "shop:v2",
            Some("shop".to_string()),
        );
        let unlinked = PipelineRun::pending("main", "tool:v1", None);
        save(&store, &linked).await.unwrap();
        save(&store, &unlinked).await.unwrap();

        let found = find_by_id(&store, linked.id).await.unwrap().unwrap();
        assert_eq!(found.id, linked.id);
        assert_eq!(found.outcome, RunOutcome::Pending);

        let all = list(&store, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let shop_only = list(&store, Some("shop")).await.unwrap();
        assert_eq!(shop_only.len(), 1);
        assert_eq!(shop_only[0].id, linked.id);
    }

    #[tokio::test]
    async fn test_terminal_transition_persists() {
        let store = MemoryStore::new();
        let mut run = PipelineRun::pending("main", "shop:v2", None);
        save(&store, &run).await.unwrap();

        run.outcome = RunOutcome::Succeeded;
        run.image_digest = Some("sha256:abcd".to_string());
        run.finished_at = Some(chrono::Utc::now());
        save(&store, &run).await.unwrap();

        let found = find_by_id(&store, run.id).await.unwrap().unwrap();
        assert!(found.is_terminal());
        assert_eq!(found.image_digest.as_deref(), Some("sha256:abcd"));
    }
}
