use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

use multisite::core::catalog::{EntityCatalog, MemoryCatalog, MemoryConnector, QueryError};
use multisite::core::location::{Location, LocationError, LocationService};
use multisite::core::models::{Component, EntityType, JobStatus, LocationRecord, SelectionItem};
use multisite::core::transfer_engine::{
    TransferEngine, TransferError, TransferOptions, TransferRequest, TransferSpawner,
    TransferSummary,
};

#[derive(Clone, Copy)]
enum Failure {
    NotInSource,
    Other,
    CatalogOffline,
}

/// Location service that records presence instead of moving bytes and
/// fails scripted components.
#[derive(Default)]
struct ScriptedService {
    failures: HashMap<String, Failure>,
    attempts: Mutex<Vec<String>>,
    copies: Mutex<usize>,
}

impl ScriptedService {
    fn failing(failures: &[(&str, Failure)]) -> Self {
        Self {
            failures: failures
                .iter()
                .map(|(id, f)| (id.to_string(), *f))
                .collect(),
            ..Default::default()
        }
    }

    fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    fn copies(&self) -> usize {
        *self.copies.lock().unwrap()
    }
}

#[async_trait]
impl LocationService for ScriptedService {
    async fn add_component(
        &self,
        catalog: &dyn EntityCatalog,
        component: &Component,
        source: &Location,
        target: &Location,
    ) -> Result<(), LocationError> {
        self.attempts.lock().unwrap().push(component.id.clone());

        if catalog
            .resource_identifier(&component.id, &target.id)
            .await?
            .is_some()
        {
            return Err(LocationError::ComponentInLocation {
                component: component.id.clone(),
                location: target.name.clone(),
            });
        }

        match self.failures.get(&component.id) {
            Some(Failure::NotInSource) => Err(LocationError::ComponentNotInLocation {
                component: component.id.clone(),
                location: source.name.clone(),
            }),
            Some(Failure::Other) => Err(LocationError::Location("disk full".into())),
            Some(Failure::CatalogOffline) => Err(QueryError::Unreachable("catalog went away".into()).into()),
            None => {
                *self.copies.lock().unwrap() += 1;
                catalog
                    .add_component_location(&component.id, &target.id, &component.id)
                    .await?;
                Ok(())
            }
        }
    }
}

fn location(id: &str) -> Location {
    Location::from_record(LocationRecord {
        id: id.to_string(),
        name: id.to_string(),
        label: None,
    })
}

/// One version holding `count` components, all present in vault-A.
fn studio(count: usize) -> MemoryCatalog {
    let catalog = MemoryCatalog::new();
    catalog.add_location("vault-A", "vault-A");
    catalog.add_location("vault-B", "vault-B");
    catalog.add_project("p1", "show");
    catalog.add_version("v1", "p1", "plate", 1);
    for i in 1..=count {
        let id = format!("c{}", i);
        catalog.add_component(&id, "v1", &format!("part{}", i), ".exr");
        catalog.set_presence(&id, "vault-A", &id);
    }
    catalog
}

fn request(selection: Vec<SelectionItem>, options: TransferOptions) -> TransferRequest {
    let mut request = TransferRequest::new(selection, location("vault-A"), location("vault-B"));
    request.options = options;
    request.user_id = Some("user-1".into());
    request
}

fn version_selection() -> Vec<SelectionItem> {
    vec![SelectionItem::new(EntityType::Version, "v1")]
}

async fn run(
    catalog: &MemoryCatalog,
    service: Arc<ScriptedService>,
    request: TransferRequest,
) -> Result<TransferSummary, TransferError> {
    let engine = TransferEngine::new(Arc::new(MemoryConnector::new(catalog.clone())), service);
    engine.run(request, CancellationToken::new()).await
}

fn job_status(catalog: &MemoryCatalog, job_id: &str) -> JobStatus {
    catalog
        .jobs()
        .into_iter()
        .find(|j| j.id == job_id)
        .map(|j| j.status)
        .expect("job exists")
}

/// Committed descriptions with consecutive repeats collapsed.
fn description_sequence(catalog: &MemoryCatalog, job_id: &str) -> Vec<String> {
    let mut descriptions = catalog.job_descriptions(job_id);
    descriptions.dedup();
    descriptions
}

#[tokio::test]
async fn successful_batch_reports_each_step() {
    let catalog = studio(3);
    let service = Arc::new(ScriptedService::default());
    let request = request(version_selection(), TransferOptions::default());
    let job_id = request.job_id.clone();

    let summary = run(&catalog, service.clone(), request).await.unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.copied, 3);
    assert_eq!(job_status(&catalog, &job_id), JobStatus::Done);
    assert_eq!(
        description_sequence(&catalog, &job_id),
        vec![
            "Transfer components (Gathering...)",
            "Transfer components (1 of 3)",
            "Transfer components (2 of 3)",
            "Transfer components (3 of 3)",
        ]
    );
    assert_eq!(service.attempts(), vec!["c1", "c2", "c3"]);
}

#[tokio::test]
async fn empty_selection_finishes_done() {
    let catalog = studio(3);
    let service = Arc::new(ScriptedService::default());
    let request = request(Vec::new(), TransferOptions::default());
    let job_id = request.job_id.clone();

    let summary = run(&catalog, service.clone(), request).await.unwrap();

    assert_eq!(summary, TransferSummary::default());
    assert_eq!(job_status(&catalog, &job_id), JobStatus::Done);
    assert_eq!(
        description_sequence(&catalog, &job_id),
        vec!["Transfer components (Gathering...)"]
    );
    assert!(service.attempts().is_empty());
}

#[tokio::test]
async fn selection_without_components_in_source_finishes_done() {
    let catalog = studio(2);
    let service = Arc::new(ScriptedService::default());
    let mut request = request(version_selection(), TransferOptions::default());
    request.source = location("vault-B");
    request.target = location("vault-A");
    let job_id = request.job_id.clone();

    let summary = run(&catalog, service, request).await.unwrap();
    assert_eq!(summary.total, 0);
    assert_eq!(job_status(&catalog, &job_id), JobStatus::Done);
}

#[tokio::test]
async fn missing_component_aborts_without_ignore_flags() {
    let catalog = studio(4);
    let service = Arc::new(ScriptedService::failing(&[("c2", Failure::NotInSource)]));
    let request = request(version_selection(), TransferOptions::default());
    let job_id = request.job_id.clone();

    let err = run(&catalog, service.clone(), request).await.unwrap_err();

    assert!(matches!(err, TransferError::Location { ref component, .. } if component == "c2"));
    assert_eq!(service.attempts(), vec!["c1", "c2"]);
    assert_eq!(job_status(&catalog, &job_id), JobStatus::Failed);
    assert!(!catalog.is_present("c3", "vault-B"));
}

#[tokio::test]
async fn ignore_missing_skips_and_continues() {
    let catalog = studio(3);
    let service = Arc::new(ScriptedService::failing(&[("c2", Failure::NotInSource)]));
    let options = TransferOptions {
        ignore_missing: true,
        ignore_location_errors: false,
    };
    let request = request(version_selection(), options);
    let job_id = request.job_id.clone();

    let summary = run(&catalog, service.clone(), request).await.unwrap();

    assert_eq!(service.attempts(), vec!["c1", "c2", "c3"]);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.copied, 2);
    assert_eq!(job_status(&catalog, &job_id), JobStatus::Done);
    assert!(catalog.is_present("c3", "vault-B"));
}

#[tokio::test]
async fn ignore_missing_does_not_cover_other_location_errors() {
    let catalog = studio(3);
    let service = Arc::new(ScriptedService::failing(&[("c1", Failure::Other)]));
    let options = TransferOptions {
        ignore_missing: true,
        ignore_location_errors: false,
    };
    let request = request(version_selection(), options);
    let job_id = request.job_id.clone();

    assert!(run(&catalog, service.clone(), request).await.is_err());
    assert_eq!(service.attempts(), vec!["c1"]);
    assert_eq!(job_status(&catalog, &job_id), JobStatus::Failed);
}

#[tokio::test]
async fn ignore_location_errors_tolerates_every_recoverable_failure() {
    let catalog = studio(4);
    let service = Arc::new(ScriptedService::failing(&[
        ("c1", Failure::Other),
        ("c2", Failure::NotInSource),
        ("c4", Failure::Other),
    ]));
    let options = TransferOptions {
        ignore_missing: false,
        ignore_location_errors: true,
    };
    let request = request(version_selection(), options);
    let job_id = request.job_id.clone();

    let summary = run(&catalog, service.clone(), request).await.unwrap();

    assert_eq!(service.attempts(), vec!["c1", "c2", "c3", "c4"]);
    assert_eq!(summary.skipped, 3);
    assert_eq!(summary.copied, 1);
    assert_eq!(job_status(&catalog, &job_id), JobStatus::Done);
}

#[tokio::test]
async fn catalog_failure_during_copy_aborts_despite_ignore_flags() {
    let catalog = studio(3);
    let service = Arc::new(ScriptedService::failing(&[("c2", Failure::CatalogOffline)]));
    let options = TransferOptions {
        ignore_missing: true,
        ignore_location_errors: true,
    };
    let request = request(version_selection(), options);
    let job_id = request.job_id.clone();

    let err = run(&catalog, service.clone(), request).await.unwrap_err();

    assert!(matches!(
        err,
        TransferError::Location {
            ref component,
            source: LocationError::Query(QueryError::Unreachable(_)),
        } if component == "c2"
    ));
    assert_eq!(service.attempts(), vec!["c1", "c2"]);
    assert_eq!(job_status(&catalog, &job_id), JobStatus::Failed);
    assert!(!catalog.is_present("c3", "vault-B"));
}

#[tokio::test]
async fn component_query_failure_fails_the_job() {
    let catalog = studio(2);
    catalog.fail_component_queries(true);
    let service = Arc::new(ScriptedService::default());
    let request = request(version_selection(), TransferOptions::default());
    let job_id = request.job_id.clone();

    let err = run(&catalog, service.clone(), request).await.unwrap_err();

    assert!(matches!(err, TransferError::Resolve(_)));
    assert_eq!(job_status(&catalog, &job_id), JobStatus::Failed);
    assert_eq!(
        description_sequence(&catalog, &job_id),
        vec!["Transfer components (Gathering...)"]
    );
    assert!(service.attempts().is_empty());
}

#[tokio::test]
async fn rerunning_a_finished_transfer_copies_nothing() {
    let catalog = studio(3);
    for id in ["c1", "c2", "c3"] {
        catalog.set_presence(id, "vault-B", id);
    }

    for _ in 0..2 {
        let service = Arc::new(ScriptedService::default());
        let request = request(version_selection(), TransferOptions::default());
        let job_id = request.job_id.clone();

        let summary = run(&catalog, service.clone(), request).await.unwrap();

        assert_eq!(summary.already_present, 3);
        assert_eq!(service.copies(), 0);
        assert_eq!(service.attempts().len(), 3);
        assert_eq!(job_status(&catalog, &job_id), JobStatus::Done);
    }
}

#[tokio::test]
async fn cancelled_transfer_fails_before_next_component() {
    let catalog = studio(3);
    let service = Arc::new(ScriptedService::default());
    let request = request(version_selection(), TransferOptions::default());
    let job_id = request.job_id.clone();

    let engine = TransferEngine::new(
        Arc::new(MemoryConnector::new(catalog.clone())),
        service.clone(),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = engine.run(request, cancel).await.unwrap_err();
    assert!(matches!(err, TransferError::Cancelled));
    assert!(service.attempts().is_empty());
    assert_eq!(job_status(&catalog, &job_id), JobStatus::Failed);
}

#[tokio::test]
async fn unreachable_catalog_creates_no_job() {
    let catalog = studio(1);
    catalog.set_unreachable(true);
    let service = Arc::new(ScriptedService::default());

    let err = run(&catalog, service, request(version_selection(), TransferOptions::default()))
        .await
        .unwrap_err();

    assert!(matches!(err, TransferError::Connect(_)));
    catalog.set_unreachable(false);
    assert!(catalog.jobs().is_empty());
}

#[tokio::test]
async fn spawned_transfers_use_their_own_connection() {
    let catalog = studio(2);
    let connector = MemoryConnector::new(catalog.clone());
    let service = Arc::new(ScriptedService::default());
    let spawner = TransferSpawner::new(TransferEngine::new(Arc::new(connector.clone()), service));

    let first = spawner.spawn(request(version_selection(), TransferOptions::default()));
    let second = spawner.spawn(request(vec![], TransferOptions::default()));
    let first_id = first.job_id().to_string();

    let summary = first.join().await.unwrap();
    second.join().await.unwrap();
    spawner.wait_idle().await;

    assert_eq!(summary.copied, 2);
    assert_eq!(connector.connections(), 2);
    assert_eq!(spawner.active(), 0);
    assert_eq!(job_status(&catalog, &first_id), JobStatus::Done);
}
