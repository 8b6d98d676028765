//! Applications manager: payload staging, recreation, binding, start and routes.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use spacecopy_cli::application::retry::{Backoff, Poll};
use spacecopy_cli::application::services::applications_manager::{
    ApplicationsManager, RouteOptions,
};
use spacecopy_cli::application::services::services_manager::ServicesManager;
use spacecopy_cli::domain::error::CopyError;
use spacecopy_cli::domain::route::HostTemplate;
use spacecopy_cli::domain::service::UpsSelection;
use spacecopy_common::{AppState, ContentKind, ContextRef, Domain};

use crate::fakes::{FakeSession, RecordingReporter, domain, fast_config};

struct World {
    source: FakeSession,
    dest: FakeSession,
    source_default: Domain,
    source_internal: Domain,
    dest_default: Domain,
    dest_internal: Domain,
}

fn world() -> World {
    let source_default = domain("d-src-apps", "apps.corp.local");
    let source_internal = domain("d-src-int", "internal.corp.local");
    let dest_default = domain("d-dst-apps", "apps.cloud.example.com");
    let dest_internal = domain("d-dst-int", "internal.cloud.example.com");
    World {
        source: FakeSession::new(
            "prod",
            "acme",
            "dev",
            &[source_default.clone(), source_internal.clone()],
        ),
        dest: FakeSession::new(
            "eu",
            "acme",
            "dev",
            &[dest_default.clone(), domain("d-dst-shop", "shop.cloud.example.com"), dest_internal.clone()],
        ),
        source_default,
        source_internal,
        dest_default,
        dest_internal,
    }
}

fn policies() -> (Backoff, Poll) {
    let config = fast_config();
    (Backoff::from(&config.retry), Poll::from(&config.start))
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(ToString::to_string).collect()
}

// ── Inventory ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn selected_apps_are_staged_once_with_digest() {
    let w = world();
    w.source.add_app("api", &[("api", &w.source_default)], b"abc");
    w.source.add_app("worker", &[], b"worker");
    let reporter = RecordingReporter::default();
    let (backoff, poll) = policies();
    let manager = ApplicationsManager::new(&w.source, &w.dest, &reporter, backoff, poll).unwrap();

    let collection = manager
        .applications_to_be_copied(&names(&["api", "api"]), ContentKind::Bits)
        .await
        .expect("inventory");

    assert_eq!(collection.records().len(), 1);
    let record = &collection.records()[0];
    assert_eq!(record.bytes, 3);
    assert_eq!(
        record.sha256,
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
    assert!(record.content.path().starts_with(manager.staging_dir()));
    assert!(record.content.path().exists());
    assert_eq!(collection.source_default_domain(), &w.source_default);
    assert_eq!(w.source.calls(), vec!["download:api:Bits"]);
}

#[tokio::test]
async fn missing_selected_app_fails_fast() {
    let w = world();
    w.source.add_app("api", &[], b"abc");
    let reporter = RecordingReporter::default();
    let (backoff, poll) = policies();
    let manager = ApplicationsManager::new(&w.source, &w.dest, &reporter, backoff, poll).unwrap();

    let err = manager
        .applications_to_be_copied(&names(&["ghost", "api"]), ContentKind::Bits)
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<CopyError>(),
        Some(CopyError::AppNotFound(name)) if name == "ghost"
    ));
    assert!(w.source.calls().is_empty(), "nothing downloaded");
}

#[tokio::test]
async fn close_removes_staging_directory() {
    let w = world();
    w.source.add_app("api", &[], b"abc");
    let reporter = RecordingReporter::default();
    let (backoff, poll) = policies();
    let manager = ApplicationsManager::new(&w.source, &w.dest, &reporter, backoff, poll).unwrap();
    manager
        .applications_to_be_copied(&names(&["api"]), ContentKind::Bits)
        .await
        .expect("inventory");
    let staging = manager.staging_dir().to_path_buf();
    assert!(staging.join("api.zip").exists());

    manager.close().expect("close");

    assert!(!staging.exists());
}

// ── Copy ──────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn copy_recreates_app_stopped_then_starts_it() {
    let w = world();
    w.source.add_app("api", &[("api", &w.source_default)], b"payload");
    let reporter = RecordingReporter::default();
    let (backoff, poll) = policies();
    let manager = ApplicationsManager::new(&w.source, &w.dest, &reporter, backoff, poll).unwrap();
    let collection = manager
        .applications_to_be_copied(&names(&["api"]), ContentKind::Bits)
        .await
        .unwrap();

    let results = manager
        .do_copy(&collection, &Default::default(), &RouteOptions::default())
        .await
        .expect("copy");

    let copied = w.dest.app("api").expect("created");
    assert_eq!(copied.params.space_guid.as_deref(), Some(w.dest.space.guid.as_str()));
    assert_eq!(copied.params.stack_guid, None);
    assert_eq!(copied.params.buildpack_url, None);
    assert_eq!(copied.params.health_check_type.as_deref(), Some("port"));
    assert_eq!(copied.params.memory, Some(256));
    assert_eq!(copied.params.state, Some(AppState::Started));

    let uploads = w.dest.state.borrow().uploads.clone();
    assert_eq!(uploads, vec![(copied.guid.clone(), ContentKind::Bits, b"payload".to_vec())]);

    assert_eq!(
        w.dest.calls(),
        vec![
            "create_app:api",
            "state:api:STARTED",
            "create_route:api.apps.cloud.example.com",
        ]
    );
    assert_eq!(results[0].routes, vec!["api.apps.cloud.example.com"]);
    assert_eq!(copied.routes[0].domain, w.dest_default);
}

#[tokio::test]
async fn droplet_is_uploaded_as_droplet() {
    let w = world();
    w.source.add_app("api", &[], b"droplet-bytes");
    let reporter = RecordingReporter::default();
    let (backoff, poll) = policies();
    let manager = ApplicationsManager::new(&w.source, &w.dest, &reporter, backoff, poll).unwrap();
    let collection = manager
        .applications_to_be_copied(&names(&["api"]), ContentKind::Droplet)
        .await
        .unwrap();
    assert!(collection.records()[0].content.path().ends_with("api.tgz"));

    manager
        .do_copy(&collection, &Default::default(), &RouteOptions::default())
        .await
        .expect("copy");

    let uploads = w.dest.state.borrow().uploads.clone();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].1, ContentKind::Droplet);
    assert_eq!(uploads[0].2, b"droplet-bytes");
}

#[tokio::test]
async fn copied_services_are_bound_before_start() {
    let w = world();
    w.source.add_app("api", &[], b"payload");
    w.source.add_user_provided("creds", Default::default(), &["api"]);
    let reporter = RecordingReporter::default();
    let (backoff, poll) = policies();
    let destination = ContextRef {
        target: "eu".into(),
        org: "acme".into(),
        space: "dev".into(),
    };
    let services = ServicesManager::new(&w.source, &w.dest, &reporter, destination, backoff, poll);
    let mut collection = services
        .services_to_be_copied(&names(&["api"]), &UpsSelection::default())
        .await
        .unwrap();
    services.do_copy(&mut collection, true).await.unwrap();
    let manager = ApplicationsManager::new(&w.source, &w.dest, &reporter, backoff, poll).unwrap();
    let apps = manager
        .applications_to_be_copied(&names(&["api"]), ContentKind::Bits)
        .await
        .unwrap();

    let results = manager
        .do_copy(&apps, &collection, &RouteOptions::default())
        .await
        .expect("copy");

    assert_eq!(
        w.dest.calls(),
        vec!["create_ups:creds", "create_app:api", "bind:creds:api", "state:api:STARTED"]
    );
    let creds_guid = w.dest.instance("creds").unwrap().guid;
    assert_eq!(results[0].bound_services, vec![creds_guid]);
}

#[tokio::test]
async fn custom_domain_maps_by_first_label_and_unmatched_route_is_skipped() {
    let w = world();
    let unmatched = domain("d-src-legacy", "legacy.corp.local");
    w.source
        .state
        .borrow_mut()
        .domains
        .push(unmatched.clone());
    w.source.add_app(
        "api",
        &[("api", &w.source_internal), ("old", &unmatched)],
        b"payload",
    );
    let reporter = RecordingReporter::default();
    let (backoff, poll) = policies();
    let manager = ApplicationsManager::new(&w.source, &w.dest, &reporter, backoff, poll).unwrap();
    let collection = manager
        .applications_to_be_copied(&names(&["api"]), ContentKind::Bits)
        .await
        .unwrap();

    let results = manager
        .do_copy(&collection, &Default::default(), &RouteOptions::default())
        .await
        .expect("skipped routes are not fatal");

    assert_eq!(results[0].routes, vec!["api.internal.cloud.example.com"]);
    assert_eq!(results[0].skipped_routes.len(), 1);
    assert_eq!(results[0].skipped_routes[0].url, "old.legacy.corp.local");
    assert_eq!(w.dest.app("api").unwrap().routes[0].domain, w.dest_internal);
    let warnings = reporter.warnings.borrow();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("old.legacy.corp.local"));
}

#[tokio::test]
async fn host_format_and_domain_override_shape_routes() {
    let w = world();
    w.source.add_app("api", &[("api", &w.source_default)], b"payload");
    let reporter = RecordingReporter::default();
    let (backoff, poll) = policies();
    let manager = ApplicationsManager::new(&w.source, &w.dest, &reporter, backoff, poll).unwrap();
    let collection = manager
        .applications_to_be_copied(&names(&["api"]), ContentKind::Bits)
        .await
        .unwrap();
    let routes = RouteOptions {
        host_format: Some(HostTemplate::parse("{{.host}}-{{.space}}-{{.org}}").unwrap()),
        domain: Some("internal.cloud.example.com".into()),
    };

    let results = manager
        .do_copy(&collection, &Default::default(), &routes)
        .await
        .expect("copy");

    assert_eq!(results[0].routes, vec!["api-dev-acme.internal.cloud.example.com"]);
}

#[tokio::test]
async fn unknown_domain_override_is_fatal() {
    let w = world();
    w.source.add_app("api", &[("api", &w.source_default)], b"payload");
    let reporter = RecordingReporter::default();
    let (backoff, poll) = policies();
    let manager = ApplicationsManager::new(&w.source, &w.dest, &reporter, backoff, poll).unwrap();
    let collection = manager
        .applications_to_be_copied(&names(&["api"]), ContentKind::Bits)
        .await
        .unwrap();
    let routes = RouteOptions {
        domain: Some("nowhere.example.com".into()),
        ..RouteOptions::default()
    };

    let result = manager.do_copy(&collection, &Default::default(), &routes).await;

    assert!(result.is_err());
    assert!(w.dest.calls().is_empty(), "nothing created");
}

#[tokio::test]
async fn existing_destination_app_and_colliding_route_are_replaced() {
    let w = world();
    w.source.add_app("api", &[("api", &w.source_default)], b"new");
    w.dest.add_app("api", &[("api-old", &w.dest_default)], b"old");
    w.dest.add_app("other", &[("api", &w.dest_default)], b"other");
    let reporter = RecordingReporter::default();
    let (backoff, poll) = policies();
    let manager = ApplicationsManager::new(&w.source, &w.dest, &reporter, backoff, poll).unwrap();
    let collection = manager
        .applications_to_be_copied(&names(&["api"]), ContentKind::Bits)
        .await
        .unwrap();

    manager
        .do_copy(&collection, &Default::default(), &RouteOptions::default())
        .await
        .expect("copy");

    assert_eq!(
        w.dest.calls(),
        vec![
            "delete_route:api-old.apps.cloud.example.com",
            "delete_app:api",
            "create_app:api",
            "state:api:STARTED",
            "delete_route:api.apps.cloud.example.com",
            "create_route:api.apps.cloud.example.com",
        ]
    );
    let apps = w.dest.state.borrow().apps.clone();
    assert_eq!(apps.iter().filter(|a| a.name == "api").count(), 1);
    assert!(w.dest.app("other").unwrap().routes.is_empty());
}

#[tokio::test(start_paused = true)]
async fn start_is_retried_until_accepted() {
    let w = world();
    w.source.add_app("api", &[], b"payload");
    w.dest.state.borrow_mut().start_rejections = 3;
    let reporter = RecordingReporter::default();
    let (backoff, poll) = policies();
    let manager = ApplicationsManager::new(&w.source, &w.dest, &reporter, backoff, poll).unwrap();
    let collection = manager
        .applications_to_be_copied(&names(&["api"]), ContentKind::Bits)
        .await
        .unwrap();

    manager
        .do_copy(&collection, &Default::default(), &RouteOptions::default())
        .await
        .expect("copy");

    assert_eq!(w.dest.app("api").unwrap().params.state, Some(AppState::Started));
}

#[tokio::test(start_paused = true)]
async fn start_never_accepted_times_out_with_last_rejection() {
    let w = world();
    w.source.add_app("api", &[], b"payload");
    w.dest.state.borrow_mut().start_rejections = u32::MAX;
    let reporter = RecordingReporter::default();
    let (backoff, poll) = policies();
    let manager = ApplicationsManager::new(&w.source, &w.dest, &reporter, backoff, poll).unwrap();
    let collection = manager
        .applications_to_be_copied(&names(&["api"]), ContentKind::Bits)
        .await
        .unwrap();

    let err = manager
        .do_copy(&collection, &Default::default(), &RouteOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err.downcast_ref::<CopyError>(),
        Some(CopyError::Timeout { secs: 1, .. })
    ));
    let message = format!("{err:#}");
    assert!(message.contains("did not complete within 1s"), "{message}");
    assert!(message.ends_with("staging in progress"), "{message}");
    assert_eq!(w.dest.app("api").unwrap().params.state, Some(AppState::Stopped));
}
