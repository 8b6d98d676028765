//! Services manager: inventory and destination-side recreation of the
//! service instances bound to the copied applications.

use std::collections::HashMap;

use anyhow::{Context, Result};
use spacecopy_common::{
    ContextRef, ServiceCopyResult, ServiceInstance, UserProvidedService,
};

use crate::application::ports::{PlatformSession, ProgressReporter};
use crate::application::retry::{Backoff, Poll, poll_until, retry_with_backoff};
use crate::domain::error::{CopyError, is_not_found};
use crate::domain::service::{
    ServiceKind, UpsSelection, classify, selected_bound_apps, snapshot_key_name,
};

// ── Records ───────────────────────────────────────────────────────────────────

/// One source service instance scheduled for copy.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceInstanceRecord {
    /// The instance as read from the source, with `application_names`
    /// narrowed to the selected applications.
    pub instance: ServiceInstance,
    pub kind: ServiceKind,
    /// What to create at the destination for the user-provided kinds.
    pub user_provided: Option<UserProvidedService>,
}

impl ServiceInstanceRecord {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.instance.name
    }

    /// Selected applications bound to the instance at source.
    #[must_use]
    pub fn bound_apps(&self) -> &[String] {
        &self.instance.application_names
    }
}

/// Application name → destination instance guids, published per application
/// once every instance it was bound to has been created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppBindings {
    pending: HashMap<String, usize>,
    staged: HashMap<String, Vec<String>>,
    published: HashMap<String, Vec<String>>,
}

impl AppBindings {
    fn expecting(records: &[ServiceInstanceRecord]) -> Self {
        let mut pending: HashMap<String, usize> = HashMap::new();
        for record in records {
            for app in record.bound_apps() {
                *pending.entry(app.clone()).or_default() += 1;
            }
        }
        Self {
            pending,
            ..Self::default()
        }
    }

    /// Record that an instance bound to `apps` now exists as `guid`.
    fn complete(&mut self, apps: &[String], guid: &str) {
        for app in apps {
            self.staged.entry(app.clone()).or_default().push(guid.to_string());
            let Some(left) = self.pending.get_mut(app) else {
                continue;
            };
            *left = left.saturating_sub(1);
            if *left == 0 {
                self.pending.remove(app);
                let guids = self.staged.remove(app).unwrap_or_default();
                self.published.insert(app.clone(), guids);
            }
        }
    }

    /// Destination instance guids `app` must be bound to, once published.
    #[must_use]
    pub fn get(&self, app: &str) -> Option<&[String]> {
        self.published.get(app).map(Vec::as_slice)
    }
}

/// Service instances to copy plus what the copy produced so far.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServiceCollection {
    records: Vec<ServiceInstanceRecord>,
    created: HashMap<String, String>,
    bindings: AppBindings,
    results: Vec<ServiceCopyResult>,
}

impl ServiceCollection {
    #[must_use]
    pub fn new(records: Vec<ServiceInstanceRecord>) -> Self {
        Self {
            bindings: AppBindings::expecting(&records),
            records,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn records(&self) -> &[ServiceInstanceRecord] {
        &self.records
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Destination guid of a copied instance.
    #[must_use]
    pub fn destination_guid(&self, name: &str) -> Option<&str> {
        self.created.get(name).map(String::as_str)
    }

    /// Destination instance guids an application must be bound to.
    #[must_use]
    pub fn app_bindings(&self, app: &str) -> Option<&[String]> {
        self.bindings.get(app)
    }

    #[must_use]
    pub fn results(&self) -> &[ServiceCopyResult] {
        &self.results
    }
}

// ── Manager ───────────────────────────────────────────────────────────────────

/// Copies service instances from the source session to the destination.
pub struct ServicesManager<'a, S, D, R> {
    source: &'a S,
    dest: &'a D,
    reporter: &'a R,
    destination: ContextRef,
    backoff: Backoff,
    poll: Poll,
}

impl<'a, S, D, R> ServicesManager<'a, S, D, R>
where
    S: PlatformSession,
    D: PlatformSession,
    R: ProgressReporter,
{
    pub fn new(
        source: &'a S,
        dest: &'a D,
        reporter: &'a R,
        destination: ContextRef,
        backoff: Backoff,
        poll: Poll,
    ) -> Self {
        Self {
            source,
            dest,
            reporter,
            destination,
            backoff,
            poll,
        }
    }

    /// Inventory the source instances bound to `selected_apps` and classify
    /// them. Snapshot instances get a fresh service key whose credentials are
    /// carried to the destination.
    ///
    /// # Errors
    ///
    /// Any inventory, key creation or key read-back failure aborts; no partial
    /// collection is returned.
    pub async fn services_to_be_copied(
        &self,
        selected_apps: &[String],
        force_ups: &UpsSelection,
    ) -> Result<ServiceCollection> {
        let ups = self
            .source
            .user_provided_services()
            .await
            .context("listing user-provided services at source")?;
        let summaries = self
            .source
            .service_instances()
            .await
            .context("listing service instances at source")?;

        let mut records = Vec::new();
        for summary in summaries {
            let bound = selected_bound_apps(selected_apps, &summary.application_names);
            if bound.is_empty() {
                continue;
            }
            let mut instance = self
                .source
                .find_service_instance(&summary.name)
                .await
                .with_context(|| format!("reading service instance {}", summary.name))?;
            instance.application_names = bound;

            let kind = classify(&instance, force_ups);
            let user_provided = match kind {
                ServiceKind::UserProvided => {
                    let found = ups
                        .iter()
                        .find(|u| u.name == instance.name)
                        .ok_or_else(|| CopyError::not_found("user-provided service", &instance.name))?;
                    Some(UserProvidedService {
                        guid: String::new(),
                        ..found.clone()
                    })
                }
                ServiceKind::SnapshotAsUserProvided => Some(self.snapshot(&instance).await?),
                ServiceKind::RecreateManaged => {
                    if instance.plan.is_none() || instance.offering.is_none() {
                        anyhow::bail!(
                            "service instance '{}' has no plan or offering to recreate",
                            instance.name
                        );
                    }
                    None
                }
            };
            tracing::debug!(service = %instance.name, ?kind, apps = ?instance.application_names, "service to be copied");
            records.push(ServiceInstanceRecord {
                instance,
                kind,
                user_provided,
            });
        }
        Ok(ServiceCollection::new(records))
    }

    /// Replace the stale snapshot key of `instance`, create a fresh one and
    /// carry its credentials.
    async fn snapshot(&self, instance: &ServiceInstance) -> Result<UserProvidedService> {
        let key_name = snapshot_key_name(
            &instance.name,
            &self.destination.target,
            &self.destination.org,
            &self.destination.space,
        );
        if let Some(stale) = instance.keys.iter().find(|k| k.name == key_name) {
            tracing::debug!(service = %instance.name, key = %key_name, "deleting stale snapshot key");
            match self.source.delete_service_key(&stale.guid).await {
                Err(e) if !is_not_found(&e) => {
                    return Err(e.context(format!("deleting service key {key_name}")));
                }
                _ => {}
            }
        }
        self.reporter
            .step(&format!("creating service key for {}", instance.name));
        self.source
            .create_service_key(&instance.guid, &key_name)
            .await
            .with_context(|| format!("creating service key {key_name}"))?;
        let key = self
            .source
            .get_service_key(&instance.guid, &key_name)
            .await
            .with_context(|| format!("reading service key {key_name}"))?;
        Ok(UserProvidedService {
            name: instance.name.clone(),
            credentials: key.credentials,
            ..UserProvidedService::default()
        })
    }

    /// Create every collected instance at the destination, in inventory order.
    ///
    /// A same-named destination instance is unbound, stripped of its keys and
    /// deleted first when `recreate_existing` is set, otherwise kept and used
    /// as is.
    ///
    /// # Errors
    ///
    /// The first unrecoverable error aborts the remaining copies.
    pub async fn do_copy(
        &self,
        collection: &mut ServiceCollection,
        recreate_existing: bool,
    ) -> Result<()> {
        let ServiceCollection {
            records,
            created,
            bindings,
            results,
        } = collection;

        for record in records.iter() {
            let name = record.name();
            self.reporter.step(&format!("copying service {name}"));

            let existing = match self.dest.find_service_instance(name).await {
                Ok(instance) => Some(instance),
                Err(e) if is_not_found(&e) => None,
                Err(e) => return Err(e.context(format!("looking up {name} at destination"))),
            };

            let mut rebind = Vec::new();
            if let Some(existing) = existing {
                if !recreate_existing {
                    self.reporter
                        .warn(&format!("keeping existing service instance {name}"));
                    created.insert(name.to_string(), existing.guid.clone());
                    bindings.complete(record.bound_apps(), &existing.guid);
                    results.push(ServiceCopyResult {
                        name: name.to_string(),
                        kind: record.kind.into(),
                        guid: existing.guid,
                        reused: true,
                    });
                    continue;
                }
                rebind = self.tear_down(&existing).await?;
            }

            self.create(record).await?;

            let instance = self
                .dest
                .find_service_instance(name)
                .await
                .with_context(|| format!("reading back {name} at destination"))?;
            created.insert(name.to_string(), instance.guid.clone());

            self.rebind(&instance, &rebind).await?;
            bindings.complete(record.bound_apps(), &instance.guid);

            results.push(ServiceCopyResult {
                name: name.to_string(),
                kind: record.kind.into(),
                guid: instance.guid,
                reused: false,
            });
            self.reporter.success(&format!("copied service {name}"));
        }
        Ok(())
    }

    /// Unbind, strip keys and delete an existing destination instance, then
    /// wait until the name is free. Returns the guids of the applications
    /// that were bound to it.
    async fn tear_down(&self, existing: &ServiceInstance) -> Result<Vec<String>> {
        let dest = self.dest;
        let instance_guid = existing.guid.as_str();
        let mut unbound = Vec::new();

        for binding in &existing.bindings {
            let app_guid = binding.app_guid.as_str();
            tracing::debug!(service = %existing.name, app_guid, "unbinding application at destination");
            retry_with_backoff(self.backoff, "unbind service", move || async move {
                match dest.unbind_service(instance_guid, app_guid).await {
                    Err(e) if is_not_found(&e) => Ok(()),
                    other => other,
                }
            })
            .await
            .with_context(|| format!("unbinding {} from {app_guid}", existing.name))?;
            unbound.push(binding.app_guid.clone());
        }

        for key in &existing.keys {
            let key_guid = key.guid.as_str();
            tracing::debug!(service = %existing.name, key = %key.name, "deleting service key at destination");
            retry_with_backoff(self.backoff, "delete service key", move || async move {
                match dest.delete_service_key(key_guid).await {
                    Err(e) if is_not_found(&e) => Ok(()),
                    other => other,
                }
            })
            .await
            .with_context(|| format!("deleting service key {}", key.name))?;
        }

        let stripped = ServiceInstance {
            bindings: Vec::new(),
            keys: Vec::new(),
            ..existing.clone()
        };
        let stripped = &stripped;
        retry_with_backoff(self.backoff, "delete service instance", move || async move {
            dest.delete_service_instance(stripped).await
        })
        .await
        .with_context(|| format!("deleting existing {} at destination", existing.name))?;

        // Brokers may accept the delete and finish it asynchronously.
        let name = existing.name.as_str();
        poll_until(self.poll, &format!("deleting {name}"), move || async move {
            match dest.find_service_instance(name).await {
                Ok(_) => Ok(false),
                Err(e) if is_not_found(&e) => Ok(true),
                Err(e) => Err(e),
            }
        })
        .await
        .with_context(|| format!("waiting for {name} to disappear at destination"))?;
        Ok(unbound)
    }

    async fn create(&self, record: &ServiceInstanceRecord) -> Result<()> {
        let name = record.name();
        match record.kind {
            ServiceKind::UserProvided | ServiceKind::SnapshotAsUserProvided => {
                let ups = record
                    .user_provided
                    .as_ref()
                    .with_context(|| format!("no credentials captured for {name}"))?;
                tracing::debug!(service = name, kind = ?record.kind, "creating user-provided service at destination");
                self.dest
                    .create_user_provided_service(ups)
                    .await
                    .with_context(|| format!("creating user-provided service {name}"))
            }
            ServiceKind::RecreateManaged => {
                let instance = &record.instance;
                let label = instance
                    .offering
                    .as_ref()
                    .map(|o| o.label.as_str())
                    .unwrap_or_default();
                let plan = instance
                    .plan
                    .as_ref()
                    .map(|p| p.name.as_str())
                    .unwrap_or_default();
                let plan_guid = self.resolve_plan(label, plan).await?;
                tracing::debug!(service = name, label, plan, plan_guid = %plan_guid, "creating managed service at destination");
                self.dest
                    .create_service_instance(name, &plan_guid, &instance.params, &instance.tags)
                    .await
                    .with_context(|| format!("creating service instance {name}"))
            }
        }
    }

    /// Destination plan guid for an offering label and plan name.
    async fn resolve_plan(&self, label: &str, plan: &str) -> Result<String> {
        let offerings = self
            .dest
            .find_offerings_by_label(label)
            .await
            .with_context(|| format!("looking up offering {label} at destination"))?;
        for offering in offerings {
            let plans = self
                .dest
                .plans_for_offering(&offering.guid)
                .await
                .with_context(|| format!("listing plans of {label}"))?;
            if let Some(found) = plans.into_iter().find(|p| p.name == plan) {
                return Ok(found.guid);
            }
        }
        Err(CopyError::NoMatchingPlan {
            offering: label.to_string(),
            plan: plan.to_string(),
        }
        .into())
    }

    /// Rebind applications that were bound to a replaced instance and still
    /// exist at the destination.
    async fn rebind(&self, instance: &ServiceInstance, app_guids: &[String]) -> Result<()> {
        if app_guids.is_empty() {
            return Ok(());
        }
        let apps = self
            .dest
            .applications()
            .await
            .context("listing applications at destination")?;
        for guid in app_guids {
            if !apps.iter().any(|a| &a.guid == guid) {
                tracing::debug!(service = %instance.name, app_guid = %guid, "application gone, not rebinding");
                continue;
            }
            self.dest
                .bind_service(&instance.guid, guid)
                .await
                .with_context(|| format!("rebinding {guid} to {}", instance.name))?;
        }
        Ok(())
    }
}
