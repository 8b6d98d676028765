//! Cloud Controller v2 session: implements every platform port over HTTP.
//!
//! Requests carry the cf CLI access token. A 401 triggers one refresh through
//! the UAA `refresh_token` grant; the refreshed token is kept in memory only.

use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::StreamExt as _;
use indicatif::ProgressBar;
use reqwest::header::AUTHORIZATION;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use spacecopy_common::{
    AppParams, AppState, Application, ContentKind, Credentials, Domain, OrgRef, Route,
    ServiceBinding, ServiceInstance, ServiceKey, ServiceOffering, ServiceOfferingRef, ServicePlan,
    ServicePlanRef, SpaceRef, UserProvidedService,
};
use thiserror::Error;
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

use crate::application::ports::{
    ApplicationRepository, BindingRepository, ContentTransfer, DomainRepository, OrgDirectory,
    RouteRepository, ServiceKeyRepository, ServiceRepository, SessionContext, SessionProvider,
    TargetRegistry,
};
use crate::domain::error::{CopyError, is_not_found};
use crate::infra::cf_config::{CfConfig, default_config_path};

/// Builds the progress bar shown while a payload is transferred.
pub type ProgressFactory = fn(u64, &str) -> ProgressBar;

const CHUNK: usize = 64 * 1024;

/// A failed control-plane request.
#[derive(Debug, Error)]
#[error("{method} {path} failed ({status}): {description}")]
pub struct CcApiError {
    pub method: String,
    pub path: String,
    pub status: u16,
    pub error_code: String,
    pub description: String,
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct Page<T> {
    #[serde(default)]
    next_url: Option<String>,
    #[serde(default = "Vec::new")]
    resources: Vec<Resource<T>>,
}

#[derive(Debug, Deserialize)]
struct Resource<T> {
    metadata: Metadata,
    entity: T,
}

#[derive(Debug, Deserialize)]
struct Metadata {
    guid: String,
}

#[derive(Debug, Default, Deserialize)]
struct CcErrorBody {
    #[serde(default)]
    description: String,
    #[serde(default)]
    error_code: String,
}

#[derive(Debug, Deserialize)]
struct NamedEntity {
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpaceSummary {
    #[serde(default)]
    apps: Vec<AppSummary>,
    #[serde(default)]
    services: Vec<ServiceSummary>,
}

#[derive(Debug, Deserialize)]
struct AppSummary {
    guid: String,
    #[serde(default)]
    routes: Vec<RouteSummary>,
    #[serde(default)]
    service_names: Vec<String>,
    #[serde(flatten)]
    params: AppParams,
}

#[derive(Debug, Deserialize)]
struct RouteSummary {
    guid: String,
    #[serde(default)]
    host: String,
    #[serde(default)]
    path: Option<String>,
    domain: DomainSummary,
}

#[derive(Debug, Deserialize)]
struct DomainSummary {
    guid: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ServiceSummary {
    guid: String,
    name: String,
    #[serde(default)]
    service_plan: Option<PlanSummary>,
}

#[derive(Debug, Deserialize)]
struct PlanSummary {
    guid: String,
    name: String,
    service: OfferingSummary,
}

#[derive(Debug, Deserialize)]
struct OfferingSummary {
    guid: String,
    label: String,
}

#[derive(Debug, Deserialize)]
struct InstanceEntity {
    name: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    service_plan_guid: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    service_bindings_url: Option<String>,
    #[serde(default)]
    service_keys_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlanEntity {
    name: String,
    service_guid: String,
}

#[derive(Debug, Deserialize)]
struct OfferingEntity {
    label: String,
}

#[derive(Debug, Deserialize)]
struct BindingEntity {
    app_guid: String,
}

#[derive(Debug, Deserialize)]
struct KeyEntity {
    name: String,
    #[serde(default)]
    credentials: Credentials,
}

#[derive(Debug, Deserialize)]
struct UpsEntity {
    name: String,
    #[serde(default)]
    credentials: Credentials,
    #[serde(default)]
    syslog_drain_url: Option<String>,
    #[serde(default)]
    route_service_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RouteEntity {
    #[serde(default)]
    host: String,
    #[serde(default)]
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AppEntity {
    #[serde(flatten)]
    params: AppParams,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "bearer")]
    token_type: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

fn bearer() -> String {
    "bearer".to_string()
}

// ── Mapping ───────────────────────────────────────────────────────────────────

fn applications_from_summary(summary: &SpaceSummary) -> Vec<Application> {
    summary
        .apps
        .iter()
        .map(|app| Application {
            guid: app.guid.clone(),
            name: app.params.name.clone().unwrap_or_default(),
            params: app.params.clone(),
            routes: app
                .routes
                .iter()
                .map(|r| Route {
                    guid: r.guid.clone(),
                    host: r.host.clone(),
                    domain: Domain {
                        guid: r.domain.guid.clone(),
                        name: r.domain.name.clone(),
                        shared: false,
                    },
                    path: r.path.clone().filter(|p| !p.is_empty()),
                })
                .collect(),
            service_names: app.service_names.clone(),
        })
        .collect()
}

fn instances_from_summary(summary: &SpaceSummary) -> Vec<ServiceInstance> {
    summary
        .services
        .iter()
        .map(|s| ServiceInstance {
            guid: s.guid.clone(),
            name: s.name.clone(),
            user_provided: s.service_plan.is_none(),
            plan: s.service_plan.as_ref().map(|p| ServicePlanRef {
                guid: p.guid.clone(),
                name: p.name.clone(),
            }),
            offering: s.service_plan.as_ref().map(|p| ServiceOfferingRef {
                guid: p.service.guid.clone(),
                label: p.service.label.clone(),
            }),
            application_names: summary
                .apps
                .iter()
                .filter(|a| a.service_names.contains(&s.name))
                .filter_map(|a| a.params.name.clone())
                .collect(),
            ..ServiceInstance::default()
        })
        .collect()
}

/// `true` when the broker does not support fetching instance parameters.
fn parameters_unavailable(err: &anyhow::Error) -> bool {
    is_not_found(err)
        || err
            .chain()
            .filter_map(|cause| cause.downcast_ref::<CcApiError>())
            .any(|e| e.error_code.ends_with("NotSupported"))
}

fn delete_app_query(recursive: bool) -> &'static [(&'static str, &'static str)] {
    if recursive {
        &[("recursive", "true")]
    } else {
        &[]
    }
}

fn path_of(url: &str) -> &str {
    url.find("/v2/").map_or(url, |i| &url[i..])
}

// ── Session ───────────────────────────────────────────────────────────────────

struct Tokens {
    access: String,
    refresh: String,
}

/// Authenticated session against one Cloud Controller endpoint.
pub struct CloudControllerSession {
    api: String,
    uaa: String,
    oauth_client: String,
    oauth_secret: String,
    client: Client,
    transfer: Client,
    tokens: Mutex<Tokens>,
    target: String,
    username: String,
    org: OrgRef,
    space: SpaceRef,
    progress: ProgressFactory,
}

impl CloudControllerSession {
    /// Session for the endpoint and credentials of a cf CLI config.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP clients cannot be built.
    pub fn new(
        config: &CfConfig,
        target: &str,
        timeout: Duration,
        progress: ProgressFactory,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(config.ssl_disabled)
            .build()
            .context("failed to create HTTP client")?;
        let transfer = Client::builder()
            .connect_timeout(timeout)
            .danger_accept_invalid_certs(config.ssl_disabled)
            .build()
            .context("failed to create HTTP client")?;
        Ok(Self {
            api: config.target.trim_end_matches('/').to_string(),
            uaa: config.token_endpoint().trim_end_matches('/').to_string(),
            oauth_client: config.oauth_client().to_string(),
            oauth_secret: config.uaa_oauth_client_secret.clone(),
            client,
            transfer,
            tokens: Mutex::new(Tokens {
                access: config.access_token.clone(),
                refresh: config.refresh_token.clone(),
            }),
            target: target.to_string(),
            username: config.username(),
            org: config.org(),
            space: config.space(),
            progress,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api, path)
    }

    fn access_token(&self) -> String {
        self.tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .access
            .clone()
    }

    async fn refresh_token(&self) -> Result<String> {
        let refresh = self
            .tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .refresh
            .clone();
        if refresh.is_empty() {
            anyhow::bail!("access token expired and no refresh token available; run 'cf login'");
        }
        tracing::debug!(uaa = %self.uaa, "refreshing access token");
        let resp = self
            .client
            .post(format!("{}/oauth/token", self.uaa))
            .basic_auth(&self.oauth_client, Some(&self.oauth_secret))
            .form(&[("grant_type", "refresh_token"), ("refresh_token", &refresh)])
            .send()
            .await
            .context("token refresh request failed")?;
        let resp = check("POST", resp).await?;
        let token: TokenResponse = resp.json().await.context("cannot parse token response")?;
        let access = format!("{} {}", token.token_type, token.access_token);
        let mut tokens = self.tokens.lock().unwrap_or_else(PoisonError::into_inner);
        tokens.access.clone_from(&access);
        if let Some(refresh) = token.refresh_token {
            tokens.refresh = refresh;
        }
        Ok(access)
    }

    /// Send a request built by `build`, refreshing the token once on 401.
    async fn send<F>(&self, method: &str, build: F) -> Result<Response>
    where
        F: Fn(&str) -> Result<RequestBuilder>,
    {
        let resp = build(&self.access_token())?
            .send()
            .await
            .with_context(|| format!("{method} request failed"))?;
        let resp = if resp.status() == StatusCode::UNAUTHORIZED {
            let token = self.refresh_token().await?;
            build(&token)?
                .send()
                .await
                .with_context(|| format!("{method} request failed"))?
        } else {
            resp
        };
        check(method, resp).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        tracing::debug!(%url, "GET");
        let resp = self
            .send("GET", |token| Ok(self.client.get(&url).header(AUTHORIZATION, token)))
            .await?;
        resp.json()
            .await
            .with_context(|| format!("cannot parse response of {path}"))
    }

    /// Every resource of a paginated listing.
    async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<Resource<T>>> {
        let mut url = self.url(path);
        let mut query = Some(query);
        let mut all = Vec::new();
        loop {
            tracing::debug!(%url, "GET");
            let q = query.take();
            let resp = self
                .send("GET", |token| {
                    let req = self.client.get(&url).header(AUTHORIZATION, token);
                    Ok(match q {
                        Some(q) => req.query(q),
                        None => req,
                    })
                })
                .await?;
            let page: Page<T> = resp
                .json()
                .await
                .with_context(|| format!("cannot parse listing of {path}"))?;
            all.extend(page.resources);
            match page.next_url {
                Some(next) if !next.is_empty() => url = self.url(path_of(&next)),
                _ => return Ok(all),
            }
        }
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> Result<T> {
        let url = self.url(path);
        tracing::debug!(%url, "POST");
        let resp = self
            .send("POST", |token| {
                Ok(self
                    .client
                    .post(&url)
                    .header(AUTHORIZATION, token)
                    .query(query)
                    .json(body))
            })
            .await?;
        resp.json()
            .await
            .with_context(|| format!("cannot parse response of {path}"))
    }

    async fn put(&self, path: &str, body: Option<&serde_json::Value>) -> Result<()> {
        let url = self.url(path);
        tracing::debug!(%url, "PUT");
        self.send("PUT", |token| {
            let req = self.client.put(&url).header(AUTHORIZATION, token);
            Ok(match body {
                Some(body) => req.json(body),
                None => req,
            })
        })
        .await?;
        Ok(())
    }

    async fn delete(&self, path: &str, query: &[(&str, &str)]) -> Result<()> {
        let url = self.url(path);
        tracing::debug!(%url, "DELETE");
        self.send("DELETE", |token| {
            Ok(self
                .client
                .delete(&url)
                .header(AUTHORIZATION, token)
                .query(query))
        })
        .await?;
        Ok(())
    }

    async fn space_summary(&self) -> Result<SpaceSummary> {
        self.get_json(&format!("/v2/spaces/{}/summary", self.space.guid))
            .await
    }

    /// Provisioning parameters of a managed instance. Brokers that cannot
    /// report them yield an empty map.
    async fn instance_parameters(&self, instance_guid: &str) -> Result<Credentials> {
        let path = format!("/v2/service_instances/{instance_guid}/parameters");
        match self.get_json::<Credentials>(&path).await {
            Ok(params) => Ok(params),
            Err(e) if parameters_unavailable(&e) => {
                tracing::debug!(instance_guid, error = %format!("{e:#}"), "instance parameters not available");
                Ok(Credentials::new())
            }
            Err(e) => Err(e.context(format!("reading parameters of service instance {instance_guid}"))),
        }
    }

    async fn upload(&self, path: &str, file: &Path, form: impl Fn(Part) -> Form) -> Result<()> {
        let len = tokio::fs::metadata(file)
            .await
            .with_context(|| format!("cannot stat {}", file.display()))?
            .len();
        let label = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let pb = (self.progress)(len, &format!("uploading {label}"));
        let url = self.url(path);
        tracing::debug!(%url, bytes = len, "PUT multipart");
        let result = self
            .send("PUT", |token| {
                let part = Part::stream_with_length(file_body(file, &pb)?, len)
                    .file_name(label.clone());
                Ok(self
                    .transfer
                    .put(&url)
                    .header(AUTHORIZATION, token)
                    .multipart(form(part)))
            })
            .await;
        pb.finish_and_clear();
        result.map(|_| ())
    }
}

/// Stream a file as a request body, advancing `pb` as chunks are read.
fn file_body(path: &Path, pb: &ProgressBar) -> Result<reqwest::Body> {
    let file = std::fs::File::open(path).with_context(|| format!("cannot open {}", path.display()))?;
    let file = tokio::fs::File::from_std(file);
    let pb = pb.clone();
    pb.set_position(0);
    let stream = futures_util::stream::try_unfold((file, pb), |(mut file, pb)| async move {
        let mut buf = vec![0u8; CHUNK];
        let n = file.read(&mut buf).await?;
        if n == 0 {
            return Ok::<_, std::io::Error>(None);
        }
        buf.truncate(n);
        pb.inc(n as u64);
        Ok(Some((buf, (file, pb))))
    });
    Ok(reqwest::Body::wrap_stream(stream))
}

/// Turn a non-success response into an error. 404 and `*NotFound` error
/// codes become [`CopyError::NotFound`].
async fn check(method: &str, resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let path = resp.url().path().to_string();
    let text = resp.text().await.unwrap_or_default();
    let body: CcErrorBody = serde_json::from_str(&text).unwrap_or_default();
    tracing::debug!(method, %path, status = status.as_u16(), body = %text, "request failed");
    if status == StatusCode::NOT_FOUND || body.error_code.ends_with("NotFound") {
        let name = if body.description.is_empty() {
            path
        } else {
            body.description
        };
        return Err(CopyError::not_found("resource", name).into());
    }
    Err(CcApiError {
        method: method.to_string(),
        path,
        status: status.as_u16(),
        error_code: body.error_code,
        description: if body.description.is_empty() {
            text
        } else {
            body.description
        },
    }
    .into())
}

// ── Port implementations ──────────────────────────────────────────────────────

impl SessionContext for CloudControllerSession {
    fn target(&self) -> &str {
        &self.target
    }

    fn username(&self) -> &str {
        &self.username
    }

    fn org(&self) -> &OrgRef {
        &self.org
    }

    fn space(&self) -> &SpaceRef {
        &self.space
    }

    fn set_context(&mut self, org: OrgRef, space: SpaceRef) {
        self.org = org;
        self.space = space;
    }
}

impl OrgDirectory for CloudControllerSession {
    async fn find_org(&self, name: &str) -> Result<OrgRef> {
        let found: Vec<Resource<NamedEntity>> = self
            .get_all("/v2/organizations", &[("q", format!("name:{name}"))])
            .await?;
        found
            .into_iter()
            .next()
            .map(|r| OrgRef {
                guid: r.metadata.guid,
                name: r.entity.name,
            })
            .ok_or_else(|| CopyError::not_found("organization", name).into())
    }

    async fn find_space(&self, org: &OrgRef, name: &str) -> Result<SpaceRef> {
        let found: Vec<Resource<NamedEntity>> = self
            .get_all(
                &format!("/v2/organizations/{}/spaces", org.guid),
                &[("q", format!("name:{name}"))],
            )
            .await?;
        found
            .into_iter()
            .next()
            .map(|r| SpaceRef {
                guid: r.metadata.guid,
                name: r.entity.name,
            })
            .ok_or_else(|| CopyError::not_found("space", name).into())
    }
}

impl ServiceRepository for CloudControllerSession {
    async fn service_instances(&self) -> Result<Vec<ServiceInstance>> {
        Ok(instances_from_summary(&self.space_summary().await?))
    }

    async fn find_service_instance(&self, name: &str) -> Result<ServiceInstance> {
        let found: Vec<Resource<InstanceEntity>> = self
            .get_all(
                &format!("/v2/spaces/{}/service_instances", self.space.guid),
                &[
                    ("q", format!("name:{name}")),
                    ("return_user_provided_service_instances", "true".to_string()),
                ],
            )
            .await?;
        let Some(found) = found.into_iter().next() else {
            return Err(CopyError::not_found("service instance", name).into());
        };
        let entity = found.entity;

        let (plan, offering) = match entity.service_plan_guid.as_deref() {
            Some(plan_guid) if !plan_guid.is_empty() => {
                let plan: Resource<PlanEntity> =
                    self.get_json(&format!("/v2/service_plans/{plan_guid}")).await?;
                let offering: Resource<OfferingEntity> = self
                    .get_json(&format!("/v2/services/{}", plan.entity.service_guid))
                    .await?;
                (
                    Some(ServicePlanRef {
                        guid: plan.metadata.guid,
                        name: plan.entity.name,
                    }),
                    Some(ServiceOfferingRef {
                        guid: offering.metadata.guid,
                        label: offering.entity.label,
                    }),
                )
            }
            _ => (None, None),
        };

        let bindings = match entity.service_bindings_url.as_deref() {
            Some(url) => self
                .get_all::<BindingEntity>(path_of(url), &[])
                .await?
                .into_iter()
                .map(|r| ServiceBinding {
                    guid: r.metadata.guid,
                    app_guid: r.entity.app_guid,
                })
                .collect(),
            None => Vec::new(),
        };
        let keys = match entity.service_keys_url.as_deref() {
            Some(url) => self
                .get_all::<KeyEntity>(path_of(url), &[])
                .await?
                .into_iter()
                .map(|r| ServiceKey {
                    guid: r.metadata.guid,
                    name: r.entity.name,
                    credentials: r.entity.credentials,
                })
                .collect(),
            None => Vec::new(),
        };

        let params = if plan.is_some() {
            self.instance_parameters(&found.metadata.guid).await?
        } else {
            Credentials::new()
        };

        Ok(ServiceInstance {
            guid: found.metadata.guid,
            name: entity.name,
            user_provided: entity.kind == "user_provided_service_instance",
            plan,
            offering,
            params,
            tags: entity.tags,
            bindings,
            keys,
            ..ServiceInstance::default()
        })
    }

    async fn user_provided_services(&self) -> Result<Vec<UserProvidedService>> {
        let found: Vec<Resource<UpsEntity>> = self
            .get_all(
                "/v2/user_provided_service_instances",
                &[("q", format!("space_guid:{}", self.space.guid))],
            )
            .await?;
        Ok(found
            .into_iter()
            .map(|r| UserProvidedService {
                guid: r.metadata.guid,
                name: r.entity.name,
                credentials: r.entity.credentials,
                syslog_drain_url: r.entity.syslog_drain_url.filter(|u| !u.is_empty()),
                route_service_url: r.entity.route_service_url.filter(|u| !u.is_empty()),
            })
            .collect())
    }

    async fn create_user_provided_service(&self, service: &UserProvidedService) -> Result<()> {
        let mut body = serde_json::json!({
            "name": service.name,
            "space_guid": self.space.guid,
            "credentials": service.credentials,
        });
        if let Some(url) = &service.syslog_drain_url {
            body["syslog_drain_url"] = url.clone().into();
        }
        if let Some(url) = &service.route_service_url {
            body["route_service_url"] = url.clone().into();
        }
        let _: serde_json::Value = self
            .post_json("/v2/user_provided_service_instances", &[], &body)
            .await?;
        Ok(())
    }

    async fn create_service_instance(
        &self,
        name: &str,
        plan_guid: &str,
        params: &serde_json::Map<String, serde_json::Value>,
        tags: &[String],
    ) -> Result<()> {
        let body = serde_json::json!({
            "name": name,
            "service_plan_guid": plan_guid,
            "space_guid": self.space.guid,
            "parameters": params,
            "tags": tags,
        });
        let _: serde_json::Value = self
            .post_json(
                "/v2/service_instances",
                &[("accepts_incomplete", "true")],
                &body,
            )
            .await?;
        Ok(())
    }

    async fn delete_service_instance(&self, instance: &ServiceInstance) -> Result<()> {
        if instance.user_provided {
            self.delete(
                &format!("/v2/user_provided_service_instances/{}", instance.guid),
                &[],
            )
            .await
        } else {
            self.delete(
                &format!("/v2/service_instances/{}", instance.guid),
                &[("accepts_incomplete", "true")],
            )
            .await
        }
    }

    async fn find_offerings_by_label(&self, label: &str) -> Result<Vec<ServiceOffering>> {
        let found: Vec<Resource<OfferingEntity>> = self
            .get_all(
                &format!("/v2/spaces/{}/services", self.space.guid),
                &[("q", format!("label:{label}"))],
            )
            .await?;
        Ok(found
            .into_iter()
            .map(|r| ServiceOffering {
                guid: r.metadata.guid,
                label: r.entity.label,
            })
            .collect())
    }

    async fn plans_for_offering(&self, offering_guid: &str) -> Result<Vec<ServicePlan>> {
        let found: Vec<Resource<PlanEntity>> = self
            .get_all(
                "/v2/service_plans",
                &[("q", format!("service_guid:{offering_guid}"))],
            )
            .await?;
        Ok(found
            .into_iter()
            .map(|r| ServicePlan {
                guid: r.metadata.guid,
                name: r.entity.name,
                offering_guid: r.entity.service_guid,
            })
            .collect())
    }
}

impl ServiceKeyRepository for CloudControllerSession {
    async fn create_service_key(&self, instance_guid: &str, name: &str) -> Result<()> {
        let body = serde_json::json!({
            "service_instance_guid": instance_guid,
            "name": name,
        });
        let _: serde_json::Value = self.post_json("/v2/service_keys", &[], &body).await?;
        Ok(())
    }

    async fn get_service_key(&self, instance_guid: &str, name: &str) -> Result<ServiceKey> {
        let found: Vec<Resource<KeyEntity>> = self
            .get_all(
                &format!("/v2/service_instances/{instance_guid}/service_keys"),
                &[("q", format!("name:{name}"))],
            )
            .await?;
        found
            .into_iter()
            .next()
            .map(|r| ServiceKey {
                guid: r.metadata.guid,
                name: r.entity.name,
                credentials: r.entity.credentials,
            })
            .ok_or_else(|| CopyError::not_found("service key", name).into())
    }

    async fn delete_service_key(&self, key_guid: &str) -> Result<()> {
        self.delete(&format!("/v2/service_keys/{key_guid}"), &[]).await
    }
}

impl BindingRepository for CloudControllerSession {
    async fn bind_service(&self, instance_guid: &str, app_guid: &str) -> Result<()> {
        let body = serde_json::json!({
            "service_instance_guid": instance_guid,
            "app_guid": app_guid,
        });
        let _: serde_json::Value = self.post_json("/v2/service_bindings", &[], &body).await?;
        Ok(())
    }

    async fn unbind_service(&self, instance_guid: &str, app_guid: &str) -> Result<()> {
        let found: Vec<Resource<BindingEntity>> = self
            .get_all(
                "/v2/service_bindings",
                &[
                    ("q", format!("service_instance_guid:{instance_guid}")),
                    ("q", format!("app_guid:{app_guid}")),
                ],
            )
            .await?;
        if found.is_empty() {
            return Err(CopyError::not_found("service binding", app_guid).into());
        }
        for binding in found {
            self.delete(&format!("/v2/service_bindings/{}", binding.metadata.guid), &[])
                .await?;
        }
        Ok(())
    }
}

impl ApplicationRepository for CloudControllerSession {
    async fn applications(&self) -> Result<Vec<Application>> {
        Ok(applications_from_summary(&self.space_summary().await?))
    }

    async fn find_application(&self, name: &str) -> Result<Application> {
        self.applications()
            .await?
            .into_iter()
            .find(|a| a.name == name)
            .ok_or_else(|| CopyError::not_found("application", name).into())
    }

    async fn create_application(&self, params: &AppParams) -> Result<Application> {
        let body = serde_json::to_value(params).context("cannot serialize app params")?;
        let created: Resource<AppEntity> = self.post_json("/v2/apps", &[], &body).await?;
        Ok(Application {
            guid: created.metadata.guid,
            name: created.entity.params.name.clone().unwrap_or_default(),
            params: created.entity.params,
            ..Application::default()
        })
    }

    async fn update_application_state(&self, app_guid: &str, state: AppState) -> Result<()> {
        let body = serde_json::json!({ "state": state });
        self.put(&format!("/v2/apps/{app_guid}"), Some(&body)).await
    }

    async fn delete_application(&self, app_guid: &str, recursive: bool) -> Result<()> {
        self.delete(&format!("/v2/apps/{app_guid}"), delete_app_query(recursive))
            .await
    }
}

impl RouteRepository for CloudControllerSession {
    async fn find_route(&self, host: &str, domain: &Domain) -> Result<Route> {
        let found: Vec<Resource<RouteEntity>> = self
            .get_all(
                "/v2/routes",
                &[
                    ("q", format!("host:{host}")),
                    ("q", format!("domain_guid:{}", domain.guid)),
                ],
            )
            .await?;
        found
            .into_iter()
            .find(|r| r.entity.path.as_deref().unwrap_or_default().is_empty())
            .map(|r| Route {
                guid: r.metadata.guid,
                host: r.entity.host,
                domain: domain.clone(),
                path: None,
            })
            .ok_or_else(|| CopyError::not_found("route", format!("{host}.{}", domain.name)).into())
    }

    async fn create_route(&self, host: &str, domain: &Domain) -> Result<Route> {
        let body = serde_json::json!({
            "host": host,
            "domain_guid": domain.guid,
            "space_guid": self.space.guid,
        });
        let created: Resource<RouteEntity> = self.post_json("/v2/routes", &[], &body).await?;
        Ok(Route {
            guid: created.metadata.guid,
            host: created.entity.host,
            domain: domain.clone(),
            path: created.entity.path.filter(|p| !p.is_empty()),
        })
    }

    async fn bind_route(&self, route_guid: &str, app_guid: &str) -> Result<()> {
        self.put(&format!("/v2/routes/{route_guid}/apps/{app_guid}"), None)
            .await
    }

    async fn delete_route(&self, route_guid: &str) -> Result<()> {
        self.delete(&format!("/v2/routes/{route_guid}"), &[]).await
    }
}

impl DomainRepository for CloudControllerSession {
    async fn default_domain(&self) -> Result<Domain> {
        self.domains()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CopyError::not_found("domain", "default").into())
    }

    async fn domains(&self) -> Result<Vec<Domain>> {
        let shared: Vec<Resource<NamedEntity>> = self.get_all("/v2/shared_domains", &[]).await?;
        let private: Vec<Resource<NamedEntity>> = self
            .get_all(
                &format!("/v2/organizations/{}/private_domains", self.org.guid),
                &[],
            )
            .await?;
        let to_domain = |shared: bool| {
            move |r: Resource<NamedEntity>| Domain {
                guid: r.metadata.guid,
                name: r.entity.name,
                shared,
            }
        };
        Ok(shared
            .into_iter()
            .map(to_domain(true))
            .chain(private.into_iter().map(to_domain(false)))
            .collect())
    }
}

impl ContentTransfer for CloudControllerSession {
    async fn download_content(
        &self,
        app_guid: &str,
        kind: ContentKind,
        dest: &Path,
    ) -> Result<u64> {
        let path = match kind {
            ContentKind::Bits => format!("/v2/apps/{app_guid}/download"),
            ContentKind::Droplet => format!("/v2/apps/{app_guid}/droplet/download"),
        };
        let url = self.url(&path);
        tracing::debug!(%url, dest = %dest.display(), "downloading payload");
        let resp = self
            .send("GET", |token| {
                Ok(self.transfer.get(&url).header(AUTHORIZATION, token))
            })
            .await?;

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(dest)
            .await
            .with_context(|| format!("cannot create {}", dest.display()))?;
        let label = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let pb = (self.progress)(resp.content_length().unwrap_or(0), &format!("downloading {label}"));

        let mut written = 0u64;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.with_context(|| format!("reading {path}"))?;
            file.write_all(&chunk)
                .await
                .with_context(|| format!("cannot write {}", dest.display()))?;
            written += chunk.len() as u64;
            pb.inc(chunk.len() as u64);
        }
        file.flush().await?;
        pb.finish_and_clear();
        Ok(written)
    }

    async fn upload_bits(&self, app_guid: &str, archive: &Path) -> Result<()> {
        self.upload(&format!("/v2/apps/{app_guid}/bits"), archive, |part| {
            Form::new().text("resources", "[]").part("application", part)
        })
        .await
    }

    async fn upload_droplet(&self, app_guid: &str, droplet: &Path) -> Result<()> {
        self.upload(
            &format!("/v2/apps/{app_guid}/droplet/upload"),
            droplet,
            |part| Form::new().part("droplet", part),
        )
        .await
    }
}

// ── Provider ──────────────────────────────────────────────────────────────────

/// Opens sessions from the cf CLI config of the current or a saved target.
pub struct CfSessionProvider<T> {
    registry: T,
    timeout: Duration,
    progress: ProgressFactory,
}

impl<T: TargetRegistry> CfSessionProvider<T> {
    pub fn new(registry: T, timeout: Duration, progress: ProgressFactory) -> Self {
        Self {
            registry,
            timeout,
            progress,
        }
    }

    /// Name under which the current cf config is known: the current saved
    /// target, else the API host.
    fn current_name(&self, config: &CfConfig) -> String {
        self.registry.current_target().unwrap_or_else(|_| {
            config
                .target
                .split("://")
                .nth(1)
                .unwrap_or(&config.target)
                .trim_end_matches('/')
                .to_string()
        })
    }
}

impl<T: TargetRegistry> SessionProvider for CfSessionProvider<T> {
    type Session = CloudControllerSession;

    async fn open(&self, target: Option<&str>) -> Result<CloudControllerSession> {
        let path = match target {
            Some(name) => self.registry.config_path(name)?,
            None => default_config_path()?,
        };
        tracing::debug!(config = %path.display(), "opening session");
        let config = CfConfig::load(&path)?;
        let name = match target {
            Some(name) => name.to_string(),
            None => self.current_name(&config),
        };
        CloudControllerSession::new(&config, &name, self.timeout, self.progress)
    }
}
