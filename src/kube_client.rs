//! Kubernetes store access for the clone controller
//!
//! The reconciliation engine only needs get/create/update/delete by key on
//! three kinds. [`KubeClient`] captures exactly that so the engine can be
//! exercised against mocks and in-memory fakes, while [`KubeClientImpl`]
//! talks to the API server.

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use kube::api::{Api, DeleteParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::crd::{CloneRequest, CLONE_REQUEST_KIND};
use crate::Error;

const CLAIM_KIND: &str = "PersistentVolumeClaim";
const VOLUME_KIND: &str = "PersistentVolume";

/// Connection timeout for the API server client
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Read timeout for the API server client; watch timeouts must stay below it
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Trait abstracting Kubernetes client operations for the clone controller
///
/// Implementations classify API failures into [`Error::NotFound`],
/// [`Error::AlreadyExists`] and [`Error::Conflict`] so callers can branch
/// on them.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Get a PersistentVolumeClaim, `None` if it does not exist
    async fn get_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PersistentVolumeClaim>, Error>;

    /// Create a PersistentVolumeClaim
    ///
    /// Fails with [`Error::AlreadyExists`] if a claim with that name exists.
    async fn create_claim(
        &self,
        claim: &PersistentVolumeClaim,
    ) -> Result<PersistentVolumeClaim, Error>;

    /// Delete a PersistentVolumeClaim
    ///
    /// Fails with [`Error::NotFound`] if the claim is already gone.
    async fn delete_claim(&self, namespace: &str, name: &str) -> Result<(), Error>;

    /// Get a PersistentVolume, `None` if it does not exist
    async fn get_volume(&self, name: &str) -> Result<Option<PersistentVolume>, Error>;

    /// Replace a PersistentVolume
    ///
    /// Guarded by the object's resourceVersion: fails with
    /// [`Error::Conflict`] if the stored volume changed since it was read.
    async fn update_volume(&self, volume: &PersistentVolume) -> Result<PersistentVolume, Error>;

    /// Get a CloneRequest, `None` if it does not exist
    async fn get_clone_request(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CloneRequest>, Error>;

    /// Write the status of a CloneRequest
    ///
    /// Guarded by the object's resourceVersion like [`KubeClient::update_volume`].
    async fn update_clone_request_status(&self, request: &CloneRequest) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
    field_manager: String,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    ///
    /// `field_manager` is recorded on every write.
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn post_params(&self) -> PostParams {
        PostParams {
            dry_run: false,
            field_manager: Some(self.field_manager.clone()),
        }
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn get_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PersistentVolumeClaim>, Error> {
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| Error::from_kube(e, CLAIM_KIND, namespace, name))
    }

    async fn create_claim(
        &self,
        claim: &PersistentVolumeClaim,
    ) -> Result<PersistentVolumeClaim, Error> {
        let namespace = claim.namespace().unwrap_or_default();
        let name = claim.name_any();
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), &namespace);
        let created = api
            .create(&self.post_params(), claim)
            .await
            .map_err(|e| Error::from_kube(e, CLAIM_KIND, &namespace, &name))?;
        debug!(claim = %name, namespace = %namespace, "created claim");
        Ok(created)
    }

    async fn delete_claim(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let api: Api<PersistentVolumeClaim> = Api::namespaced(self.client.clone(), namespace);
        api.delete(name, &DeleteParams::default())
            .await
            .map_err(|e| Error::from_kube(e, CLAIM_KIND, namespace, name))?;
        debug!(claim = %name, namespace = %namespace, "deleted claim");
        Ok(())
    }

    async fn get_volume(&self, name: &str) -> Result<Option<PersistentVolume>, Error> {
        let api: Api<PersistentVolume> = Api::all(self.client.clone());
        api.get_opt(name)
            .await
            .map_err(|e| Error::from_kube(e, VOLUME_KIND, "", name))
    }

    async fn update_volume(&self, volume: &PersistentVolume) -> Result<PersistentVolume, Error> {
        let name = volume.name_any();
        let api: Api<PersistentVolume> = Api::all(self.client.clone());
        api.replace(&name, &self.post_params(), volume)
            .await
            .map_err(|e| Error::from_kube(e, VOLUME_KIND, "", &name))
    }

    async fn get_clone_request(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<CloneRequest>, Error> {
        let api: Api<CloneRequest> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| Error::from_kube(e, CLONE_REQUEST_KIND, namespace, name))
    }

    async fn update_clone_request_status(&self, request: &CloneRequest) -> Result<(), Error> {
        let namespace = request.namespace().unwrap_or_default();
        let name = request.name_any();
        let api: Api<CloneRequest> = Api::namespaced(self.client.clone(), &namespace);

        api.patch_status(
            &name,
            &PatchParams {
                field_manager: Some(self.field_manager.clone()),
                ..Default::default()
            },
            &Patch::Merge(&status_patch(request)),
        )
        .await
        .map_err(|e| Error::from_kube(e, CLONE_REQUEST_KIND, &namespace, &name))?;

        Ok(())
    }
}

/// Merge patch writing the whole status of `request`
///
/// Every status field is sent, `null` included, so a field dropped from the
/// status is also cleared on the server. The resourceVersion makes the
/// patch fail with 409 if the stored object changed.
fn status_patch(request: &CloneRequest) -> serde_json::Value {
    let status = request.status.clone().unwrap_or_default();
    serde_json::json!({
        "metadata": { "resourceVersion": request.resource_version() },
        "status": {
            "phase": status.phase,
            "message": status.message,
        },
    })
}

/// Create a Kubernetes client from the inferred config with bounded timeouts
pub async fn create_client() -> Result<Client, kube::Error> {
    let mut config = kube::Config::infer()
        .await
        .map_err(kube::Error::InferConfig)?;
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);
    Client::try_from(config)
}

/// Read timeout applied by [`create_client`]
pub fn client_read_timeout() -> Duration {
    DEFAULT_READ_TIMEOUT
}
