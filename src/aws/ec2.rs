//! EC2 client for instance and key-pair operations
//!
//! [`Ec2Api`] is the seam the managers are written against; [`Ec2Client`]
//! implements it over the real SDK client. The trait speaks typed requests
//! and domain models, keeping SDK request shapes out of the managers.

use aws_sdk_ec2::types::{EnclaveOptionsRequest, KeyFormat, KeyType, ResourceType};
use aws_sdk_ec2::Client;
use tracing::{debug, info};

use crate::aws::context::AwsContext;
use crate::aws::tags::{ec2_tag_spec, instance_filters, key_pair_filters};
use crate::error::CloudError;
use crate::instance::{Instance, LaunchRequest};
use crate::key::Key;

/// Response of a key-pair creation: the name plus the one-time private key
/// material. The material is written straight to disk, never kept in models.
#[derive(Debug, Clone)]
pub struct CreatedKeyPair {
    pub name: String,
    pub material: String,
}

/// EC2 operations the managers depend on.
///
/// Discovery calls always apply the ownership-tag filters; they return empty
/// vectors, never errors, when nothing matches. Provider failures surface as
/// [`CloudError`] with their code preserved.
#[allow(async_fn_in_trait)]
#[cfg_attr(test, mockall::automock)]
pub trait Ec2Api: Send + Sync {
    /// List owned instances in non-terminal states, optionally restricted to
    /// an exact name.
    async fn describe_instances(&self, name: Option<String>) -> Result<Vec<Instance>, CloudError>;

    /// Launch one instance and return the provider's view of it.
    async fn run_instance(&self, request: LaunchRequest) -> Result<Instance, CloudError>;

    /// Terminate an instance by id and return the provider's reported
    /// post-call state.
    async fn terminate_instance(&self, instance_id: &str) -> Result<String, CloudError>;

    /// List owned key pairs, optionally restricted to an exact name.
    async fn describe_key_pairs(&self, name: Option<String>) -> Result<Vec<Key>, CloudError>;

    /// Create a key pair and return its one-time private key material.
    async fn create_key_pair(&self, name: &str) -> Result<CreatedKeyPair, CloudError>;

    /// Delete a key pair by name.
    async fn delete_key_pair(&self, name: &str) -> Result<(), CloudError>;
}

/// EC2 client bound to one region's SDK config.
pub struct Ec2Client {
    client: Client,
}

impl Ec2Client {
    /// Create an EC2 client from a pre-loaded AWS context.
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.ec2_client(),
        }
    }
}

impl Ec2Api for Ec2Client {
    async fn describe_instances(&self, name: Option<String>) -> Result<Vec<Instance>, CloudError> {
        debug!(name = ?name, "describing instances");

        let response = self
            .client
            .describe_instances()
            .set_filters(Some(instance_filters(name.as_deref())))
            .send()
            .await
            .map_err(CloudError::from_sdk)?;

        response
            .reservations()
            .iter()
            .flat_map(|reservation| reservation.instances())
            .map(Instance::from_sdk)
            .collect()
    }

    async fn run_instance(&self, request: LaunchRequest) -> Result<Instance, CloudError> {
        info!(
            name = %request.instance_name,
            instance_type = request.instance_type.as_str(),
            "launching instance"
        );

        let mut call = self
            .client
            .run_instances()
            .image_id(&request.image_id)
            .instance_type(request.instance_type.clone())
            .min_count(request.min_count)
            .max_count(request.max_count)
            .key_name(&request.key_name)
            .security_group_ids(&request.security_group)
            .tag_specifications(ec2_tag_spec(
                ResourceType::Instance,
                Some(&request.instance_name),
            ));
        if request.enclave_enabled {
            call = call.enclave_options(EnclaveOptionsRequest::builder().enabled(true).build());
        }

        let response = call.send().await.map_err(CloudError::from_sdk)?;
        let instance = response
            .instances()
            .first()
            .ok_or_else(|| CloudError::new("launch response contained no instances"))?;
        let instance = Instance::from_sdk(instance)?;

        info!(id = %instance.id, state = %instance.state, "instance launched");
        Ok(instance)
    }

    async fn terminate_instance(&self, instance_id: &str) -> Result<String, CloudError> {
        info!(id = %instance_id, "terminating instance");

        let response = self
            .client
            .terminate_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .map_err(CloudError::from_sdk)?;

        let state = response
            .terminating_instances()
            .first()
            .and_then(|change| change.current_state())
            .and_then(|state| state.name())
            .ok_or_else(|| CloudError::new("terminate response carried no instance state"))?;

        Ok(state.as_str().to_string())
    }

    async fn describe_key_pairs(&self, name: Option<String>) -> Result<Vec<Key>, CloudError> {
        debug!(name = ?name, "describing key pairs");

        let response = self
            .client
            .describe_key_pairs()
            .set_key_names(name.map(|n| vec![n]))
            .set_filters(Some(key_pair_filters()))
            .send()
            .await
            .map_err(CloudError::from_sdk)?;

        response.key_pairs().iter().map(Key::from_sdk).collect()
    }

    async fn create_key_pair(&self, name: &str) -> Result<CreatedKeyPair, CloudError> {
        info!(name = %name, "creating key pair");

        let response = self
            .client
            .create_key_pair()
            .key_name(name)
            .key_type(KeyType::Rsa)
            .key_format(KeyFormat::Pem)
            .tag_specifications(ec2_tag_spec(ResourceType::KeyPair, None))
            .send()
            .await
            .map_err(CloudError::from_sdk)?;

        let name = response
            .key_name()
            .ok_or_else(|| CloudError::new("key pair response missing KeyName"))?;
        let material = response
            .key_material()
            .ok_or_else(|| CloudError::new("key pair response missing KeyMaterial"))?;

        Ok(CreatedKeyPair {
            name: name.to_string(),
            material: material.to_string(),
        })
    }

    async fn delete_key_pair(&self, name: &str) -> Result<(), CloudError> {
        info!(name = %name, "deleting key pair");

        self.client
            .delete_key_pair()
            .key_name(name)
            .send()
            .await
            .map_err(CloudError::from_sdk)?;

        Ok(())
    }
}
