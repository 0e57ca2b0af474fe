//! Instance lifecycle operations
//!
//! Instances are owned by the deployment tag and addressed by their `Name`
//! tag. Creation enforces name uniqueness up front; termination and lookup
//! insist on exactly one live match.

use std::str::FromStr;

use aws_sdk_ec2::types::{Instance as SdkInstance, InstanceType};
use serde::Serialize;

use crate::aws::ec2::Ec2Api;
use crate::aws::tags::{find_tag, from_sdk_tags, Tag, TAG_NAME};
use crate::error::{CloudError, ErrorCode, LifecycleError, Result};
use crate::wait::Barrier;

/// AMI every Sequencer instance boots from.
pub const IMAGE_ID: &str = "ami-08e4e35cccc6189f4";

/// Hardware flavor of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceKind {
    Standard,
    Nitro,
}

impl FromStr for InstanceKind {
    type Err = LifecycleError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "nitro" => Ok(Self::Nitro),
            _ => Err(LifecycleError::error(
                ErrorCode::InstanceUnknownKind,
                format!("Cannot create instance kind from '{s}'"),
            )),
        }
    }
}

/// Provider-independent view of one owned instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instance {
    pub name: Option<String>,
    pub id: String,
    pub state: String,
    pub key_name: String,
    pub tags: Vec<Tag>,
    pub public_dns_name: Option<String>,
    pub public_ip_address: Option<String>,
    pub nitro: bool,
}

impl Instance {
    /// Convert the provider's instance record, requiring the fields every
    /// owned instance carries. The `Name` tag and the public address fields
    /// are genuinely optional and pass through as found.
    pub(crate) fn from_sdk(inst: &SdkInstance) -> std::result::Result<Self, CloudError> {
        let id = inst
            .instance_id()
            .ok_or_else(|| CloudError::new("instance record missing InstanceId"))?;
        let state = inst
            .state()
            .and_then(|state| state.name())
            .ok_or_else(|| CloudError::new("instance record missing State"))?;
        let key_name = inst
            .key_name()
            .ok_or_else(|| CloudError::new("instance record missing KeyName"))?;
        let sdk_tags = inst
            .tags
            .as_deref()
            .ok_or_else(|| CloudError::new("instance record missing Tags"))?;
        let nitro = inst
            .enclave_options()
            .and_then(|opts| opts.enabled())
            .ok_or_else(|| CloudError::new("instance record missing EnclaveOptions"))?;

        let tags = from_sdk_tags(sdk_tags);
        let name = find_tag(&tags, TAG_NAME).map(str::to_string);

        Ok(Self {
            name,
            id: id.to_string(),
            state: state.as_str().to_string(),
            key_name: key_name.to_string(),
            tags,
            public_dns_name: inst.public_dns_name().map(str::to_string),
            public_ip_address: inst.public_ip_address().map(str::to_string),
            nitro,
        })
    }
}

/// Fully resolved launch parameters for one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchRequest {
    pub image_id: String,
    pub instance_type: InstanceType,
    pub min_count: i32,
    pub max_count: i32,
    pub key_name: String,
    pub security_group: String,
    pub instance_name: String,
    pub enclave_enabled: bool,
}

impl LaunchRequest {
    /// Build the launch parameters for an instance kind. Standard instances
    /// are t2.micro; nitro instances are c5a.xlarge with enclave support.
    pub fn for_kind(
        kind: InstanceKind,
        instance_name: &str,
        key_name: &str,
        security_group: &str,
    ) -> Self {
        let (instance_type, enclave_enabled) = match kind {
            InstanceKind::Standard => (InstanceType::T2Micro, false),
            InstanceKind::Nitro => (InstanceType::C5aXlarge, true),
        };

        Self {
            image_id: IMAGE_ID.to_string(),
            instance_type,
            min_count: 1,
            max_count: 1,
            key_name: key_name.to_string(),
            security_group: security_group.to_string(),
            instance_name: instance_name.to_string(),
            enclave_enabled,
        }
    }
}

/// List every owned instance in a non-terminal state.
pub async fn list_instances(ec2: &impl Ec2Api) -> Result<Vec<Instance>> {
    Ok(ec2.describe_instances(None).await?)
}

/// Look up exactly one owned instance by name.
pub async fn fetch_instance(ec2: &impl Ec2Api, instance_name: &str) -> Result<Instance> {
    let instances = ec2
        .describe_instances(Some(instance_name.to_string()))
        .await?;
    expect_single(instances, instance_name)
}

/// Launch a new named instance.
///
/// Refuses to launch while any live instance already carries the name, then
/// hands the fresh instance to `barrier` before returning it.
pub async fn create_instance(
    ec2: &impl Ec2Api,
    kind: InstanceKind,
    instance_name: &str,
    key_name: &str,
    security_group: &str,
    barrier: &Barrier,
) -> Result<Instance> {
    let existing = ec2
        .describe_instances(Some(instance_name.to_string()))
        .await?;
    if !existing.is_empty() {
        return Err(LifecycleError::warning(
            ErrorCode::InstanceDuplicate,
            format!("Instance '{instance_name}' already exists"),
        ));
    }

    let request = LaunchRequest::for_kind(kind, instance_name, key_name, security_group);
    let instance = ec2.run_instance(request).await?;

    barrier.wait(ec2, instance).await
}

/// Terminate the named instance and return its pre-termination view.
pub async fn terminate_instance(ec2: &impl Ec2Api, instance_name: &str) -> Result<Instance> {
    let instance = fetch_instance(ec2, instance_name).await?;

    let state = ec2.terminate_instance(&instance.id).await?;
    if !matches!(state.as_str(), "shutting-down" | "terminated") {
        return Err(LifecycleError::error(
            ErrorCode::InstanceTerminationFail,
            format!("Instance '{instance_name}' was not terminated state is '{state}'"),
        ));
    }

    Ok(instance)
}

fn expect_single(mut instances: Vec<Instance>, instance_name: &str) -> Result<Instance> {
    if instances.is_empty() {
        return Err(LifecycleError::warning(
            ErrorCode::InstanceMissing,
            format!("Instance '{instance_name}' is not running"),
        ));
    }
    if instances.len() > 1 {
        return Err(LifecycleError::error(
            ErrorCode::InstanceNameCollision,
            format!("More than one instance {instance_name} exists"),
        ));
    }
    Ok(instances.swap_remove(0))
}
