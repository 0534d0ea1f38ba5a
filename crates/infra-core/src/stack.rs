use crate::asset::Asset;
use crate::error::{InfraError, Result};
use crate::names;
use crate::template::{intrinsic, Output, Resource, Template};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

/// Account and region a stack is deployed into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    pub account: String,
    pub region: String,
}

// ---------------------------------------------------------------------------
// LogicalId
// ---------------------------------------------------------------------------

/// Handle to a resource already declared in a [`Stack`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalId(String);

impl LogicalId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `{"Ref": id}`
    pub fn reference(&self) -> Value {
        intrinsic::reference(&self.0)
    }

    /// `{"Fn::GetAtt": [id, attribute]}`
    pub fn get_att(&self, attribute: &str) -> Value {
        intrinsic::get_att(&self.0, attribute)
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Stack
// ---------------------------------------------------------------------------

/// A deployment unit under construction. Components declare resources into
/// it; [`Stack::synth`] renders the final template.
#[derive(Debug, Clone)]
pub struct Stack {
    name: String,
    env: Environment,
    description: Option<String>,
    tags: BTreeMap<String, String>,
    resources: BTreeMap<String, Resource>,
    outputs: BTreeMap<String, Output>,
    assets: BTreeMap<String, Asset>,
}

impl Stack {
    pub fn new(name: impl Into<String>, env: Environment) -> Result<Self> {
        let name = name.into();
        names::validate_stack_name(&name)?;
        Ok(Self {
            name,
            env,
            description: None,
            tags: BTreeMap::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
            assets: BTreeMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = Some(description.into());
    }

    /// Tag applied to every taggable resource at synthesis time.
    pub fn add_tag(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.tags.insert(key.into(), value.into());
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    /// Declare a resource. The id is stripped to alphanumerics; declaring the
    /// same id twice is an error.
    pub fn add_resource(&mut self, id: &str, resource: Resource) -> Result<LogicalId> {
        let id = names::sanitize_logical_id(id)?;
        if self.resources.contains_key(&id) || self.outputs.contains_key(&id) {
            return Err(InfraError::DuplicateLogicalId(id));
        }
        tracing::debug!(logical_id = %id, ty = %resource.ty, "declare resource");
        self.resources.insert(id.clone(), resource);
        Ok(LogicalId(id))
    }

    pub fn add_output(
        &mut self,
        id: &str,
        description: impl Into<String>,
        value: Value,
    ) -> Result<()> {
        let id = names::sanitize_logical_id(id)?;
        if self.outputs.contains_key(&id) || self.resources.contains_key(&id) {
            return Err(InfraError::DuplicateLogicalId(id));
        }
        self.outputs.insert(
            id,
            Output {
                description: description.into(),
                value,
            },
        );
        Ok(())
    }

    pub fn resource(&self, id: &str) -> Option<&Resource> {
        self.resources.get(id)
    }

    pub fn resources(&self) -> &BTreeMap<String, Resource> {
        &self.resources
    }

    pub fn resources_of_type<'a>(&'a self, ty: &'a str) -> Vec<(&'a str, &'a Resource)> {
        self.resources
            .iter()
            .filter(|(_, r)| r.ty == ty)
            .map(|(id, r)| (id.as_str(), r))
            .collect()
    }

    pub fn outputs(&self) -> &BTreeMap<String, Output> {
        &self.outputs
    }

    /// Register a file asset to publish with the template. Identical
    /// contents are registered once.
    pub fn add_asset(&mut self, asset: Asset) -> Asset {
        self.assets
            .entry(asset.hash.clone())
            .or_insert(asset)
            .clone()
    }

    /// Registered assets, keyed by content hash.
    pub fn assets(&self) -> &BTreeMap<String, Asset> {
        &self.assets
    }

    /// Render the template, merging stack tags into every taggable resource.
    /// Tags a resource declares itself win over stack tags with the same key.
    pub fn synth(&self) -> Template {
        let mut resources = self.resources.clone();
        if !self.tags.is_empty() {
            for resource in resources.values_mut().filter(|r| r.is_taggable()) {
                merge_tags(resource, &self.tags);
            }
        }
        Template {
            description: self.description.clone(),
            resources,
            outputs: self.outputs.clone(),
            ..Template::default()
        }
    }
}

fn merge_tags(resource: &mut Resource, stack_tags: &BTreeMap<String, String>) {
    let mut merged: BTreeMap<String, Value> = stack_tags
        .iter()
        .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
        .collect();
    if let Some(Value::Array(existing)) = resource.properties.get("Tags") {
        for tag in existing {
            if let (Some(Value::String(k)), Some(v)) = (tag.get("Key"), tag.get("Value")) {
                merged.insert(k.clone(), v.clone());
            }
        }
    }
    let tags: Vec<Value> = merged
        .into_iter()
        .map(|(k, v)| json!({ "Key": k, "Value": v }))
        .collect();
    resource.properties.insert("Tags".to_string(), Value::Array(tags));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn env() -> Environment {
        Environment {
            account: "123456789012".into(),
            region: "us-east-1".into(),
        }
    }

    #[test]
    fn rejects_invalid_stack_name() {
        assert!(matches!(
            Stack::new("bad_name", env()),
            Err(InfraError::InvalidName(_))
        ));
    }

    #[test]
    fn duplicate_logical_id_is_an_error() {
        let mut stack = Stack::new("acme-StagingStack", env()).unwrap();
        stack
            .add_resource("Vpc", Resource::new("AWS::EC2::VPC", json!({})))
            .unwrap();
        let err = stack
            .add_resource("V-p-c", Resource::new("AWS::EC2::VPC", json!({})))
            .unwrap_err();
        assert!(matches!(err, InfraError::DuplicateLogicalId(id) if id == "Vpc"));
    }

    #[test]
    fn logical_id_handles_render_intrinsics() {
        let mut stack = Stack::new("acme-StagingStack", env()).unwrap();
        let id = stack
            .add_resource("hasura-vpc", Resource::new("AWS::EC2::VPC", json!({})))
            .unwrap();
        assert_eq!(id.as_str(), "hasuravpc");
        assert_eq!(id.reference(), json!({ "Ref": "hasuravpc" }));
        assert_eq!(
            id.get_att("CidrBlock"),
            json!({ "Fn::GetAtt": ["hasuravpc", "CidrBlock"] })
        );
    }

    #[test]
    fn synth_applies_tags_to_taggable_resources_only() {
        let mut stack = Stack::new("acme-StagingStack", env()).unwrap();
        stack.add_tag("AppName", "acme");
        stack.add_tag("Env", "staging");
        stack
            .add_resource(
                "Vpc",
                Resource::new(
                    "AWS::EC2::VPC",
                    json!({ "Tags": [{ "Key": "Name", "Value": "acme/Vpc" }] }),
                ),
            )
            .unwrap();
        stack
            .add_resource(
                "Attachment",
                Resource::new("AWS::EC2::VPCGatewayAttachment", json!({})),
            )
            .unwrap();

        let t = stack.synth();
        let tags = t.resources["Vpc"].prop("Tags").unwrap();
        assert_eq!(
            tags,
            &json!([
                { "Key": "AppName", "Value": "acme" },
                { "Key": "Env", "Value": "staging" },
                { "Key": "Name", "Value": "acme/Vpc" },
            ])
        );
        assert!(t.resources["Attachment"].prop("Tags").is_none());
    }

    #[test]
    fn outputs_share_the_logical_id_namespace() {
        let mut stack = Stack::new("acme-StagingStack", env()).unwrap();
        stack
            .add_resource("Secret", Resource::new("AWS::SecretsManager::Secret", json!({})))
            .unwrap();
        assert!(stack.add_output("Secret", "", json!("x")).is_err());
        stack.add_output("SecretArn", "arn", json!("x")).unwrap();
        assert!(stack.add_output("SecretArn", "arn", json!("x")).is_err());
    }
}
