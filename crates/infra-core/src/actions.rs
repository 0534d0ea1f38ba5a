//! HTTP API for GraphQL engine actions: one function behind a REST API with
//! its own custom domain.

use crate::asset::Asset;
use crate::certificate::DnsValidatedCertificate;
use crate::dns::{self, AliasTarget, HostedZoneRef};
use crate::error::Result;
use crate::iam::{managed_policy, Role};
use crate::stack::{LogicalId, Stack};
use crate::template::{intrinsic, RemovalPolicy, Resource};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

pub const RUNTIME: &str = "nodejs16.x";
pub const HANDLER: &str = "handler.handler";
pub const CODE_DIR: &str = "dist";
pub const LAYER_DIR: &str = "dependencies-layer";
pub const ROUTE: &str = "handler";
pub const STAGE_NAME: &str = "prod";

const HTTP_METHODS: [&str; 2] = ["POST", "GET"];

// ---------------------------------------------------------------------------
// Props
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct ActionsProps {
    pub app_name: String,
    pub hostname: String,
    /// Directory holding `dist/` and `dependencies-layer/`.
    pub actions_dir: PathBuf,
    pub memory_mib: u32,
    pub timeout_secs: u32,
}

impl ActionsProps {
    pub fn new(app_name: &str, hostname: &str, actions_dir: &Path) -> Self {
        Self {
            app_name: app_name.to_string(),
            hostname: hostname.to_string(),
            actions_dir: actions_dir.to_path_buf(),
            memory_mib: 1024,
            timeout_secs: 4,
        }
    }

    pub fn function_name(&self) -> String {
        format!("{}-ActionHandler", self.app_name)
    }
}

// ---------------------------------------------------------------------------
// Dependency layer
// ---------------------------------------------------------------------------

/// A layer version that survives replacement: publishing new contents adds a
/// version, the previous one is kept.
#[derive(Debug, Clone)]
pub struct RetainedLayerVersion {
    pub id: LogicalId,
    pub asset: Asset,
}

impl RetainedLayerVersion {
    pub fn new(stack: &mut Stack, id: &str, dir: &Path, description: &str) -> Result<Self> {
        let asset = stack.add_asset(Asset::from_dir(dir)?);
        let id = stack.add_resource(
            id,
            Resource::new(
                "AWS::Lambda::LayerVersion",
                json!({
                    "Content": {
                        "S3Bucket": Asset::bucket_expr(),
                        "S3Key": asset.object_key(),
                    },
                    "CompatibleRuntimes": [RUNTIME],
                    "Description": description,
                }),
            )
            .removal_policy(RemovalPolicy::Delete)
            .update_replace_policy(RemovalPolicy::Retain),
        )?;
        Ok(Self { id, asset })
    }

    /// `Ref` of a layer version is its ARN.
    pub fn arn(&self) -> Value {
        self.id.reference()
    }
}

// ---------------------------------------------------------------------------
// Action handler
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ActionHandler {
    pub function: LogicalId,
    pub layer: RetainedLayerVersion,
    pub code: Asset,
    pub rest_api: LogicalId,
    pub route: LogicalId,
    pub methods: Vec<LogicalId>,
    pub deployment: LogicalId,
    pub stage: LogicalId,
    pub domain_name: LogicalId,
    pub dns_record: LogicalId,
}

impl ActionHandler {
    pub fn new(
        stack: &mut Stack,
        id: &str,
        zone: &HostedZoneRef,
        certificate: &DnsValidatedCertificate,
        props: &ActionsProps,
    ) -> Result<Self> {
        // -- Function ---------------------------------------------------------

        let layer = RetainedLayerVersion::new(
            stack,
            &format!("{id}DependenciesLayer"),
            &props.actions_dir.join(LAYER_DIR),
            &format!("Dependencies of {}", props.function_name()),
        )?;
        let code = stack.add_asset(Asset::from_dir(&props.actions_dir.join(CODE_DIR))?);

        let role = Role::new(
            stack,
            &format!("{id}HandlerServiceRole"),
            "lambda.amazonaws.com",
            vec![managed_policy("service-role/AWSLambdaBasicExecutionRole")],
        )?;
        let function = stack.add_resource(
            &format!("{id}Handler"),
            Resource::new(
                "AWS::Lambda::Function",
                json!({
                    "FunctionName": props.function_name(),
                    "Handler": HANDLER,
                    "Runtime": RUNTIME,
                    "MemorySize": props.memory_mib,
                    "Timeout": props.timeout_secs,
                    "Role": role.arn(),
                    "Layers": [layer.arn()],
                    "Code": {
                        "S3Bucket": Asset::bucket_expr(),
                        "S3Key": code.object_key(),
                    },
                }),
            )
            .depends_on(role.id.as_str()),
        )?;

        // -- REST API ---------------------------------------------------------

        let rest_api = stack.add_resource(
            id,
            Resource::new(
                "AWS::ApiGateway::RestApi",
                json!({
                    "Name": id,
                    "Description": "Endpoint For Hasura Actions",
                }),
            ),
        )?;

        let cloudwatch_role = Role::new(
            stack,
            &format!("{id}CloudWatchRole"),
            "apigateway.amazonaws.com",
            vec![managed_policy("service-role/AmazonAPIGatewayPushToCloudWatchLogs")],
        )?;
        let account = stack.add_resource(
            &format!("{id}Account"),
            Resource::new(
                "AWS::ApiGateway::Account",
                json!({ "CloudWatchRoleArn": cloudwatch_role.arn() }),
            )
            .depends_on(rest_api.as_str()),
        )?;

        let route = stack.add_resource(
            &format!("{id}{ROUTE}"),
            Resource::new(
                "AWS::ApiGateway::Resource",
                json!({
                    "ParentId": rest_api.get_att("RootResourceId"),
                    "PathPart": ROUTE,
                    "RestApiId": rest_api.reference(),
                }),
            ),
        )?;

        let integration_uri = intrinsic::sub(&format!(
            "arn:${{{}}}:apigateway:${{{}}}:lambda:path/2015-03-31/functions/${{{function}.Arn}}/invocations",
            intrinsic::PARTITION,
            intrinsic::REGION,
        ));
        let mut methods = Vec::with_capacity(HTTP_METHODS.len());
        for verb in HTTP_METHODS {
            stack.add_resource(
                &format!("{id}{ROUTE}{verb}Permission"),
                Resource::new(
                    "AWS::Lambda::Permission",
                    json!({
                        "Action": "lambda:InvokeFunction",
                        "FunctionName": function.get_att("Arn"),
                        "Principal": "apigateway.amazonaws.com",
                        "SourceArn": intrinsic::sub(&format!(
                            "arn:${{{}}}:execute-api:${{{}}}:${{{}}}:${{{rest_api}}}/*/{verb}/{ROUTE}",
                            intrinsic::PARTITION,
                            intrinsic::REGION,
                            intrinsic::ACCOUNT_ID,
                        )),
                    }),
                ),
            )?;
            let method = stack.add_resource(
                &format!("{id}{ROUTE}{verb}"),
                Resource::new(
                    "AWS::ApiGateway::Method",
                    json!({
                        "HttpMethod": verb,
                        "ResourceId": route.reference(),
                        "RestApiId": rest_api.reference(),
                        "AuthorizationType": "NONE",
                        "Integration": {
                            "Type": "AWS_PROXY",
                            "IntegrationHttpMethod": "POST",
                            "Uri": integration_uri,
                        },
                    }),
                ),
            )?;
            methods.push(method);
        }

        // Deployment id tracks the API surface.
        let fingerprint = api_fingerprint(stack, &route, &methods)?;
        let mut deployment = Resource::new(
            "AWS::ApiGateway::Deployment",
            json!({
                "RestApiId": rest_api.reference(),
                "Description": "Automatically created by the RestApi construct",
            }),
        );
        for method in &methods {
            deployment = deployment.depends_on(method.as_str());
        }
        let deployment = stack.add_resource(&format!("{id}Deployment{fingerprint}"), deployment)?;

        let stage = stack.add_resource(
            &format!("{id}DeploymentStage{STAGE_NAME}"),
            Resource::new(
                "AWS::ApiGateway::Stage",
                json!({
                    "RestApiId": rest_api.reference(),
                    "DeploymentId": deployment.reference(),
                    "StageName": STAGE_NAME,
                    "MethodSettings": [{
                        "ResourcePath": "/*",
                        "HttpMethod": "*",
                        "LoggingLevel": "INFO",
                        "DataTraceEnabled": true,
                    }],
                }),
            )
            .depends_on(account.as_str()),
        )?;

        // -- Custom domain ----------------------------------------------------

        let domain_name = stack.add_resource(
            &format!("{id}CustomDomain"),
            Resource::new(
                "AWS::ApiGateway::DomainName",
                json!({
                    "DomainName": props.hostname,
                    "RegionalCertificateArn": certificate.arn(),
                    "EndpointConfiguration": { "Types": ["REGIONAL"] },
                    "SecurityPolicy": "TLS_1_2",
                }),
            ),
        )?;
        stack.add_resource(
            &format!("{id}CustomDomainMap"),
            Resource::new(
                "AWS::ApiGateway::BasePathMapping",
                json!({
                    "DomainName": domain_name.reference(),
                    "RestApiId": rest_api.reference(),
                    "Stage": stage.reference(),
                }),
            ),
        )?;
        let dns_record = dns::alias_record(
            stack,
            &format!("{id}DNS"),
            zone,
            &props.hostname,
            AliasTarget {
                dns_name: domain_name.get_att("RegionalDomainName"),
                hosted_zone_id: domain_name.get_att("RegionalHostedZoneId"),
            },
        )?;

        stack.add_output(
            "ActionsApiEndpoint",
            "Invoke URL of the actions API stage",
            intrinsic::sub(&format!(
                "https://${{{rest_api}}}.execute-api.${{{}}}.${{{}}}/${{{stage}}}/",
                intrinsic::REGION,
                intrinsic::URL_SUFFIX,
            )),
        )?;

        tracing::info!(
            function = %props.function_name(),
            code = %code.hash,
            layer = %layer.asset.hash,
            "declared action handler"
        );

        Ok(Self {
            function,
            layer,
            code,
            rest_api,
            route,
            methods,
            deployment,
            stage,
            domain_name,
            dns_record,
        })
    }
}

/// First 8 hex chars of a SHA-256 over the route and method declarations.
fn api_fingerprint(stack: &Stack, route: &LogicalId, methods: &[LogicalId]) -> Result<String> {
    let mut hasher = Sha256::new();
    for id in std::iter::once(route).chain(methods) {
        hasher.update(id.as_str().as_bytes());
        if let Some(resource) = stack.resource(id.as_str()) {
            hasher.update(serde_json::to_vec(resource)?);
        }
    }
    Ok(hasher
        .finalize()
        .iter()
        .take(4)
        .map(|b| format!("{b:02x}"))
        .collect())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
