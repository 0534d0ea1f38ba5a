//! Load-balanced container fleet running the GraphQL engine.

use crate::certificate::DnsValidatedCertificate;
use crate::database::Database;
use crate::dns::{self, AliasTarget, HostedZoneRef};
use crate::error::{InfraError, Result};
use crate::iam::{Role, Statement};
use crate::network::{Network, SubnetType};
use crate::secrets::ApplicationSecrets;
use crate::security_group::{PortRange, SecurityGroup};
use crate::stack::{LogicalId, Stack};
use crate::template::{intrinsic, RemovalPolicy, Resource};
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub const DEFAULT_IMAGE: &str = "hasura/graphql-engine:v1.2.1";
pub const CONTAINER_NAME: &str = "web";
const HTTPS_PORT: u16 = 443;

// ---------------------------------------------------------------------------
// Props
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct HealthCheck {
    pub path: String,
    pub healthy_http_codes: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceProps {
    pub app_name: String,
    pub hostname: String,
    pub multi_az: bool,
    pub image: String,
    pub container_port: u16,
    pub cpu: u32,
    pub memory_mib: u32,
    pub environment: BTreeMap<String, String>,
    pub health_check: HealthCheck,
}

impl ServiceProps {
    pub fn new(app_name: &str, hostname: &str, multi_az: bool) -> Self {
        let environment = BTreeMap::from([
            ("HASURA_GRAPHQL_ENABLE_CONSOLE".to_string(), "true".to_string()),
            ("HASURA_GRAPHQL_PG_CONNECTIONS".to_string(), "100".to_string()),
            ("HASURA_GRAPHQL_LOG_LEVEL".to_string(), "debug".to_string()),
        ]);
        Self {
            app_name: app_name.to_string(),
            hostname: hostname.to_string(),
            multi_az,
            image: DEFAULT_IMAGE.to_string(),
            container_port: 8080,
            cpu: 256,
            memory_mib: 512,
            environment,
            health_check: HealthCheck {
                path: "/healthz".to_string(),
                healthy_http_codes: "200".to_string(),
            },
        }
    }

    pub fn desired_count(&self) -> u32 {
        if self.multi_az {
            2
        } else {
            1
        }
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Service {
    pub cluster: LogicalId,
    pub task_definition: LogicalId,
    pub service: LogicalId,
    pub load_balancer: LogicalId,
    pub listener: LogicalId,
    pub target_group: LogicalId,
    pub security_group: SecurityGroup,
    pub load_balancer_security_group: SecurityGroup,
    pub database_ingress: LogicalId,
    pub dns_record: LogicalId,
    pub desired_count: u32,
}

/// Everything the fleet is wired to.
pub struct ServiceDeps<'a> {
    pub network: &'a Network,
    pub database: &'a Database,
    pub secrets: &'a ApplicationSecrets,
    pub certificate: &'a DnsValidatedCertificate,
    pub zone: &'a HostedZoneRef,
}

impl Service {
    pub fn new(stack: &mut Stack, id: &str, deps: ServiceDeps<'_>, props: &ServiceProps) -> Result<Self> {
        let public_subnets = deps.network.subnets(SubnetType::Public);
        if public_subnets.is_empty() {
            return Err(InfraError::InvalidConfig {
                name: "network",
                reason: "a public load balancer needs public subnets".to_string(),
            });
        }
        let public_refs = deps.network.subnet_refs(SubnetType::Public);
        let vpc = &deps.network.vpc;

        let cluster = stack.add_resource(&format!("{id}Cluster"), Resource::new("AWS::ECS::Cluster", json!({})))?;

        let log_group = stack.add_resource(
            &format!("{id}LogGroup"),
            Resource::new("AWS::Logs::LogGroup", json!({}))
                .removal_policy(RemovalPolicy::Retain),
        )?;

        // -- Task definition --------------------------------------------------

        let execution_role = Role::new(
            stack,
            &format!("{id}ExecutionRole"),
            "ecs-tasks.amazonaws.com",
            Vec::new(),
        )?;
        let secret_arns: Vec<Value> = deps.secrets.all().iter().map(|s| s.arn()).collect();
        let execution_policy = execution_role.add_policy(
            stack,
            &format!("{id}ExecutionRoleDefaultPolicy"),
            &[
                Statement::allow(
                    &["logs:CreateLogStream", "logs:PutLogEvents"],
                    vec![log_group.get_att("Arn")],
                ),
                Statement::allow(
                    &["secretsmanager:GetSecretValue", "secretsmanager:DescribeSecret"],
                    secret_arns,
                ),
            ],
        )?;
        let task_role = Role::new(stack, &format!("{id}TaskRole"), "ecs-tasks.amazonaws.com", Vec::new())?;

        let environment: Vec<Value> = props
            .environment
            .iter()
            .map(|(k, v)| json!({ "Name": k, "Value": v }))
            .collect();
        let secrets = vec![
            json!({ "Name": "HASURA_GRAPHQL_DATABASE_URL", "ValueFrom": deps.secrets.database_url.arn() }),
            json!({ "Name": "HASURA_GRAPHQL_ADMIN_SECRET", "ValueFrom": deps.secrets.admin.arn() }),
            json!({ "Name": "HASURA_GRAPHQL_JWT_SECRET", "ValueFrom": deps.secrets.jwt.arn() }),
        ];

        let task_definition = stack.add_resource(
            &format!("{id}TaskDef"),
            Resource::new(
                "AWS::ECS::TaskDefinition",
                json!({
                    "Family": format!("{}-hasura", props.app_name),
                    "Cpu": props.cpu.to_string(),
                    "Memory": props.memory_mib.to_string(),
                    "NetworkMode": "awsvpc",
                    "RequiresCompatibilities": ["FARGATE"],
                    "ExecutionRoleArn": execution_role.arn(),
                    "TaskRoleArn": task_role.arn(),
                    "ContainerDefinitions": [{
                        "Name": CONTAINER_NAME,
                        "Image": props.image,
                        "Essential": true,
                        "PortMappings": [{ "ContainerPort": props.container_port, "Protocol": "tcp" }],
                        "Environment": environment,
                        "Secrets": secrets,
                        "LogConfiguration": {
                            "LogDriver": "awslogs",
                            "Options": {
                                "awslogs-group": log_group.reference(),
                                "awslogs-stream-prefix": id,
                                "awslogs-region": intrinsic::reference(intrinsic::REGION),
                            },
                        },
                    }],
                }),
            ),
        )?;

        // -- Load balancer ----------------------------------------------------

        let lb_sg = SecurityGroup::new(
            stack,
            &format!("{id}LBSecurityGroup"),
            vpc,
            &format!("Load balancer for {id}"),
        )?;
        lb_sg.allow_cidr(
            stack,
            &format!("{id}LBSecurityGroupHttpsIngress"),
            "0.0.0.0/0",
            PortRange::single(HTTPS_PORT),
            "Allow from anyone on port 443",
        )?;

        let mut load_balancer = Resource::new(
            "AWS::ElasticLoadBalancingV2::LoadBalancer",
            json!({
                "Type": "application",
                "Scheme": "internet-facing",
                "Subnets": public_refs,
                "SecurityGroups": [lb_sg.group_id()],
                "LoadBalancerAttributes": [
                    { "Key": "deletion_protection.enabled", "Value": "false" },
                ],
            }),
        );
        for subnet in &public_subnets {
            if let Some(route) = &subnet.default_route {
                load_balancer = load_balancer.depends_on(route.as_str());
            }
        }
        let load_balancer = stack.add_resource(&format!("{id}LB"), load_balancer)?;

        let target_group = stack.add_resource(
            &format!("{id}TargetGroup"),
            Resource::new(
                "AWS::ElasticLoadBalancingV2::TargetGroup",
                json!({
                    "Port": 80,
                    "Protocol": "HTTP",
                    "TargetType": "ip",
                    "VpcId": vpc.reference(),
                    "HealthCheckEnabled": true,
                    "HealthCheckPath": props.health_check.path,
                    "Matcher": { "HttpCode": props.health_check.healthy_http_codes },
                    "TargetGroupAttributes": [
                        { "Key": "stickiness.enabled", "Value": "false" },
                    ],
                }),
            ),
        )?;

        let listener = stack.add_resource(
            &format!("{id}LBPublicListener"),
            Resource::new(
                "AWS::ElasticLoadBalancingV2::Listener",
                json!({
                    "LoadBalancerArn": load_balancer.reference(),
                    "Port": HTTPS_PORT,
                    "Protocol": "HTTPS",
                    "Certificates": [{ "CertificateArn": deps.certificate.arn() }],
                    "DefaultActions": [{
                        "Type": "forward",
                        "TargetGroupArn": target_group.reference(),
                    }],
                }),
            ),
        )?;

        // -- Fleet ------------------------------------------------------------

        let service_sg = SecurityGroup::new(
            stack,
            &format!("{id}ServiceSecurityGroup"),
            vpc,
            &format!("Tasks of {id}"),
        )?;
        service_sg.allow_from(
            stack,
            &format!("{id}ServiceSecurityGroupFromLB"),
            &lb_sg,
            PortRange::single(props.container_port),
            "Load balancer to target",
        )?;

        let desired_count = props.desired_count();
        let service = stack.add_resource(
            &format!("{id}Service"),
            Resource::new(
                "AWS::ECS::Service",
                json!({
                    "ServiceName": props.app_name,
                    "Cluster": cluster.reference(),
                    "TaskDefinition": task_definition.reference(),
                    "DesiredCount": desired_count,
                    "LaunchType": "FARGATE",
                    "HealthCheckGracePeriodSeconds": 60,
                    "DeploymentConfiguration": {
                        "MaximumPercent": 200,
                        "MinimumHealthyPercent": 50,
                    },
                    "LoadBalancers": [{
                        "ContainerName": CONTAINER_NAME,
                        "ContainerPort": props.container_port,
                        "TargetGroupArn": target_group.reference(),
                    }],
                    "NetworkConfiguration": {
                        "AwsvpcConfiguration": {
                            "AssignPublicIp": "ENABLED",
                            "SecurityGroups": [service_sg.group_id()],
                            "Subnets": public_refs,
                        },
                    },
                }),
            )
            .depends_on(listener.as_str())
            .depends_on(execution_policy.as_str()),
        )?;

        let database_ingress = deps.database.allow_from(stack, &service_sg)?;

        // -- DNS and outputs --------------------------------------------------

        let dns_record = dns::alias_record(
            stack,
            &format!("{id}DNS"),
            deps.zone,
            &props.hostname,
            AliasTarget {
                dns_name: intrinsic::join(
                    "",
                    vec![Value::from("dualstack."), load_balancer.get_att("DNSName")],
                ),
                hosted_zone_id: load_balancer.get_att("CanonicalHostedZoneID"),
            },
        )?;

        stack.add_output(
            "HasuraLoadBalancerDns",
            "DNS name of the GraphQL engine load balancer",
            load_balancer.get_att("DNSName"),
        )?;
        stack.add_output(
            "HasuraServiceUrl",
            "Public URL of the GraphQL engine",
            Value::from(format!("https://{}", props.hostname)),
        )?;

        tracing::info!(
            service = %service,
            image = %props.image,
            desired_count,
            "declared load-balanced service"
        );

        Ok(Self {
            cluster,
            task_definition,
            service,
            load_balancer,
            listener,
            target_group,
            security_group: service_sg,
            load_balancer_security_group: lb_sg,
            database_ingress,
            dns_record,
            desired_count,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
