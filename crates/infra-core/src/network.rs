//! Virtual network: one VPC, a public tier and a database-only isolated
//! tier, one subnet of each tier per availability zone, no NAT gateways.

use crate::error::{InfraError, Result};
use crate::stack::{LogicalId, Stack};
use crate::template::{intrinsic, Resource, Template};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Ipv4Cidr
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Cidr {
    addr: Ipv4Addr,
    prefix: u8,
}

impl Ipv4Cidr {
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// The `n`th block of size `/prefix` inside this range, or `None` if it
    /// does not fit.
    pub fn subnet(&self, prefix: u8, n: u32) -> Option<Ipv4Cidr> {
        if prefix < self.prefix || prefix > 32 {
            return None;
        }
        let available = 1u64 << (prefix - self.prefix);
        if u64::from(n) >= available {
            return None;
        }
        let size = 1u64 << (32 - prefix);
        let base = u64::from(u32::from(self.addr));
        let start = base + u64::from(n) * size;
        Some(Ipv4Cidr {
            addr: Ipv4Addr::from(start as u32),
            prefix,
        })
    }
}

impl FromStr for Ipv4Cidr {
    type Err = InfraError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| InfraError::InvalidConfig {
            name: "cidr",
            reason: format!("'{s}': {reason}"),
        };
        let (addr, prefix) = s.split_once('/').ok_or_else(|| invalid("missing /prefix"))?;
        let addr: Ipv4Addr = addr.parse().map_err(|_| invalid("bad address"))?;
        let prefix: u8 = prefix.parse().map_err(|_| invalid("bad prefix"))?;
        if prefix > 32 {
            return Err(invalid("prefix larger than 32"));
        }
        let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
        if u32::from(addr) & !mask != 0 {
            return Err(invalid("host bits set"));
        }
        Ok(Ipv4Cidr { addr, prefix })
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

// ---------------------------------------------------------------------------
// Props
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubnetType {
    /// Routed to the internet gateway.
    Public,
    /// No route to or from the internet.
    Isolated,
}

impl SubnetType {
    pub fn as_str(self) -> &'static str {
        match self {
            SubnetType::Public => "Public",
            SubnetType::Isolated => "Isolated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubnetGroup {
    pub name: String,
    pub cidr_mask: u8,
    pub subnet_type: SubnetType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkProps {
    pub cidr: String,
    pub max_azs: u32,
    pub enable_dns_support: bool,
    pub enable_dns_hostnames: bool,
    pub subnet_groups: Vec<SubnetGroup>,
}

impl Default for NetworkProps {
    fn default() -> Self {
        Self {
            cidr: "10.0.0.0/16".to_string(),
            max_azs: 2,
            enable_dns_support: true,
            enable_dns_hostnames: true,
            subnet_groups: vec![
                SubnetGroup {
                    name: "Public".to_string(),
                    cidr_mask: 24,
                    subnet_type: SubnetType::Public,
                },
                SubnetGroup {
                    name: "Database".to_string(),
                    cidr_mask: 24,
                    subnet_type: SubnetType::Isolated,
                },
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// Network
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Subnet {
    pub id: LogicalId,
    pub route_table: LogicalId,
    /// Route to the internet gateway, present on public subnets only.
    pub default_route: Option<LogicalId>,
    pub group: String,
    pub subnet_type: SubnetType,
    pub cidr: Ipv4Cidr,
    pub az_index: u32,
}

#[derive(Debug, Clone)]
pub struct Network {
    pub vpc: LogicalId,
    pub internet_gateway: Option<LogicalId>,
    pub subnets: Vec<Subnet>,
}

impl Network {
    pub fn new(stack: &mut Stack, id: &str, props: &NetworkProps) -> Result<Self> {
        let vpc_cidr: Ipv4Cidr = props.cidr.parse()?;
        if props.max_azs == 0 {
            return Err(InfraError::InvalidConfig {
                name: "max_azs",
                reason: "at least one availability zone is required".to_string(),
            });
        }
        if props.subnet_groups.is_empty() {
            return Err(InfraError::InvalidConfig {
                name: "subnet_groups",
                reason: "at least one subnet group is required".to_string(),
            });
        }

        let name_tag = format!("{}/{}", stack.name(), id);
        let vpc = stack.add_resource(
            id,
            Resource::new(
                "AWS::EC2::VPC",
                json!({
                    "CidrBlock": vpc_cidr.to_string(),
                    "EnableDnsSupport": props.enable_dns_support,
                    "EnableDnsHostnames": props.enable_dns_hostnames,
                    "InstanceTenancy": "default",
                    "Tags": [{ "Key": "Name", "Value": name_tag }],
                }),
            ),
        )?;

        let has_public = props
            .subnet_groups
            .iter()
            .any(|g| g.subnet_type == SubnetType::Public);
        let (internet_gateway, attachment) = if has_public {
            let igw = stack.add_resource(
                &format!("{vpc}IGW"),
                Resource::new(
                    "AWS::EC2::InternetGateway",
                    json!({ "Tags": [{ "Key": "Name", "Value": name_tag }] }),
                ),
            )?;
            let attachment = stack.add_resource(
                &format!("{vpc}VPCGW"),
                Resource::new(
                    "AWS::EC2::VPCGatewayAttachment",
                    json!({
                        "VpcId": vpc.reference(),
                        "InternetGatewayId": igw.reference(),
                    }),
                ),
            )?;
            (Some(igw), Some(attachment))
        } else {
            (None, None)
        };

        let mut subnets = Vec::new();
        // Address offset into the VPC range of the next free address.
        let mut offset = 0u64;
        for group in &props.subnet_groups {
            if group.cidr_mask > 32 || group.cidr_mask < vpc_cidr.prefix() {
                return Err(InfraError::InvalidConfig {
                    name: "cidr_mask",
                    reason: format!(
                        "/{} does not fit inside {vpc_cidr} (group '{}')",
                        group.cidr_mask, group.name
                    ),
                });
            }
            let size = 1u64 << (32 - group.cidr_mask);
            for az in 0..props.max_azs {
                let index = offset.div_ceil(size);
                offset = (index + 1) * size;
                let index = u32::try_from(index).unwrap_or(u32::MAX);
                let cidr = vpc_cidr.subnet(group.cidr_mask, index).ok_or_else(|| {
                    InfraError::InvalidConfig {
                        name: "cidr",
                        reason: format!(
                            "{vpc_cidr} has no room for subnet {} of group '{}' (/{})",
                            az + 1,
                            group.name,
                            group.cidr_mask
                        ),
                    }
                })?;
                let subnet = declare_subnet(
                    stack,
                    &vpc,
                    group,
                    az,
                    cidr,
                    &name_tag,
                    internet_gateway.as_ref().zip(attachment.as_ref()),
                )?;
                subnets.push(subnet);
            }
        }

        tracing::info!(
            vpc = %vpc,
            subnets = subnets.len(),
            "declared network"
        );

        Ok(Self {
            vpc,
            internet_gateway,
            subnets,
        })
    }

    pub fn subnets(&self, subnet_type: SubnetType) -> Vec<&Subnet> {
        self.subnets
            .iter()
            .filter(|s| s.subnet_type == subnet_type)
            .collect()
    }

    /// `Ref`s of every subnet of the given type, in AZ order.
    pub fn subnet_refs(&self, subnet_type: SubnetType) -> Vec<Value> {
        self.subnets(subnet_type)
            .into_iter()
            .map(|s| s.id.reference())
            .collect()
    }

    /// Check, against a synthesized template, that no isolated subnet can
    /// reach the internet: every route table associated with an isolated
    /// subnet carries no gateway route, and is not shared with a public
    /// subnet.
    pub fn isolated_tier_is_private(&self, template: &Template) -> bool {
        let associations: Vec<(Value, Value)> = template
            .resources_of_type("AWS::EC2::SubnetRouteTableAssociation")
            .filter_map(|(_, r)| Some((r.prop("SubnetId")?.clone(), r.prop("RouteTableId")?.clone())))
            .collect();
        let routes: Vec<&Resource> = template
            .resources_of_type("AWS::EC2::Route")
            .map(|(_, r)| r)
            .collect();

        let public_tables: Vec<&Value> = self
            .subnets(SubnetType::Public)
            .into_iter()
            .flat_map(|s| {
                let subnet_ref = s.id.reference();
                associations
                    .iter()
                    .filter(move |(sub, _)| *sub == subnet_ref)
                    .map(|(_, rt)| rt)
            })
            .collect();

        self.subnets(SubnetType::Isolated).into_iter().all(|s| {
            let subnet_ref = s.id.reference();
            associations
                .iter()
                .filter(|(sub, _)| *sub == subnet_ref)
                .all(|(_, rt)| {
                    let reaches_out = routes.iter().any(|route| {
                        route.prop("RouteTableId") == Some(rt)
                            && (route.prop("GatewayId").is_some()
                                || route.prop("NatGatewayId").is_some())
                    });
                    !reaches_out && !public_tables.contains(&rt)
                })
        })
    }
}

fn declare_subnet(
    stack: &mut Stack,
    vpc: &LogicalId,
    group: &SubnetGroup,
    az: u32,
    cidr: Ipv4Cidr,
    name_tag: &str,
    gateway: Option<(&LogicalId, &LogicalId)>,
) -> Result<Subnet> {
    let prefix = format!("{vpc}{}Subnet{}", group.name, az + 1);
    let public = group.subnet_type == SubnetType::Public;

    let subnet = stack.add_resource(
        &prefix,
        Resource::new(
            "AWS::EC2::Subnet",
            json!({
                "VpcId": vpc.reference(),
                "CidrBlock": cidr.to_string(),
                "AvailabilityZone": intrinsic::select(az as usize, intrinsic::get_azs()),
                "MapPublicIpOnLaunch": public,
                "Tags": [
                    { "Key": "Name", "Value": format!("{name_tag}/{}Subnet{}", group.name, az + 1) },
                    { "Key": "infra:subnet-name", "Value": group.name },
                    { "Key": "infra:subnet-type", "Value": group.subnet_type.as_str() },
                ],
            }),
        ),
    )?;
    let route_table = stack.add_resource(
        &format!("{prefix}RouteTable"),
        Resource::new(
            "AWS::EC2::RouteTable",
            json!({
                "VpcId": vpc.reference(),
                "Tags": [{ "Key": "Name", "Value": format!("{name_tag}/{}Subnet{}", group.name, az + 1) }],
            }),
        ),
    )?;
    stack.add_resource(
        &format!("{prefix}RouteTableAssociation"),
        Resource::new(
            "AWS::EC2::SubnetRouteTableAssociation",
            json!({
                "RouteTableId": route_table.reference(),
                "SubnetId": subnet.reference(),
            }),
        ),
    )?;

    let mut default_route = None;
    if public {
        if let Some((igw, attachment)) = gateway {
            let route = stack.add_resource(
                &format!("{prefix}DefaultRoute"),
                Resource::new(
                    "AWS::EC2::Route",
                    json!({
                        "RouteTableId": route_table.reference(),
                        "DestinationCidrBlock": "0.0.0.0/0",
                        "GatewayId": igw.reference(),
                    }),
                )
                .depends_on(attachment.as_str()),
            )?;
            default_route = Some(route);
        }
    }

    Ok(Subnet {
        id: subnet,
        route_table,
        default_route,
        group: group.name.clone(),
        subnet_type: group.subnet_type,
        cidr,
        az_index: az,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
