//! Route 53 lookups and alias records.
//!
//! The public hosted zone already exists; it is imported by id and name and
//! never declared in the stack.

use crate::error::Result;
use crate::names;
use crate::stack::{LogicalId, Stack};
use crate::template::Resource;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedZoneRef {
    pub id: String,
    pub name: String,
}

impl HostedZoneRef {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.trim_start_matches("/hostedzone/").to_string(),
            name: name.trim_end_matches('.').to_string(),
        }
    }

    /// Zone name in the fully qualified form Route 53 stores, with a
    /// trailing dot.
    pub fn fqdn(&self) -> String {
        format!("{}.", self.name)
    }
}

/// Where an alias record points.
#[derive(Debug, Clone, PartialEq)]
pub struct AliasTarget {
    pub dns_name: Value,
    pub hosted_zone_id: Value,
}

/// Declare an `A` alias record named `record_name` in `zone`.
pub fn alias_record(
    stack: &mut Stack,
    id: &str,
    zone: &HostedZoneRef,
    record_name: &str,
    target: AliasTarget,
) -> Result<LogicalId> {
    names::validate_domain(record_name)?;
    let name = format!("{}.", record_name.trim_end_matches('.'));
    stack.add_resource(
        id,
        Resource::new(
            "AWS::Route53::RecordSet",
            json!({
                "Name": name,
                "Type": "A",
                "HostedZoneId": zone.id,
                "AliasTarget": {
                    "DNSName": target.dns_name,
                    "HostedZoneId": target.hosted_zone_id,
                },
            }),
        ),
    )
}
