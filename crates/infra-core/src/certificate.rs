use crate::dns::HostedZoneRef;
use crate::error::Result;
use crate::names;
use crate::stack::{LogicalId, Stack};
use crate::template::Resource;
use serde_json::{json, Value};

/// A TLS certificate for exactly one hostname, validated by DNS records
/// published into an existing hosted zone.
#[derive(Debug, Clone)]
pub struct DnsValidatedCertificate {
    pub id: LogicalId,
    pub domain_name: String,
}

impl DnsValidatedCertificate {
    pub fn new(
        stack: &mut Stack,
        id: &str,
        zone: &HostedZoneRef,
        domain_name: &str,
    ) -> Result<Self> {
        names::validate_domain(domain_name)?;
        let id = stack.add_resource(
            id,
            Resource::new(
                "AWS::CertificateManager::Certificate",
                json!({
                    "DomainName": domain_name,
                    "ValidationMethod": "DNS",
                    "DomainValidationOptions": [{
                        "DomainName": domain_name,
                        "HostedZoneId": zone.id,
                    }],
                }),
            ),
        )?;
        tracing::debug!(certificate = %id, domain = domain_name, "declared certificate");
        Ok(Self {
            id,
            domain_name: domain_name.to_string(),
        })
    }

    /// `Ref` of a certificate resolves to its ARN.
    pub fn arn(&self) -> Value {
        self.id.reference()
    }
}

/// The two certificates the deployment needs: one for the GraphQL service
/// hostname and one for the action-handler hostname, both in the same zone.
#[derive(Debug, Clone)]
pub struct Certificates {
    pub hasura: DnsValidatedCertificate,
    pub actions: DnsValidatedCertificate,
}

impl Certificates {
    pub fn new(
        stack: &mut Stack,
        zone: &HostedZoneRef,
        hasura_hostname: &str,
        actions_hostname: &str,
    ) -> Result<Self> {
        let hasura = DnsValidatedCertificate::new(stack, "HasuraCertificate", zone, hasura_hostname)?;
        let actions =
            DnsValidatedCertificate::new(stack, "ActionsCertificate", zone, actions_hostname)?;
        Ok(Self { hasura, actions })
    }
}
