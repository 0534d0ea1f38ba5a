use crate::error::Result;
use crate::stack::{LogicalId, Stack};
use crate::template::Resource;
use serde_json::{json, Value};

/// A TCP port range, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub from: u16,
    pub to: u16,
}

impl PortRange {
    pub fn single(port: u16) -> Self {
        Self {
            from: port,
            to: port,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SecurityGroup {
    pub id: LogicalId,
}

impl SecurityGroup {
    /// Declare a group in `vpc` that allows all egress and no ingress.
    pub fn new(stack: &mut Stack, id: &str, vpc: &LogicalId, description: &str) -> Result<Self> {
        let id = stack.add_resource(
            id,
            Resource::new(
                "AWS::EC2::SecurityGroup",
                json!({
                    "GroupDescription": description,
                    "VpcId": vpc.reference(),
                    "SecurityGroupEgress": [{
                        "CidrIp": "0.0.0.0/0",
                        "Description": "Allow all outbound traffic by default",
                        "IpProtocol": "-1",
                    }],
                }),
            ),
        )?;
        Ok(Self { id })
    }

    pub fn group_id(&self) -> Value {
        self.id.get_att("GroupId")
    }

    /// Allow TCP `ports` into this group from members of `peer`.
    pub fn allow_from(
        &self,
        stack: &mut Stack,
        id: &str,
        peer: &SecurityGroup,
        ports: PortRange,
        description: &str,
    ) -> Result<LogicalId> {
        stack.add_resource(
            id,
            Resource::new(
                "AWS::EC2::SecurityGroupIngress",
                json!({
                    "GroupId": self.group_id(),
                    "IpProtocol": "tcp",
                    "FromPort": ports.from,
                    "ToPort": ports.to,
                    "SourceSecurityGroupId": peer.group_id(),
                    "Description": description,
                }),
            ),
        )
    }

    /// Allow TCP `ports` into this group from a CIDR range.
    pub fn allow_cidr(
        &self,
        stack: &mut Stack,
        id: &str,
        cidr: &str,
        ports: PortRange,
        description: &str,
    ) -> Result<LogicalId> {
        stack.add_resource(
            id,
            Resource::new(
                "AWS::EC2::SecurityGroupIngress",
                json!({
                    "GroupId": self.group_id(),
                    "IpProtocol": "tcp",
                    "FromPort": ports.from,
                    "ToPort": ports.to,
                    "CidrIp": cidr,
                    "Description": description,
                }),
            ),
        )
    }
}

/// Every ingress rule in `template` targeting `group`.
pub fn ingress_rules<'a>(
    template: &'a crate::template::Template,
    group: &SecurityGroup,
) -> Vec<&'a Resource> {
    let target = group.group_id();
    template
        .resources_of_type("AWS::EC2::SecurityGroupIngress")
        .map(|(_, r)| r)
        .filter(|r| r.prop("GroupId") == Some(&target))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::Environment;

    #[test]
    fn peer_ingress_is_scoped_to_port_range() {
        let mut stack = Stack::new(
            "acme-StagingStack",
            Environment {
                account: "123456789012".into(),
                region: "us-east-1".into(),
            },
        )
        .unwrap();
        let vpc = stack
            .add_resource("Vpc", Resource::new("AWS::EC2::VPC", json!({})))
            .unwrap();
        let db = SecurityGroup::new(&mut stack, "DbSg", &vpc, "db").unwrap();
        let app = SecurityGroup::new(&mut stack, "AppSg", &vpc, "app").unwrap();
        db.allow_from(&mut stack, "DbFromApp", &app, PortRange::single(5432), "Postgres Port")
            .unwrap();

        let t = stack.synth();
        let rules = ingress_rules(&t, &db);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].prop("FromPort").unwrap(), 5432);
        assert_eq!(rules[0].prop("ToPort").unwrap(), 5432);
        assert_eq!(rules[0].prop("SourceSecurityGroupId").unwrap(), &app.group_id());
        assert!(ingress_rules(&t, &app).is_empty());
    }
}
