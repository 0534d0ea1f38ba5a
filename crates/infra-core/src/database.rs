//! Managed Postgres instance in the isolated subnet tier, plus its
//! credential secrets.
//!
//! Credentials go through two explicit steps: [`GeneratedSecret::generate`]
//! declares a secret with a random password, and
//! [`GeneratedSecret::attach`] binds it to an instance. Only an
//! [`AttachedSecret`] carries connection coordinates, and those always come
//! from the instance it is attached to.

use crate::error::{InfraError, Result};
use crate::network::{Network, SubnetType};
use crate::security_group::{PortRange, SecurityGroup};
use crate::stack::{LogicalId, Stack};
use crate::template::{intrinsic, RemovalPolicy, Resource};
use serde_json::{json, Value};

pub const POSTGRES_PORT: u16 = 5432;

const PASSWORD_LENGTH: u32 = 30;
const EXCLUDE_CHARACTERS: &str = " %+~`#$&*()|[]{}:;<>?!'/@\"\\";

// ---------------------------------------------------------------------------
// Props
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseProps {
    pub app_name: String,
    pub multi_az: bool,
    pub engine: String,
    pub instance_class: String,
    pub allocated_storage_gib: u32,
    pub max_allocated_storage_gib: u32,
    pub master_username: String,
    pub app_username: String,
}

impl DatabaseProps {
    pub fn new(app_name: &str, multi_az: bool) -> Self {
        Self {
            app_name: app_name.to_string(),
            multi_az,
            engine: "postgres".to_string(),
            instance_class: "db.t3.micro".to_string(),
            allocated_storage_gib: 20,
            max_allocated_storage_gib: 100,
            master_username: "syscdk".to_string(),
            app_username: "hasura".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// DatabaseInstance
// ---------------------------------------------------------------------------

/// Host, port and database name a client needs to connect.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionCoordinates {
    pub host: Value,
    pub port: Value,
    pub dbname: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseInstance {
    pub id: LogicalId,
    pub subnet_group: LogicalId,
    pub security_group: SecurityGroup,
    pub database_name: String,
    pub port: u16,
}

impl DatabaseInstance {
    pub fn new(
        stack: &mut Stack,
        id: &str,
        network: &Network,
        props: &DatabaseProps,
        master: &GeneratedSecret,
    ) -> Result<Self> {
        let isolated = network.subnet_refs(SubnetType::Isolated);
        if isolated.len() < 2 {
            return Err(InfraError::InvalidConfig {
                name: "network",
                reason: format!(
                    "a database needs isolated subnets in at least two zones, found {}",
                    isolated.len()
                ),
            });
        }
        if props.max_allocated_storage_gib < props.allocated_storage_gib {
            return Err(InfraError::InvalidConfig {
                name: "max_allocated_storage",
                reason: "must not be smaller than the allocated storage".to_string(),
            });
        }

        let subnet_group = stack.add_resource(
            &format!("{id}SubnetGroup"),
            Resource::new(
                "AWS::RDS::DBSubnetGroup",
                json!({
                    "DBSubnetGroupDescription": format!("Subnet group for {id} database"),
                    "SubnetIds": isolated,
                }),
            ),
        )?;
        let security_group = SecurityGroup::new(
            stack,
            &format!("{id}SecurityGroup"),
            &network.vpc,
            &format!("Security group for {id} database"),
        )?;

        let instance = stack.add_resource(
            id,
            Resource::new(
                "AWS::RDS::DBInstance",
                json!({
                    "DBInstanceIdentifier": props.app_name,
                    "DBName": props.app_name,
                    "Engine": props.engine,
                    "DBInstanceClass": props.instance_class,
                    "AllocatedStorage": props.allocated_storage_gib.to_string(),
                    "MaxAllocatedStorage": props.max_allocated_storage_gib,
                    "StorageType": "gp2",
                    "StorageEncrypted": true,
                    "MultiAZ": props.multi_az,
                    "DeletionProtection": false,
                    "PubliclyAccessible": false,
                    "CopyTagsToSnapshot": true,
                    "DBSubnetGroupName": subnet_group.reference(),
                    "VPCSecurityGroups": [security_group.group_id()],
                    "MasterUsername": intrinsic::secret_value(master.id.reference(), "username"),
                    "MasterUserPassword": intrinsic::secret_value(master.id.reference(), "password"),
                }),
            )
            .removal_policy(RemovalPolicy::Delete),
        )?;

        tracing::info!(
            instance = %instance,
            identifier = %props.app_name,
            multi_az = props.multi_az,
            "declared database instance"
        );

        Ok(Self {
            id: instance,
            subnet_group,
            security_group,
            database_name: props.app_name.clone(),
            port: POSTGRES_PORT,
        })
    }

    pub fn coordinates(&self) -> ConnectionCoordinates {
        ConnectionCoordinates {
            host: self.id.get_att("Endpoint.Address"),
            port: self.id.get_att("Endpoint.Port"),
            dbname: self.database_name.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// A credential secret that exists but is not yet bound to an instance.
#[derive(Debug, Clone)]
pub struct GeneratedSecret {
    pub id: LogicalId,
    pub username: String,
}

impl GeneratedSecret {
    /// Declare a secret holding `username` and a generated password. When
    /// `master` is given, its ARN is recorded in the secret so rotation can
    /// use the master credentials.
    pub fn generate(
        stack: &mut Stack,
        id: &str,
        username: &str,
        master: Option<&AttachedSecret>,
    ) -> Result<Self> {
        let template = match master {
            None => Value::from(json!({ "username": username }).to_string()),
            Some(m) => intrinsic::join(
                "",
                vec![
                    Value::from(format!("{{\"username\":\"{username}\",\"masterarn\":\"")),
                    m.arn(),
                    Value::from("\"}"),
                ],
            ),
        };
        let id = stack.add_resource(
            id,
            Resource::new(
                "AWS::SecretsManager::Secret",
                json!({
                    "Description": format!("Generated credentials for database user {username}"),
                    "GenerateSecretString": {
                        "SecretStringTemplate": template,
                        "GenerateStringKey": "password",
                        "PasswordLength": PASSWORD_LENGTH,
                        "ExcludeCharacters": EXCLUDE_CHARACTERS,
                    },
                }),
            )
            .removal_policy(RemovalPolicy::Delete),
        )?;
        Ok(Self {
            id,
            username: username.to_string(),
        })
    }

    /// Bind the secret to `instance`. The deployment engine then writes the
    /// instance's host, port and database name into the secret.
    pub fn attach(self, stack: &mut Stack, instance: &DatabaseInstance) -> Result<AttachedSecret> {
        let attachment = stack.add_resource(
            &format!("{}Attachment", self.id),
            Resource::new(
                "AWS::SecretsManager::SecretTargetAttachment",
                json!({
                    "SecretId": self.id.reference(),
                    "TargetId": instance.id.reference(),
                    "TargetType": "AWS::RDS::DBInstance",
                }),
            ),
        )?;
        Ok(AttachedSecret {
            secret: self.id,
            attachment,
            target: instance.id.clone(),
            username: self.username,
            coordinates: instance.coordinates(),
        })
    }
}

/// A credential secret bound to a database instance.
#[derive(Debug, Clone)]
pub struct AttachedSecret {
    pub secret: LogicalId,
    pub attachment: LogicalId,
    pub target: LogicalId,
    pub username: String,
    pub coordinates: ConnectionCoordinates,
}

impl AttachedSecret {
    /// `Ref` of the attachment resolves to the secret ARN, and orders readers
    /// after the attachment.
    pub fn arn(&self) -> Value {
        self.attachment.reference()
    }
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// Instance, master credentials and the application-user credentials.
#[derive(Debug, Clone)]
pub struct Database {
    pub instance: DatabaseInstance,
    pub master: AttachedSecret,
    pub app_user: AttachedSecret,
}

impl Database {
    pub fn new(stack: &mut Stack, id: &str, network: &Network, props: &DatabaseProps) -> Result<Self> {
        let master = GeneratedSecret::generate(
            stack,
            &format!("{id}Secret"),
            &props.master_username,
            None,
        )?;
        let instance = DatabaseInstance::new(stack, id, network, props, &master)?;
        let master = master.attach(stack, &instance)?;

        let app_user = GeneratedSecret::generate(
            stack,
            &format!("{id}User"),
            &props.app_username,
            Some(&master),
        )?;
        let app_user = app_user.attach(stack, &instance)?;

        stack.add_output(
            "HasuraDatabaseUserSecretArn",
            "ARN of the application-user credentials secret",
            app_user.arn(),
        )?;
        stack.add_output(
            "HasuraDatabaseMasterSecretArn",
            "ARN of the master credentials secret",
            master.arn(),
        )?;

        Ok(Self {
            instance,
            master,
            app_user,
        })
    }

    /// Allow members of `peer` to reach the database port, and nothing else.
    pub fn allow_from(&self, stack: &mut Stack, peer: &SecurityGroup) -> Result<LogicalId> {
        self.instance.security_group.allow_from(
            stack,
            &format!("{}IngressFrom{}", self.instance.id, peer.id),
            peer,
            PortRange::single(self.instance.port),
            "Postgres Port",
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkProps;
    use crate::security_group::ingress_rules;
    use crate::stack::Environment;

    fn setup() -> (Stack, Network) {
        let mut stack = Stack::new(
            "acme-StagingStack",
            Environment {
                account: "123456789012".into(),
                region: "us-east-1".into(),
            },
        )
        .unwrap();
        let network = Network::new(&mut stack, "hasura-vpc", &NetworkProps::default()).unwrap();
        (stack, network)
    }

    #[test]
    fn instance_shape() {
        let (mut stack, network) = setup();
        let db = Database::new(
            &mut stack,
            "HasuraDatabase",
            &network,
            &DatabaseProps::new("acme", false),
        )
        .unwrap();
        let t = stack.synth();
        let r = &t.resources[db.instance.id.as_str()];

        assert_eq!(r.ty, "AWS::RDS::DBInstance");
        assert_eq!(r.prop("DBInstanceIdentifier").unwrap(), "acme");
        assert_eq!(r.prop("DBName").unwrap(), "acme");
        assert_eq!(r.prop("Engine").unwrap(), "postgres");
        assert_eq!(r.prop("DBInstanceClass").unwrap(), "db.t3.micro");
        assert_eq!(r.prop("AllocatedStorage").unwrap(), "20");
        assert_eq!(r.prop("MaxAllocatedStorage").unwrap(), 100);
        assert_eq!(r.prop("StorageEncrypted").unwrap(), true);
        assert_eq!(r.prop("DeletionProtection").unwrap(), false);
        assert_eq!(r.prop("MultiAZ").unwrap(), false);
        assert_eq!(r.deletion_policy, Some(RemovalPolicy::Delete));

        let group = &t.resources[db.instance.subnet_group.as_str()];
        assert_eq!(
            group.prop("SubnetIds").unwrap(),
            &Value::Array(network.subnet_refs(SubnetType::Isolated))
        );
    }

    #[test]
    fn app_user_inherits_master_coordinates() {
        let (mut stack, network) = setup();
        let db = Database::new(
            &mut stack,
            "HasuraDatabase",
            &network,
            &DatabaseProps::new("acme", false),
        )
        .unwrap();

        assert_eq!(db.app_user.coordinates, db.master.coordinates);
        assert_eq!(db.app_user.coordinates.dbname, "acme");
        assert_eq!(db.app_user.target, db.instance.id);
        assert_eq!(db.master.target, db.instance.id);

        let t = stack.synth();
        let attachments: Vec<&Resource> = t
            .resources_of_type("AWS::SecretsManager::SecretTargetAttachment")
            .map(|(_, r)| r)
            .collect();
        assert_eq!(attachments.len(), 2);
        for a in attachments {
            assert_eq!(a.prop("TargetId").unwrap(), &db.instance.id.reference());
            assert_eq!(a.prop("TargetType").unwrap(), "AWS::RDS::DBInstance");
        }
    }

    #[test]
    fn generate_and_attach_are_separate_steps() {
        let (mut stack, network) = setup();
        let props = DatabaseProps::new("acme", false);
        let master = GeneratedSecret::generate(&mut stack, "Master", "syscdk", None).unwrap();
        assert!(stack
            .resources_of_type("AWS::SecretsManager::SecretTargetAttachment")
            .is_empty());

        let instance = DatabaseInstance::new(&mut stack, "Db", &network, &props, &master).unwrap();
        let master = master.attach(&mut stack, &instance).unwrap();
        let user = GeneratedSecret::generate(&mut stack, "User", "hasura", Some(&master)).unwrap();
        assert_eq!(
            stack
                .resources_of_type("AWS::SecretsManager::SecretTargetAttachment")
                .len(),
            1
        );

        let secret = stack.resource(user.id.as_str()).unwrap();
        let template = &secret.prop("GenerateSecretString").unwrap()["SecretStringTemplate"];
        assert!(template.to_string().contains("masterarn"));
        let user = user.attach(&mut stack, &instance).unwrap();
        assert_eq!(user.coordinates, master.coordinates);
    }

    #[test]
    fn ingress_permits_exactly_the_database_port() {
        let (mut stack, network) = setup();
        let db = Database::new(
            &mut stack,
            "HasuraDatabase",
            &network,
            &DatabaseProps::new("acme", false),
        )
        .unwrap();
        let fleet = SecurityGroup::new(&mut stack, "FleetSg", &network.vpc, "fleet").unwrap();
        db.allow_from(&mut stack, &fleet).unwrap();

        let t = stack.synth();
        let rules = ingress_rules(&t, &db.instance.security_group);
        assert_eq!(rules.len(), 1);
        let rule = rules[0];
        assert_eq!(rule.prop("IpProtocol").unwrap(), "tcp");
        assert_eq!(rule.prop("FromPort").unwrap(), 5432);
        assert_eq!(rule.prop("ToPort").unwrap(), 5432);
        assert_eq!(rule.prop("SourceSecurityGroupId").unwrap(), &fleet.group_id());
        assert!(rule.prop("CidrIp").is_none());
    }

    #[test]
    fn outputs_expose_both_secret_arns() {
        let (mut stack, network) = setup();
        let db = Database::new(
            &mut stack,
            "HasuraDatabase",
            &network,
            &DatabaseProps::new("acme", true),
        )
        .unwrap();
        let outputs = stack.outputs();
        assert_eq!(outputs["HasuraDatabaseUserSecretArn"].value, db.app_user.arn());
        assert_eq!(outputs["HasuraDatabaseMasterSecretArn"].value, db.master.arn());
        assert_eq!(
            stack.resource(db.instance.id.as_str()).unwrap().prop("MultiAZ").unwrap(),
            true
        );
    }

    #[test]
    fn needs_two_isolated_subnets() {
        let mut stack = Stack::new(
            "acme-StagingStack",
            Environment {
                account: "123456789012".into(),
                region: "us-east-1".into(),
            },
        )
        .unwrap();
        let props = NetworkProps {
            max_azs: 1,
            ..NetworkProps::default()
        };
        let network = Network::new(&mut stack, "vpc", &props).unwrap();
        let err = Database::new(&mut stack, "Db", &network, &DatabaseProps::new("acme", false))
            .unwrap_err();
        assert!(matches!(err, InfraError::InvalidConfig { name: "network", .. }));
    }
}
