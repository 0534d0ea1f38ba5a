use crate::error::Result;
use crate::stack::{LogicalId, Stack};
use crate::template::{intrinsic, Resource};
use serde_json::{json, Value};

const POLICY_VERSION: &str = "2012-10-17";

/// `arn:<partition>:iam::aws:policy/<name>` for an AWS-managed policy.
pub fn managed_policy(name: &str) -> Value {
    intrinsic::sub(&format!(
        "arn:${{{}}}:iam::aws:policy/{name}",
        intrinsic::PARTITION
    ))
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub actions: Vec<String>,
    pub resources: Vec<Value>,
}

impl Statement {
    pub fn allow(actions: &[&str], resources: Vec<Value>) -> Self {
        Self {
            actions: actions.iter().map(|a| a.to_string()).collect(),
            resources,
        }
    }

    fn to_json(&self) -> Value {
        let action = match self.actions.as_slice() {
            [single] => Value::from(single.as_str()),
            many => Value::from(many.to_vec()),
        };
        let resource = match self.resources.as_slice() {
            [single] => single.clone(),
            many => Value::Array(many.to_vec()),
        };
        json!({ "Effect": "Allow", "Action": action, "Resource": resource })
    }
}

#[derive(Debug, Clone)]
pub struct Role {
    pub id: LogicalId,
}

impl Role {
    /// A role assumable by `service` (e.g. `lambda.amazonaws.com`).
    pub fn new(
        stack: &mut Stack,
        id: &str,
        service: &str,
        managed_policies: Vec<Value>,
    ) -> Result<Self> {
        let mut props = json!({
            "AssumeRolePolicyDocument": {
                "Version": POLICY_VERSION,
                "Statement": [{
                    "Effect": "Allow",
                    "Principal": { "Service": service },
                    "Action": "sts:AssumeRole",
                }],
            },
        });
        if !managed_policies.is_empty() {
            props["ManagedPolicyArns"] = Value::Array(managed_policies);
        }
        let id = stack.add_resource(id, Resource::new("AWS::IAM::Role", props))?;
        Ok(Self { id })
    }

    pub fn arn(&self) -> Value {
        self.id.get_att("Arn")
    }

    /// Attach an inline policy with `statements` to this role.
    pub fn add_policy(
        &self,
        stack: &mut Stack,
        id: &str,
        statements: &[Statement],
    ) -> Result<LogicalId> {
        let name = crate::names::sanitize_logical_id(id)?;
        let statements: Vec<Value> = statements.iter().map(Statement::to_json).collect();
        stack.add_resource(
            id,
            Resource::new(
                "AWS::IAM::Policy",
                json!({
                    "PolicyName": name,
                    "PolicyDocument": {
                        "Version": POLICY_VERSION,
                        "Statement": statements,
                    },
                    "Roles": [self.id.reference()],
                }),
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::Environment;

    #[test]
    fn role_and_policy() {
        let mut stack = Stack::new(
            "acme-StagingStack",
            Environment {
                account: "123456789012".into(),
                region: "us-east-1".into(),
            },
        )
        .unwrap();
        let role = Role::new(
            &mut stack,
            "FnRole",
            "lambda.amazonaws.com",
            vec![managed_policy("service-role/AWSLambdaBasicExecutionRole")],
        )
        .unwrap();
        let policy = role
            .add_policy(
                &mut stack,
                "FnRoleDefaultPolicy",
                &[
                    Statement::allow(&["secretsmanager:GetSecretValue"], vec![json!("arn:a")]),
                    Statement::allow(&["logs:CreateLogStream", "logs:PutLogEvents"], vec![
                        json!("arn:b"),
                        json!("arn:c"),
                    ]),
                ],
            )
            .unwrap();

        let r = stack.resource(role.id.as_str()).unwrap();
        assert_eq!(
            r.prop("AssumeRolePolicyDocument").unwrap()["Statement"][0]["Principal"]["Service"],
            "lambda.amazonaws.com"
        );
        assert_eq!(
            r.prop("ManagedPolicyArns").unwrap()[0],
            json!({ "Fn::Sub": "arn:${AWS::Partition}:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole" })
        );

        let p = stack.resource(policy.as_str()).unwrap();
        let statements = &p.prop("PolicyDocument").unwrap()["Statement"];
        assert_eq!(statements[0]["Action"], "secretsmanager:GetSecretValue");
        assert_eq!(statements[0]["Resource"], "arn:a");
        assert_eq!(statements[1]["Action"], json!(["logs:CreateLogStream", "logs:PutLogEvents"]));
        assert_eq!(p.prop("Roles").unwrap(), &json!([{ "Ref": "FnRole" }]));
    }
}
