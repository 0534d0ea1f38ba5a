//! Application secret placeholders.
//!
//! The three secrets are declared empty: no `SecretString`, no
//! `GenerateSecretString`. A post-deploy step reads their ARNs from the
//! stack outputs and writes the real values.

use crate::error::Result;
use crate::stack::{LogicalId, Stack};
use crate::template::Resource;
use serde_json::{json, Value};

#[derive(Debug, Clone)]
pub struct PlaceholderSecret {
    pub id: LogicalId,
    pub name: String,
}

impl PlaceholderSecret {
    pub fn new(stack: &mut Stack, id: &str, name: &str, description: &str) -> Result<Self> {
        let id = stack.add_resource(
            id,
            Resource::new(
                "AWS::SecretsManager::Secret",
                json!({
                    "Name": name,
                    "Description": description,
                }),
            ),
        )?;
        Ok(Self {
            id,
            name: name.to_string(),
        })
    }

    /// `Ref` of a secret resolves to its ARN.
    pub fn arn(&self) -> Value {
        self.id.reference()
    }
}

#[derive(Debug, Clone)]
pub struct ApplicationSecrets {
    pub database_url: PlaceholderSecret,
    pub admin: PlaceholderSecret,
    pub jwt: PlaceholderSecret,
}

impl ApplicationSecrets {
    /// Declare the placeholders and export each ARN.
    pub fn new(stack: &mut Stack, app_name: &str) -> Result<Self> {
        let database_url = PlaceholderSecret::new(
            stack,
            "HasuraDatabaseUrlSecret",
            &format!("{app_name}-HasuraDatabaseUrl"),
            "Postgres connection URL used by the GraphQL engine",
        )?;
        stack.add_output(
            "HasuraDatabaseUrlSecretArn",
            "ARN of the database URL placeholder secret",
            database_url.arn(),
        )?;

        let admin = PlaceholderSecret::new(
            stack,
            "HasuraAdminSecret",
            &format!("{app_name}-HasuraAdminSecret"),
            "Admin secret of the GraphQL engine",
        )?;
        stack.add_output(
            "HasuraAdminSecretArn",
            "ARN of the admin placeholder secret",
            admin.arn(),
        )?;

        let jwt = PlaceholderSecret::new(
            stack,
            "HasuraJwtSecret",
            &format!("{app_name}-HasuraJWTSecret"),
            "JWT signing configuration of the GraphQL engine",
        )?;
        stack.add_output(
            "HasuraJwtSecretArn",
            "ARN of the JWT placeholder secret",
            jwt.arn(),
        )?;

        Ok(Self {
            database_url,
            admin,
            jwt,
        })
    }

    pub fn all(&self) -> [&PlaceholderSecret; 3] {
        [&self.database_url, &self.admin, &self.jwt]
    }
}
