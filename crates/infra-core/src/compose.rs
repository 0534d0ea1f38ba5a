use crate::actions::{ActionHandler, ActionsProps};
use crate::certificate::Certificates;
use crate::config::StackConfig;
use crate::database::{Database, DatabaseProps};
use crate::error::Result;
use crate::network::{Network, NetworkProps};
use crate::secrets::ApplicationSecrets;
use crate::service::{Service, ServiceDeps, ServiceProps};
use crate::stack::Stack;
use std::path::Path;

pub const NETWORK_ID: &str = "hasura-vpc";
pub const DATABASE_ID: &str = "HasuraDatabase";
pub const SERVICE_ID: &str = "HasuraFargateService";
pub const ACTIONS_ID: &str = "Actions";

/// The composed stack plus handles to every component in it.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub stack: Stack,
    pub network: Network,
    pub certificates: Certificates,
    pub secrets: ApplicationSecrets,
    pub database: Database,
    pub service: Service,
    pub actions: ActionHandler,
}

/// Build the whole deployment: network, certificates, the GraphQL service
/// (secrets, database, fleet), then the action handler.
///
/// `root` anchors a relative `actions_dir`.
pub fn compose(config: &StackConfig, root: &Path) -> Result<Deployment> {
    config.ensure_valid()?;

    let mut stack = Stack::new(config.stack_name(), config.environment())?;
    stack.set_description(format!(
        "GraphQL engine on Postgres for {} ({})",
        config.app_name, config.stage
    ));
    stack.add_tag("AppName", config.app_name.as_str());
    stack.add_tag("Env", config.stage.as_str());

    let zone = config.hosted_zone();

    let network = Network::new(&mut stack, NETWORK_ID, &NetworkProps::default())?;
    let certificates = Certificates::new(
        &mut stack,
        &zone,
        &config.hasura_hostname,
        &config.actions_hostname,
    )?;

    let secrets = ApplicationSecrets::new(&mut stack, &config.app_name)?;
    let database = Database::new(
        &mut stack,
        DATABASE_ID,
        &network,
        &DatabaseProps::new(&config.app_name, config.multi_az),
    )?;
    let service = Service::new(
        &mut stack,
        SERVICE_ID,
        ServiceDeps {
            network: &network,
            database: &database,
            secrets: &secrets,
            certificate: &certificates.hasura,
            zone: &zone,
        },
        &ServiceProps::new(&config.app_name, &config.hasura_hostname, config.multi_az),
    )?;

    let actions = ActionHandler::new(
        &mut stack,
        ACTIONS_ID,
        &zone,
        &certificates.actions,
        &ActionsProps::new(
            &config.app_name,
            &config.actions_hostname,
            &root.join(&config.actions_dir),
        ),
    )?;

    tracing::info!(
        stack = stack.name(),
        resources = stack.resources().len(),
        assets = stack.assets().len(),
        "composed deployment"
    );

    Ok(Deployment {
        stack,
        network,
        certificates,
        secrets,
        database,
        service,
        actions,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
