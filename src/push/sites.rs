use anyhow::Result;

use super::deploy::{push_deployables, Deployable};
use super::{PushContext, PushKind, PushSummary};
use crate::api::{DeployKind, DeploymentSource};
use crate::config::{self, ConfigStore};
use crate::models::Site;

impl Deployable for Site {
    const DEPLOY: DeployKind = DeployKind::Site;
    const PUSH_KIND: PushKind = PushKind::Sites;
    const CONFIG_KEY: &'static str = config::SITES;
    const IDENTITY_FIELD: &'static str = "framework";
    const DOMAIN_VARIABLE: &'static str = "_APP_DOMAIN_SITES";

    fn load(store: &ConfigStore) -> Result<Vec<Self>> {
        store.get_sites()
    }

    fn identity(&self) -> &str {
        &self.framework
    }

    fn source_path(&self) -> &str {
        &self.path
    }

    fn ignored(&self) -> &[String] {
        &self.ignore
    }

    fn deployment_source(&self, archive: Vec<u8>) -> DeploymentSource {
        DeploymentSource {
            archive,
            activate: true,
            install_command: self.install_command.clone(),
            build_command: self.build_command.clone(),
            output_directory: self.output_directory.clone(),
            ..DeploymentSource::default()
        }
    }

    fn console_path(&self, deployment_id: &str) -> String {
        format!("sites/site-{}/deployments/deployment-{deployment_id}", self.id)
    }
}

pub async fn push_sites(ctx: &PushContext<'_>, store: &mut ConfigStore) -> Result<PushSummary> {
    push_deployables::<Site>(ctx, store).await
}
