//! `dispatch-ctl apikey ...`. Key minting is the only place the raw secret
//! is ever visible: `dispatch-store` persists only `key_hash`.

use dispatch_shared::ids::ApiKeyId;
use dispatch_store::Store;
use secrecy::ExposeSecret;

use crate::output;
use crate::ApikeyCommands;

pub async fn handle(store: &Store, cmd: ApikeyCommands) -> anyhow::Result<()> {
    match cmd {
        ApikeyCommands::Create { org, name } => create(store, org, name).await,
    }
}

async fn create(store: &Store, org: dispatch_shared::ids::OrganizationId, name: String) -> anyhow::Result<()> {
    store.get_organization(org).await?;
    let new_key = dispatch_shared::apikey::generate();
    store.create_api_key(ApiKeyId::new(), org, &name, &new_key.key_id, &new_key.key_hash).await?;

    output::success(format!("created api key {name}"));
    output::label("key_id", &new_key.key_id);
    output::label("secret", new_key.secret.expose_secret());
    output::warning("this secret is shown once and is not recoverable");
    Ok(())
}
