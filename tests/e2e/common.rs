use chrono::{DateTime, Utc};
use dispatch_shared::ids::OrganizationId;
use dispatch_shared::types::Tier;
use dispatch_store::Store;

pub async fn seed_org(store: &Store, tier: Tier, now: DateTime<Utc>) -> OrganizationId {
    let org_id = OrganizationId::new();
    store.create_organization(org_id, tier, "whsec_test", now).await.unwrap();
    org_id
}
