use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    config::Config,
    database::{PgStore, init_postgres},
    game::{Dice, RandomDice},
    identity::{Actor, IdentityProvider, StaticIdentity, SupabaseIdentity},
    memory::MemoryStore,
    models::{NewAccount, Role},
    store::Store,
};

pub const DEV_TOKEN: &str = "dev-admin";

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub identity: Arc<dyn IdentityProvider>,
    pub dice: Arc<dyn Dice>,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let database_url = config
            .database_url
            .as_deref()
            .context("DATABASE_URL is not configured")?;

        let pool = init_postgres(database_url, config.db_max_connections)
            .await
            .context("Failed to connect to Postgres")?;

        let store = PgStore::new(pool);
        store.migrate().await.context("Failed to run migrations")?;
        info!("Migrations applied");

        let identity = SupabaseIdentity::new(
            config
                .supabase_url
                .as_deref()
                .context("SUPABASE_URL is not configured")?,
            config
                .supabase_anon_key
                .clone()
                .context("SUPABASE_ANON_KEY is not configured")?,
            config
                .supabase_service_key
                .clone()
                .context("SUPABASE_SERVICE_ROLE_KEY is not configured")?,
        );

        Ok(Self::from_parts(
            config,
            Arc::new(store),
            Arc::new(identity),
            Arc::new(RandomDice),
        ))
    }

    /// Local run without Postgres or Supabase. `DEV_TOKEN` authenticates a seeded admin.
    pub async fn in_memory(config: Config) -> anyhow::Result<Arc<Self>> {
        warn!("Running with the in-memory store, nothing will be persisted");

        let admin = Actor {
            id: Uuid::new_v4(),
            email: "admin@localhost.dev".to_string(),
            full_name: Some("Local Admin".to_string()),
        };

        let store = MemoryStore::new();
        store
            .insert_account(NewAccount {
                user_id: admin.id,
                email: admin.email.clone(),
                full_name: admin.full_name.clone(),
                phone_number: None,
                role: Role::Admin,
                balance: 100,
            })
            .await?;
        info!(user_id = %admin.id, "Seeded local admin, use bearer token {DEV_TOKEN}");

        let identity = StaticIdentity::new().with_token(DEV_TOKEN, admin);

        Ok(Self::from_parts(
            config,
            Arc::new(store),
            Arc::new(identity),
            Arc::new(RandomDice),
        ))
    }

    pub fn from_parts(
        config: Config,
        store: Arc<dyn Store>,
        identity: Arc<dyn IdentityProvider>,
        dice: Arc<dyn Dice>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            identity,
            dice,
        })
    }
}
