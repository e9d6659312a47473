pub mod config;
pub mod db;
pub mod enrichment; // postal-code lookup + stale-result discard
pub mod error;
pub mod models;
pub mod normalize;
pub mod reconcile; // insert-vs-update, load-time defaults
pub mod rules; // flag-driven requiredness
pub mod schema;
pub mod session;
pub mod wizard;

pub use config::FormConfig;
pub use db::{RecordStore, SqliteRecordStore};
pub use enrichment::{AddressLookup, LookupError, ViaCepClient};
pub use error::FormError;
pub use models::{EntityKind, Record};
pub use reconcile::Reconciler;
pub use schema::{FormSchema, PATIENT_SCHEMA, PROFILE_SCHEMA};
pub use session::{FormSession, SessionEvent};

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber. `RUST_LOG` wins over the built-in filter.
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} form engine v{}", config::APP_NAME, config::APP_VERSION);
    }
}

/// Engine wired to SQLite and ViaCEP from a `FormConfig`.
pub struct FormEngine {
    pub config: FormConfig,
    pub lookup: ViaCepClient,
    patients: Reconciler<SqliteRecordStore>,
    profiles: Reconciler<SqliteRecordStore>,
}

impl FormEngine {
    pub fn open(config: FormConfig) -> Result<Self, FormError> {
        let lookup = ViaCepClient::from_config(&config)?;
        let patients = Reconciler::new(SqliteRecordStore::open(&config.database_path)?, &PATIENT_SCHEMA);
        let profiles = Reconciler::new(SqliteRecordStore::open(&config.database_path)?, &PROFILE_SCHEMA);
        tracing::info!(db = %config.database_path.display(), "Form engine ready");
        Ok(Self {
            config,
            lookup,
            patients,
            profiles,
        })
    }

    pub fn reconciler(&self, entity: EntityKind) -> &Reconciler<SqliteRecordStore> {
        match entity {
            EntityKind::Patient => &self.patients,
            EntityKind::Profile => &self.profiles,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }

    #[tokio::test]
    async fn engine_opens_on_disk_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let config = FormConfig {
            database_path: dir.path().join("records.db"),
            ..FormConfig::default()
        };
        let engine = FormEngine::open(config).unwrap();

        let mut session = FormSession::for_owner(&PROFILE_SCHEMA, Some("user-1")).unwrap();
        let reconciler = engine.reconciler(EntityKind::Profile);
        session.replace_record(schema::fixtures::valid_profile("user-1"));
        let id = session.submit(reconciler).await.unwrap();

        let mut reopened = FormSession::new(&PROFILE_SCHEMA);
        reopened.open_profile(reconciler, Some("user-1")).await.unwrap();
        assert_eq!(reopened.record().id.as_deref(), Some(id.as_str()));
        assert!(engine.reconciler(EntityKind::Patient).list().await.unwrap().is_empty());
    }
}
