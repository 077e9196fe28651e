use std::sync::Arc;

use chrono::Duration;
use secrecy::SecretSlice;
use tracing::info;

use crate::config::{Config, ReplayBackend};
use crate::db::Store;
use crate::qr::{DbReplayGuard, MemoryReplayGuard, ReplayGuard, SignatureService};
use crate::services::{
    LeaveService, QrService, QrSettings, ScanService, SeaOrmLeaveService, SeaOrmQrService,
    SeaOrmScanService, VerifyPolicies,
};

/// Services and configuration shared by the HTTP layer and the CLI.
#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<Config>,

    pub store: Store,

    pub signer: Arc<SignatureService>,

    pub replay_guard: Arc<dyn ReplayGuard>,

    pub qr_service: Arc<dyn QrService>,

    pub scan_service: Arc<dyn ScanService>,

    pub leave_service: Arc<dyn LeaveService>,
}

impl SharedState {
    /// Opens the database and builds every service. The HMAC key is resolved
    /// here, once.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let key = config.qr.load_hmac_key()?;

        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        Self::from_parts(config, store, &key)
    }

    /// Builds the services over an already opened store.
    pub fn from_parts(
        config: Config,
        store: Store,
        key: &SecretSlice<u8>,
    ) -> anyhow::Result<Self> {
        let signer = Arc::new(SignatureService::new(key)?);
        let settings = QrSettings::from(&config.qr);

        let replay_guard: Arc<dyn ReplayGuard> = match config.qr.replay_backend {
            ReplayBackend::Memory => Arc::new(MemoryReplayGuard::new()),
            ReplayBackend::Database => Arc::new(DbReplayGuard::new(
                store.clone(),
                settings.create_retry_attempts,
                settings.create_retry_backoff,
            )),
        };
        info!(backend = ?config.qr.replay_backend, "Replay guard ready");

        let qr_service: Arc<dyn QrService> = Arc::new(SeaOrmQrService::new(
            store.clone(),
            signer.clone(),
            settings.clone(),
        ));

        let scan_service: Arc<dyn ScanService> = Arc::new(SeaOrmScanService::new(
            store.clone(),
            signer.clone(),
            replay_guard.clone(),
            VerifyPolicies::from(&config.qr),
        ));

        let leave_service: Arc<dyn LeaveService> = Arc::new(SeaOrmLeaveService::new(
            store.clone(),
            qr_service.clone(),
            Duration::minutes(i64::from(config.qr.short_validity_minutes)),
            settings.pixels_per_module,
        ));

        Ok(Self {
            config: Arc::new(config),
            store,
            signer,
            replay_guard,
            qr_service,
            scan_service,
            leave_service,
        })
    }
}
