use std::sync::Arc;

use crate::config::AppConfig;
use crate::database::credentials::CredentialStore;
use crate::database::ledger::TransactionLedger;
use crate::database::offers::OfferLookup;
use crate::errors::Result;
use crate::services::mpesa_service::MpesaService;
use crate::services::reconciler::CallbackReconciler;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub mpesa_service: Arc<MpesaService>,
    pub reconciler: Arc<CallbackReconciler>,
    pub ledger: Arc<dyn TransactionLedger>,
    pub credentials: Arc<dyn CredentialStore>,
}

impl AppState {
    /// Wires every component from one config snapshot and the three stores.
    pub fn new(
        config: AppConfig,
        credentials: Arc<dyn CredentialStore>,
        offers: Arc<dyn OfferLookup>,
        ledger: Arc<dyn TransactionLedger>,
    ) -> Result<Self> {
        let mpesa_service = MpesaService::new(
            config.gateway.clone(),
            credentials.clone(),
            offers,
            ledger.clone(),
        )?;

        Ok(AppState {
            config: Arc::new(config),
            mpesa_service: Arc::new(mpesa_service),
            reconciler: Arc::new(CallbackReconciler::new(ledger.clone())),
            ledger,
            credentials,
        })
    }
}
