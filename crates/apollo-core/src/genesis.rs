//! # Genesis Composition
//!
//! Every service may contribute a [`Modifier`] during setup. The [`GenesisComposer`] folds the
//! base document through those modifiers, in service-declaration order, and finalizes the
//! result: written once to disk and shared read-only (behind an `Arc`) with every start call.
//!
//! Composition is fail-fast. The first modifier error aborts and is attributed to the
//! service that contributed it. With no modifiers the base document comes out unchanged.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{BoxError, Error, Result};

/// Name of the finalized genesis artifact inside the run's root directory.
pub const GENESIS_FILE: &str = "genesis.json";

/// A validator registered at genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub name: String,
    pub power: u64,
}

/// An account funded at genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub address: String,
    pub balance: u64,
}

/// The shared genesis document of a network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisDoc {
    pub chain_id: String,
    pub initial_height: u64,
    #[serde(default)]
    pub validators: Vec<Validator>,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub app_state: serde_json::Value,
}

impl Default for GenesisDoc {
    fn default() -> Self {
        Self::new("apollo-devnet")
    }
}

impl GenesisDoc {
    pub fn new(chain_id: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            initial_height: 1,
            validators: Vec::new(),
            accounts: Vec::new(),
            app_state: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn with_validator(mut self, name: impl Into<String>, power: u64) -> Self {
        self.validators.push(Validator {
            name: name.into(),
            power,
        });
        self
    }

    /// Credit `amount` to `address`, creating the account if needed.
    pub fn fund_account(mut self, address: impl Into<String>, amount: u64) -> Self {
        let address = address.into();
        match self.accounts.iter_mut().find(|a| a.address == address) {
            Some(account) => account.balance += amount,
            None => self.accounts.push(Account {
                address,
                balance: amount,
            }),
        }
        self
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }
}

/// A pure transformation of the genesis document contributed by one service.
pub type Modifier = Box<dyn FnOnce(GenesisDoc) -> Result<GenesisDoc, BoxError> + Send>;

/// Box a closure as a [`Modifier`].
pub fn modifier<F>(f: F) -> Modifier
where
    F: FnOnce(GenesisDoc) -> Result<GenesisDoc, BoxError> + Send + 'static,
{
    Box::new(f)
}

/// Folds a base document through per-service modifiers.
pub struct GenesisComposer {
    base: GenesisDoc,
    modifiers: Vec<(String, Modifier)>,
}

impl GenesisComposer {
    pub fn new(base: GenesisDoc) -> Self {
        Self {
            base,
            modifiers: Vec::new(),
        }
    }

    /// Queue `modifier`, attributed to `service`. Applied in push order.
    pub fn push(&mut self, service: impl Into<String>, modifier: Modifier) {
        self.modifiers.push((service.into(), modifier));
    }

    pub fn len(&self) -> usize {
        self.modifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modifiers.is_empty()
    }

    /// Apply every modifier left to right. Stops at the first failure.
    pub fn compose(self) -> Result<GenesisDoc> {
        self.modifiers
            .into_iter()
            .try_fold(self.base, |doc, (service, modify)| {
                debug!(%service, "Applying genesis modifier");
                modify(doc).map_err(|source| Error::GenesisComposition { service, source })
            })
    }

    /// Compose, then persist the result to `<root_dir>/genesis.json`.
    ///
    /// The document is written to a temporary file and renamed into place, so a reader never
    /// sees a truncated artifact.
    pub async fn finalize(self, root_dir: &Path) -> Result<Arc<GenesisDoc>> {
        let doc = self.compose()?;
        let path = root_dir.join(GENESIS_FILE);
        let tmp = root_dir.join(format!("{GENESIS_FILE}.tmp"));
        let write_err = |source| Error::GenesisWrite {
            path: path.clone(),
            source,
        };

        let bytes = doc
            .to_json()
            .map_err(|e| write_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        tokio::fs::write(&tmp, &bytes).await.map_err(write_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(write_err)?;

        info!(
            path = %path.display(),
            chain_id = %doc.chain_id,
            validators = doc.validators.len(),
            accounts = doc.accounts.len(),
            "Genesis finalized"
        );
        Ok(Arc::new(doc))
    }
}
