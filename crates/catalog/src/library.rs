//! Live library view backed by the platform and the session store

use chrono::Utc;
use sideload_config::SettingsHandle;
use sideload_errors::Error;
use sideload_platform::InstallerGateway;
use sideload_state::SessionStore;
use sideload_types::{Item, SessionId};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::{merge, Catalog, LibrarySnapshot};

/// Static catalog merged with live installed and in-flight state
#[derive(Clone)]
pub struct LibraryCatalog {
    catalog: Arc<Catalog>,
    gateway: Arc<dyn InstallerGateway>,
    store: Arc<dyn SessionStore>,
    settings: SettingsHandle,
}

impl LibraryCatalog {
    pub fn new(
        catalog: Arc<Catalog>,
        gateway: Arc<dyn InstallerGateway>,
        store: Arc<dyn SessionStore>,
        settings: SettingsHandle,
    ) -> Self {
        Self {
            catalog,
            gateway,
            store,
            settings,
        }
    }

    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    #[must_use]
    pub fn item(&self, id: &str) -> Option<&Item> {
        self.catalog.get(id)
    }

    /// Compute the current library view.
    ///
    /// A store read failure counts as "no sessions tracked"; the platform
    /// queries are required.
    ///
    /// # Errors
    ///
    /// Returns an error if the installed packages or live sessions cannot be
    /// queried from the platform.
    pub async fn snapshot(&self) -> Result<LibrarySnapshot, Error> {
        let installed = self.gateway.query_installed_packages().await?;
        let active: BTreeSet<SessionId> = self
            .gateway
            .list_active_sessions()
            .await?
            .into_iter()
            .filter(|session| session.active)
            .map(|session| session.session_id)
            .collect();

        let records = match self.store.list_active().await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "session store unreadable, assuming no tracked sessions");
                Vec::new()
            }
        };

        Ok(merge(
            &self.catalog,
            &installed,
            &records,
            &active,
            self.settings.current(),
            Utc::now(),
        ))
    }
}
