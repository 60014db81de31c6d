//! Static catalog of installable items

use serde::Deserialize;
use sideload_errors::{ConfigError, Error};
use sideload_types::{Item, ItemId};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    items: Vec<Item>,
}

/// Immutable set of items, ordered by id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Catalog {
    items: BTreeMap<ItemId, Item>,
}

impl Catalog {
    /// Build a catalog; later duplicates of an id are rejected
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if two items share an id.
    pub fn from_items(items: impl IntoIterator<Item = Item>) -> Result<Self, Error> {
        let mut map = BTreeMap::new();
        for item in items {
            if map.contains_key(&item.id) {
                return Err(ConfigError::Invalid {
                    message: format!("duplicate catalog item {}", item.id),
                }
                .into());
            }
            map.insert(item.id.clone(), item);
        }
        Ok(Self { items: map })
    }

    /// The four demo apps shipped with the client
    #[must_use]
    pub fn sample() -> Self {
        let items = [
            Item::new("com.acme.spaceshooter", "Space Shooter", "ACME Inc.", "icons/spaceshooter.png"),
            Item::new(
                "com.champollion.pockettranslator",
                "Pocket Translator",
                "Champollion SA",
                "icons/pockettranslator.png",
            ),
            Item::new("com.echolabs.citymaker", "City Maker", "Echo Labs Ltd", "icons/citymaker.png"),
            Item::new("com.paca.nicekart", "Nice Kart", "PACA SARL", "icons/nicekart.png"),
        ];
        Self {
            items: items.into_iter().map(|item| (item.id.clone(), item)).collect(),
        }
    }

    /// Load a TOML file of `[[items]]` tables
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, does not parse, or
    /// contains duplicate ids.
    pub async fn load_from_file(path: &Path) -> Result<Self, Error> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::from(ConfigError::NotFound {
                    path: path.display().to_string(),
                })
            } else {
                Error::io_with_path(&e, path)
            }
        })?;
        let file: CatalogFile = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            message: e.to_string(),
        })?;
        let catalog = Self::from_items(file.items)?;
        tracing::debug!(path = %path.display(), items = catalog.len(), "catalog loaded");
        Ok(catalog)
    }

    /// Load from `path` when given, otherwise the sample catalog
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Catalog::load_from_file`].
    pub async fn load_or_sample(path: Option<&Path>) -> Result<Self, Error> {
        match path {
            Some(path) => Self::load_from_file(path).await,
            None => Ok(Self::sample()),
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Item> {
        self.items.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.items.contains_key(id)
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
