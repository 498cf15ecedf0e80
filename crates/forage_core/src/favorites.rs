use serde::{Deserialize, Serialize};

use crate::{
    error::StoreError,
    model::TaxonId,
    storage::{read_json, write_json, KeyValueStore},
};

pub const FAVORITES_KEY: &str = "favorites";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorite {
    pub id: TaxonId,
    pub name: String,
    #[serde(rename = "imageURL", default)]
    pub image_url: String,
}

/// Saved species, in the order the user added them.
pub struct FavoritesStore<K> {
    kv: K,
}

impl<K: KeyValueStore> FavoritesStore<K> {
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    pub fn list(&self) -> Result<Vec<Favorite>, StoreError> {
        Ok(read_json(&self.kv, FAVORITES_KEY)?.unwrap_or_default())
    }

    pub fn contains(&self, id: TaxonId) -> Result<bool, StoreError> {
        Ok(self.list()?.iter().any(|favorite| favorite.id == id))
    }

    /// Adding a species twice keeps the first entry.
    pub fn add(&self, favorite: Favorite) -> Result<bool, StoreError> {
        let mut favorites = self.list()?;
        if favorites.iter().any(|existing| existing.id == favorite.id) {
            return Ok(false);
        }
        favorites.push(favorite);
        write_json(&self.kv, FAVORITES_KEY, &favorites)?;
        Ok(true)
    }

    pub fn remove(&self, id: TaxonId) -> Result<bool, StoreError> {
        let mut favorites = self.list()?;
        let before = favorites.len();
        favorites.retain(|favorite| favorite.id != id);
        if favorites.len() == before {
            return Ok(false);
        }
        if favorites.is_empty() {
            self.kv.remove(FAVORITES_KEY)?;
        } else {
            write_json(&self.kv, FAVORITES_KEY, &favorites)?;
        }
        Ok(true)
    }
}
