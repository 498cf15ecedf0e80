use serde::{Deserialize, Serialize};

use crate::{error::SourceError, model::TaxonId};

/// Shown wherever a species photo could not be fetched.
pub const PLACEHOLDER_IMAGE_URL: &str =
    "https://www.inaturalist.org/assets/iconic_taxa/plantae-200px.png";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonSummary {
    pub id: TaxonId,
    pub preferred_common_name: Option<String>,
    pub scientific_name: String,
    pub summary: Option<String>,
    /// Medium-resolution photo, or [`PLACEHOLDER_IMAGE_URL`].
    pub photo_url: String,
}

impl TaxonSummary {
    pub fn display_name(&self) -> &str {
        self.preferred_common_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.scientific_name)
    }
}

pub trait TaxonLookup: Send + Sync {
    fn taxon(&self, id: TaxonId) -> Result<TaxonSummary, SourceError>;
}

impl<T: TaxonLookup + ?Sized> TaxonLookup for &T {
    fn taxon(&self, id: TaxonId) -> Result<TaxonSummary, SourceError> {
        (**self).taxon(id)
    }
}

/// Photo for `id`, falling back to the placeholder when the lookup fails.
pub fn photo_url_or_placeholder(lookup: &(impl TaxonLookup + ?Sized), id: TaxonId) -> String {
    match lookup.taxon(id) {
        Ok(summary) => summary.photo_url,
        Err(err) => {
            tracing::warn!(%err, taxon = %id, "taxon lookup failed, using placeholder image");
            PLACEHOLDER_IMAGE_URL.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Offline;

    impl TaxonLookup for Offline {
        fn taxon(&self, _id: TaxonId) -> Result<TaxonSummary, SourceError> {
            Err(SourceError::Transport("offline".into()))
        }
    }

    #[test]
    fn lookup_failure_falls_back_to_placeholder() {
        assert_eq!(
            photo_url_or_placeholder(&Offline, TaxonId(1)),
            PLACEHOLDER_IMAGE_URL
        );
    }

    #[test]
    fn display_name_prefers_common_name() {
        let mut summary = TaxonSummary {
            id: TaxonId(47602),
            preferred_common_name: Some("common dandelion".into()),
            scientific_name: "Taraxacum officinale".into(),
            summary: None,
            photo_url: PLACEHOLDER_IMAGE_URL.into(),
        };
        assert_eq!(summary.display_name(), "common dandelion");
        summary.preferred_common_name = Some(" ".into());
        assert_eq!(summary.display_name(), "Taraxacum officinale");
    }
}
