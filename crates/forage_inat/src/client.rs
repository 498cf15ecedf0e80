//! Observation and taxon lookups against the iNaturalist v1 API.

use forage_core::{
    error::{ConfigError, SourceError},
    model::TaxonId,
    resolver::{Observation, ObservationPage, ObservationQuery, ObservationSource},
    taxonomy::{TaxonLookup, TaxonSummary, PLACEHOLDER_IMAGE_URL},
};
use serde::Deserialize;

use crate::{config::InatConfig, http};

pub struct InatClient {
    http: reqwest::blocking::Client,
    config: InatConfig,
}

impl InatClient {
    pub fn new(config: InatConfig) -> Result<Self, ClientInitError> {
        config.validate()?;
        let http = http::build_client(&config)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &InatConfig {
        &self.config
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientInitError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Http(#[from] SourceError),
}

impl ObservationSource for InatClient {
    fn query(&self, query: &ObservationQuery) -> Result<ObservationPage, SourceError> {
        let url = self.config.endpoint("observations");
        let body = http::get_text(&self.http, &url, &query.params())?;
        parse_observations(&body)
    }
}

impl TaxonLookup for InatClient {
    fn taxon(&self, id: TaxonId) -> Result<TaxonSummary, SourceError> {
        let url = self.config.endpoint(&format!("taxa/{id}"));
        let body = http::get_text(&self.http, &url, &[])?;
        parse_taxon(&body, id)
    }
}

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    #[serde(default)]
    total_results: u64,
    #[serde(default)]
    results: Vec<ObservationRecord>,
}

#[derive(Debug, Deserialize)]
struct ObservationRecord {
    taxon: Option<ObservationTaxon>,
    location: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObservationTaxon {
    id: Option<u64>,
    #[serde(default)]
    ancestor_ids: Vec<u64>,
}

/// Extracted as a separate function for testability with canned bodies.
pub fn parse_observations(body: &str) -> Result<ObservationPage, SourceError> {
    let response: ObservationsResponse =
        serde_json::from_str(body).map_err(|e| SourceError::Decode(e.to_string()))?;
    let results = response
        .results
        .into_iter()
        .map(|record| {
            let (taxon_id, ancestor_ids) = match record.taxon {
                Some(taxon) => (
                    taxon.id.map(TaxonId),
                    taxon.ancestor_ids.into_iter().map(TaxonId).collect(),
                ),
                None => (None, Vec::new()),
            };
            Observation {
                taxon_id,
                ancestor_ids,
                location: record.location,
            }
        })
        .collect();
    Ok(ObservationPage {
        total_results: response.total_results,
        results,
    })
}

#[derive(Debug, Deserialize)]
struct TaxaResponse {
    #[serde(default)]
    results: Vec<TaxonRecord>,
}

#[derive(Debug, Deserialize)]
struct TaxonRecord {
    id: u64,
    #[serde(default)]
    name: String,
    preferred_common_name: Option<String>,
    wikipedia_summary: Option<String>,
    default_photo: Option<PhotoRecord>,
    #[serde(default)]
    taxon_photos: Vec<TaxonPhoto>,
}

#[derive(Debug, Deserialize)]
struct TaxonPhoto {
    photo: PhotoRecord,
}

#[derive(Debug, Deserialize)]
struct PhotoRecord {
    medium_url: Option<String>,
}

pub fn parse_taxon(body: &str, id: TaxonId) -> Result<TaxonSummary, SourceError> {
    let response: TaxaResponse =
        serde_json::from_str(body).map_err(|e| SourceError::Decode(e.to_string()))?;
    let record = response
        .results
        .into_iter()
        .find(|record| record.id == id.0)
        .ok_or_else(|| SourceError::Decode(format!("taxon {id} missing from response")))?;

    let photo_url = record
        .taxon_photos
        .iter()
        .find_map(|entry| entry.photo.medium_url.clone())
        .or_else(|| {
            record
                .default_photo
                .as_ref()
                .and_then(|photo| photo.medium_url.clone())
        })
        .unwrap_or_else(|| PLACEHOLDER_IMAGE_URL.to_string());

    Ok(TaxonSummary {
        id,
        preferred_common_name: record.preferred_common_name,
        scientific_name: record.name,
        summary: record.wikipedia_summary,
        photo_url,
    })
}
