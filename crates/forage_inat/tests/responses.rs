use forage_core::{
    model::{Coordinate, TaxonId},
    taxonomy::PLACEHOLDER_IMAGE_URL,
};
use forage_inat::client::{parse_observations, parse_taxon};

const OBSERVATIONS: &str = r#"{
  "total_results": 2,
  "page": 1,
  "per_page": 200,
  "results": [
    {
      "id": 190001,
      "location": "47.6101,-122.3420",
      "geoprivacy": null,
      "taxon": {
        "id": 47602,
        "name": "Taraxacum officinale",
        "ancestor_ids": [48460, 47126, 211194, 47125, 47124, 47604, 47605, 47602]
      }
    },
    {
      "id": 190002,
      "location": null,
      "taxon": { "id": 75899, "ancestor_ids": [48460, 47126] }
    }
  ]
}"#;

const TAXON: &str = r#"{
  "total_results": 1,
  "results": [
    {
      "id": 47602,
      "name": "Taraxacum officinale",
      "preferred_common_name": "common dandelion",
      "wikipedia_summary": "Taraxacum officinale, the dandelion, is a flowering herbaceous perennial.",
      "default_photo": { "medium_url": "https://static.inaturalist.org/photos/default/medium.jpg" },
      "taxon_photos": [
        { "photo": { "id": 1, "medium_url": "https://static.inaturalist.org/photos/1/medium.jpg" } },
        { "photo": { "id": 2, "medium_url": "https://static.inaturalist.org/photos/2/medium.jpg" } }
      ]
    }
  ]
}"#;

#[test]
fn observations_map_taxon_ancestors_and_location() {
    let page = parse_observations(OBSERVATIONS).expect("parse observations");
    assert_eq!(page.total_results, 2);
    assert_eq!(page.results.len(), 2);

    let first = &page.results[0];
    assert_eq!(first.taxon_id, Some(TaxonId(47602)));
    assert!(first.ancestor_ids.contains(&TaxonId(47604)));
    let at = Coordinate::parse(first.location.as_deref().unwrap()).unwrap();
    assert_eq!(at, Coordinate::new(47.6101, -122.342));

    assert_eq!(page.results[1].location, None);
}

#[test]
fn taxon_uses_first_taxon_photo() {
    let summary = parse_taxon(TAXON, TaxonId(47602)).expect("parse taxon");
    assert_eq!(summary.display_name(), "common dandelion");
    assert_eq!(summary.scientific_name, "Taraxacum officinale");
    assert!(summary.summary.unwrap().contains("dandelion"));
    assert_eq!(
        summary.photo_url,
        "https://static.inaturalist.org/photos/1/medium.jpg"
    );
}

#[test]
fn taxon_without_photos_gets_placeholder() {
    let body = r#"{"results": [{"id": 5, "name": "Urtica dioica"}]}"#;
    let summary = parse_taxon(body, TaxonId(5)).unwrap();
    assert_eq!(summary.photo_url, PLACEHOLDER_IMAGE_URL);
    assert_eq!(summary.display_name(), "Urtica dioica");
}

#[test]
fn missing_taxon_is_an_error() {
    assert!(parse_taxon(r#"{"results": []}"#, TaxonId(5)).is_err());
}
