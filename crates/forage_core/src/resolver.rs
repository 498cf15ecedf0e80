use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::{
    config::ResolverConfig,
    error::{ConfigError, SourceError},
    geo::haversine_km,
    model::{CandidateSet, Coordinate, DistanceMap, NearestDistance, TaxonId},
};

/// One request against the observation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationQuery {
    pub taxon_ids: Vec<TaxonId>,
    pub origin: Coordinate,
    pub radius_km: f64,
    pub per_page: u32,
}

impl ObservationQuery {
    /// Query-string parameters in the order the service documents them.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let taxa = self
            .taxon_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        vec![
            ("taxon_id", taxa),
            ("verifiable", "true".to_string()),
            ("geoprivacy", "open".to_string()),
            ("licensed", "true".to_string()),
            ("per_page", self.per_page.to_string()),
            ("lat", self.origin.lat.to_string()),
            ("lng", self.origin.lng.to_string()),
            ("radius", self.radius_km.to_string()),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub taxon_id: Option<TaxonId>,
    #[serde(default)]
    pub ancestor_ids: Vec<TaxonId>,
    /// `"lat,lng"` as reported by the service.
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationPage {
    pub total_results: u64,
    pub results: Vec<Observation>,
}

/// Anything able to answer observation queries, usually the remote service.
pub trait ObservationSource: Send + Sync {
    fn query(&self, query: &ObservationQuery) -> Result<ObservationPage, SourceError>;
}

impl<S: ObservationSource + ?Sized> ObservationSource for &S {
    fn query(&self, query: &ObservationQuery) -> Result<ObservationPage, SourceError> {
        (**self).query(query)
    }
}

impl<S: ObservationSource + ?Sized> ObservationSource for Box<S> {
    fn query(&self, query: &ObservationQuery) -> Result<ObservationPage, SourceError> {
        (**self).query(query)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Emitted once per search, right before the first candidate is found.
    /// A search that finds nothing never emits it.
    FirstResult,
    Resolved {
        taxon: TaxonId,
        distance: NearestDistance,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchState {
    Searching,
    Exhausted,
    Done,
}

/// Expanding-radius search for the nearest sighting of each candidate.
///
/// Each call to `next` runs at most one query against the source. Found
/// candidates are reported as soon as their pass completes; whatever is
/// still unresolved when the radius passes the cap (or the source fails)
/// is reported as [`NearestDistance::NotFound`].
pub struct DistanceSearch<'a, S: ObservationSource + ?Sized> {
    source: &'a S,
    config: ResolverConfig,
    origin: Coordinate,
    remaining: BTreeSet<TaxonId>,
    results: DistanceMap,
    radius_km: f64,
    passes: usize,
    first_reported: bool,
    queue: VecDeque<ProgressEvent>,
    state: SearchState,
}

impl<'a, S: ObservationSource + ?Sized> DistanceSearch<'a, S> {
    fn new(
        source: &'a S,
        config: ResolverConfig,
        candidates: &CandidateSet,
        origin: Coordinate,
    ) -> Self {
        Self {
            source,
            config,
            origin,
            remaining: candidates.keys().copied().collect(),
            results: DistanceMap::new(),
            radius_km: config.initial_radius_km,
            passes: 0,
            first_reported: false,
            queue: VecDeque::new(),
            state: SearchState::Searching,
        }
    }

    pub fn results(&self) -> &DistanceMap {
        &self.results
    }

    /// Radius the next pass would query with.
    pub fn radius_km(&self) -> f64 {
        self.radius_km
    }

    pub fn passes(&self) -> usize {
        self.passes
    }

    pub fn remaining(&self) -> impl Iterator<Item = &TaxonId> {
        self.remaining.iter()
    }

    /// Runs the search to completion and returns every candidate's distance.
    pub fn finish(mut self) -> DistanceMap {
        for _ in self.by_ref() {}
        self.results
    }

    fn run_pass(&mut self) {
        if self.remaining.is_empty() || self.radius_km > self.config.max_radius_km {
            self.state = SearchState::Exhausted;
            return;
        }

        let query = ObservationQuery {
            taxon_ids: self.remaining.iter().copied().collect(),
            origin: self.origin,
            radius_km: self.radius_km,
            per_page: self.config.page_size,
        };
        self.passes += 1;
        tracing::debug!(
            pass = self.passes,
            radius_km = self.radius_km,
            taxa = query.taxon_ids.len(),
            "querying observations"
        );

        let page = match self.source.query(&query) {
            Ok(page) => page,
            Err(err) => {
                tracing::warn!(%err, radius_km = self.radius_km, "observation query failed, abandoning search");
                self.state = SearchState::Exhausted;
                return;
            }
        };

        let nearest = self.nearest_in_page(&page);
        let resolved = nearest.len();
        for (taxon, km) in nearest {
            if !self.first_reported {
                self.first_reported = true;
                self.queue.push_back(ProgressEvent::FirstResult);
            }
            self.remaining.remove(&taxon);
            self.record(taxon, NearestDistance::Found(km));
        }

        if page.total_results == 0 {
            self.radius_km *= 2.0;
        } else if resolved == 0 {
            // Results came back but none carried a usable location for a
            // remaining candidate. Retrying the same radius would repeat the
            // same answer forever.
            tracing::warn!(
                radius_km = self.radius_km,
                total_results = page.total_results,
                "pass resolved nothing, widening search"
            );
            self.radius_km *= 2.0;
        }
    }

    fn nearest_in_page(&self, page: &ObservationPage) -> BTreeMap<TaxonId, f64> {
        let mut nearest: BTreeMap<TaxonId, f64> = BTreeMap::new();
        for observation in &page.results {
            let matched: Vec<TaxonId> = self
                .remaining
                .iter()
                .copied()
                .filter(|candidate| {
                    observation.taxon_id == Some(*candidate)
                        || observation.ancestor_ids.contains(candidate)
                })
                .collect();
            if matched.is_empty() {
                continue;
            }
            let Some(location) = observation
                .location
                .as_deref()
                .and_then(|raw| Coordinate::parse(raw).ok())
            else {
                tracing::debug!(taxon = ?observation.taxon_id, "skipping observation without usable location");
                continue;
            };
            let km = haversine_km(location, self.origin);
            for taxon in matched {
                nearest
                    .entry(taxon)
                    .and_modify(|best| *best = best.min(km))
                    .or_insert(km);
            }
        }
        nearest
    }

    fn record(&mut self, taxon: TaxonId, distance: NearestDistance) {
        self.results.insert(taxon, distance);
        self.queue
            .push_back(ProgressEvent::Resolved { taxon, distance });
    }

    fn mark_unresolved(&mut self) {
        let unresolved = std::mem::take(&mut self.remaining);
        if !unresolved.is_empty() {
            tracing::debug!(count = unresolved.len(), "no sightings found");
        }
        for taxon in unresolved {
            self.record(taxon, NearestDistance::NotFound);
        }
    }
}

impl<S: ObservationSource + ?Sized> Iterator for DistanceSearch<'_, S> {
    type Item = ProgressEvent;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Some(event);
            }
            match self.state {
                SearchState::Searching => self.run_pass(),
                SearchState::Exhausted => {
                    self.mark_unresolved();
                    self.state = SearchState::Done;
                }
                SearchState::Done => return None,
            }
        }
    }
}

pub struct DistanceResolver<S> {
    source: S,
    config: ResolverConfig,
}

impl<S: ObservationSource> DistanceResolver<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            config: ResolverConfig::default(),
        }
    }

    pub fn with_config(source: S, config: ResolverConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { source, config })
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Starts a search; drive it by iterating the returned progress events.
    pub fn search(&self, candidates: &CandidateSet, origin: Coordinate) -> DistanceSearch<'_, S> {
        DistanceSearch::new(&self.source, self.config, candidates, origin)
    }

    /// Callback flavour of [`DistanceResolver::search`]. `on_progress` sees every
    /// candidate exactly once; `on_first_result` fires once, when the first
    /// candidate is found, and never if nothing is found.
    #[instrument(skip_all, fields(candidates = candidates.len()))]
    pub fn resolve_distances(
        &self,
        candidates: &CandidateSet,
        origin: Coordinate,
        mut on_progress: impl FnMut(TaxonId, NearestDistance),
        mut on_first_result: impl FnMut(),
    ) -> DistanceMap {
        let mut search = self.search(candidates, origin);
        for event in search.by_ref() {
            match event {
                ProgressEvent::FirstResult => on_first_result(),
                ProgressEvent::Resolved { taxon, distance } => on_progress(taxon, distance),
            }
        }
        tracing::info!(
            passes = search.passes(),
            found = search.results().values().filter(|d| d.is_found()).count(),
            "distance search finished"
        );
        search.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Replays canned pages in order and records every query it receives.
    #[derive(Default)]
    struct ScriptedSource {
        pages: Mutex<VecDeque<Result<ObservationPage, SourceError>>>,
        queries: Mutex<Vec<ObservationQuery>>,
    }

    impl ScriptedSource {
        fn new(pages: Vec<Result<ObservationPage, SourceError>>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                queries: Mutex::new(Vec::new()),
            }
        }

        fn radii(&self) -> Vec<f64> {
            self.queries.lock().iter().map(|q| q.radius_km).collect()
        }
    }

    impl ObservationSource for ScriptedSource {
        fn query(&self, query: &ObservationQuery) -> Result<ObservationPage, SourceError> {
            self.queries.lock().push(query.clone());
            self.pages
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(ObservationPage::default()))
        }
    }

    fn obs(taxon: u64, ancestors: &[u64], location: &str) -> Observation {
        Observation {
            taxon_id: Some(TaxonId(taxon)),
            ancestor_ids: ancestors.iter().copied().map(TaxonId).collect(),
            location: Some(location.to_string()),
        }
    }

    fn page(results: Vec<Observation>) -> Result<ObservationPage, SourceError> {
        Ok(ObservationPage {
            total_results: results.len() as u64,
            results,
        })
    }

    fn candidates(ids: &[u64]) -> CandidateSet {
        ids.iter()
            .map(|id| (TaxonId(*id), format!("taxon {id}")))
            .collect()
    }

    const ORIGIN: Coordinate = Coordinate { lat: 0.0, lng: 0.0 };

    #[test]
    fn query_params_join_taxa_and_fix_flags() {
        let query = ObservationQuery {
            taxon_ids: vec![TaxonId(1), TaxonId(22)],
            origin: Coordinate::new(1.5, -2.0),
            radius_km: 4.0,
            per_page: 200,
        };
        let params = query.params();
        assert!(params.contains(&("taxon_id", "1,22".to_string())));
        assert!(params.contains(&("verifiable", "true".to_string())));
        assert!(params.contains(&("geoprivacy", "open".to_string())));
        assert!(params.contains(&("licensed", "true".to_string())));
        assert!(params.contains(&("per_page", "200".to_string())));
        assert!(params.contains(&("radius", "4".to_string())));
    }

    #[test]
    fn doubles_radius_until_a_match_appears() {
        let source = ScriptedSource::new(vec![
            page(vec![]),
            page(vec![]),
            page(vec![]),
            page(vec![obs(7, &[], "0.1,0.0")]),
        ]);
        let resolver = DistanceResolver::new(&source);
        let results = resolver.search(&candidates(&[7]), ORIGIN).finish();

        assert_eq!(source.radii(), vec![2.0, 4.0, 8.0, 16.0]);
        let km = results[&TaxonId(7)].km().unwrap();
        assert!((km - 11.12).abs() < 0.01, "got {km}");
    }

    #[test]
    fn gives_up_after_the_radius_cap() {
        let source = ScriptedSource::new(vec![]);
        let resolver = DistanceResolver::new(&source);
        let results = resolver.search(&candidates(&[1, 2]), ORIGIN).finish();

        assert_eq!(source.radii(), vec![2.0, 4.0, 8.0, 16.0, 32.0]);
        assert_eq!(results.len(), 2);
        assert!(results.values().all(|d| *d == NearestDistance::NotFound));
    }

    #[test]
    fn nothing_found_never_signals_a_first_result() {
        let source = ScriptedSource::new(vec![]);
        let resolver = DistanceResolver::new(&source);
        let mut progress = Vec::new();
        let mut first = 0;
        let results = resolver.resolve_distances(
            &candidates(&[1, 2]),
            ORIGIN,
            |taxon, distance| progress.push((taxon, distance)),
            || first += 1,
        );

        assert_eq!(first, 0);
        assert_eq!(
            progress,
            vec![
                (TaxonId(1), NearestDistance::NotFound),
                (TaxonId(2), NearestDistance::NotFound),
            ]
        );
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn ancestor_matches_count_for_the_candidate() {
        let source = ScriptedSource::new(vec![page(vec![obs(999, &[48225, 100], "0.0,0.05")])]);
        let resolver = DistanceResolver::new(&source);
        let results = resolver.search(&candidates(&[100]), ORIGIN).finish();
        assert!(results[&TaxonId(100)].is_found());
    }

    #[test]
    fn keeps_the_smallest_distance_within_a_page() {
        let source = ScriptedSource::new(vec![page(vec![
            obs(5, &[], "0.2,0.0"),
            obs(5, &[], "0.01,0.0"),
            obs(5, &[], "0.1,0.0"),
        ])]);
        let resolver = DistanceResolver::new(&source);
        let results = resolver.search(&candidates(&[5]), ORIGIN).finish();
        let km = results[&TaxonId(5)].km().unwrap();
        assert!((km - 1.112).abs() < 0.01, "got {km}");
    }

    #[test]
    fn partially_resolved_pass_retries_remaining_at_same_radius() {
        let source = ScriptedSource::new(vec![
            page(vec![obs(1, &[], "0.01,0.0")]),
            page(vec![obs(2, &[], "0.02,0.0")]),
        ]);
        let resolver = DistanceResolver::new(&source);
        let results = resolver.search(&candidates(&[1, 2]), ORIGIN).finish();

        let queries = source.queries.lock();
        assert_eq!(queries.len(), 2);
        assert_eq!(queries[0].taxon_ids, vec![TaxonId(1), TaxonId(2)]);
        assert_eq!(queries[1].taxon_ids, vec![TaxonId(2)]);
        assert_eq!(queries[1].radius_km, 2.0);
        assert!(results.values().all(|d| d.is_found()));
    }

    #[test]
    fn results_without_location_widen_instead_of_spinning() {
        let unlocated = Observation {
            taxon_id: Some(TaxonId(3)),
            ancestor_ids: vec![],
            location: None,
        };
        let source = ScriptedSource::new(vec![
            page(vec![unlocated.clone()]),
            page(vec![unlocated]),
        ]);
        let resolver = DistanceResolver::new(&source);
        let results = resolver.search(&candidates(&[3]), ORIGIN).finish();
        assert_eq!(source.radii(), vec![2.0, 4.0, 8.0, 16.0, 32.0]);
        assert_eq!(results[&TaxonId(3)], NearestDistance::NotFound);
    }

    #[test]
    fn source_failure_aborts_and_marks_the_rest_not_found() {
        let source = ScriptedSource::new(vec![
            page(vec![obs(1, &[], "0.01,0.0")]),
            Err(SourceError::Status(503)),
        ]);
        let resolver = DistanceResolver::new(&source);
        let mut progress = Vec::new();
        let mut first = 0;
        let results = resolver.resolve_distances(
            &candidates(&[1, 2]),
            ORIGIN,
            |taxon, distance| progress.push((taxon, distance)),
            || first += 1,
        );

        assert_eq!(source.radii(), vec![2.0, 2.0]);
        assert_eq!(first, 1);
        assert_eq!(progress.len(), 2);
        assert!(results[&TaxonId(1)].is_found());
        assert_eq!(results[&TaxonId(2)], NearestDistance::NotFound);
    }

    #[test]
    fn first_result_precedes_the_first_resolution() {
        let source = ScriptedSource::new(vec![page(vec![obs(1, &[], "0.0,0.0")])]);
        let resolver = DistanceResolver::new(&source);
        let events: Vec<ProgressEvent> = resolver.search(&candidates(&[1]), ORIGIN).collect();
        assert_eq!(
            events,
            vec![
                ProgressEvent::FirstResult,
                ProgressEvent::Resolved {
                    taxon: TaxonId(1),
                    distance: NearestDistance::Found(0.0),
                },
            ]
        );
    }

    #[test]
    fn empty_candidate_set_makes_no_queries() {
        let source = ScriptedSource::new(vec![]);
        let resolver = DistanceResolver::new(&source);
        let mut search = resolver.search(&CandidateSet::new(), ORIGIN);
        assert!(search.next().is_none());
        assert!(search.results().is_empty());
        assert!(source.radii().is_empty());
    }

    #[test]
    fn rejects_invalid_config() {
        let source = ScriptedSource::new(vec![]);
        let config = ResolverConfig {
            page_size: 0,
            ..Default::default()
        };
        assert!(DistanceResolver::with_config(&source, config).is_err());
    }
}
