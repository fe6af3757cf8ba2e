//! Free-text search over a schedule index.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::Serialize;

use crate::identifiers::*;
use crate::realtime::reconcile::{is_train_number, normalize_train_number};
use crate::schedule::index::ScheduleIndex;

/// Most results a single search returns
pub const MAX_RESULTS: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchResult {
    Stop {
        stop_id: StopIdentifier,
        name: String,
    },
    Route {
        route_id: RouteIdentifier,
        name: String,
    },
    Train {
        trip_id: TripIdentifier,
        train_number: String,
        origin: Option<String>,
        destination: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SearchKind {
    Stop,
    Route,
    Train,
}

impl SearchResult {
    pub fn kind(&self) -> SearchKind {
        match self {
            Self::Stop { .. } => SearchKind::Stop,
            Self::Route { .. } => SearchKind::Route,
            Self::Train { .. } => SearchKind::Train,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Stop { stop_id, .. } => stop_id.as_str(),
            Self::Route { route_id, .. } => route_id.as_str(),
            Self::Train { trip_id, .. } => trip_id.as_str(),
        }
    }

    /// One-line description for lists
    pub fn label(&self) -> String {
        match self {
            Self::Stop { name, .. } | Self::Route { name, .. } => name.clone(),
            Self::Train {
                train_number,
                origin,
                destination,
                ..
            } => match (origin, destination) {
                (Some(from), Some(to)) => format!("Train {train_number}: {from} to {to}"),
                _ => format!("Train {train_number}"),
            },
        }
    }
}

/// How well a candidate string matched, best first
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum MatchQuality {
    Exact,
    Prefix,
    Substring,
    /// Trip serving a stop the query named exactly
    ServesStop,
}

fn match_quality(candidate: &str, needle: &str) -> Option<MatchQuality> {
    let candidate = candidate.to_lowercase();
    if candidate == needle {
        Some(MatchQuality::Exact)
    } else if candidate.starts_with(needle) {
        Some(MatchQuality::Prefix)
    } else if candidate.contains(needle) {
        Some(MatchQuality::Substring)
    } else {
        None
    }
}

fn best_match<'a>(
    candidates: impl IntoIterator<Item = &'a str>,
    needle: &str,
) -> Option<MatchQuality> {
    candidates
        .into_iter()
        .filter_map(|candidate| match_quality(candidate, needle))
        .min()
}

struct Ranked {
    quality: MatchQuality,
    result: SearchResult,
}

impl Ranked {
    fn rank_order(&self, other: &Self) -> Ordering {
        self.quality
            .cmp(&other.quality)
            .then_with(|| self.result.kind().cmp(&other.result.kind()))
            .then_with(|| self.result.label().cmp(&other.result.label()))
            .then_with(|| self.result.id().cmp(other.result.id()))
    }
}

impl ScheduleIndex {
    /// Case-insensitive search across stops, routes and trains.
    ///
    /// Ranked exact before prefix before substring, de-duplicated and capped
    /// at [`MAX_RESULTS`]. An empty query finds nothing.
    pub fn search(&self, query: &str) -> Vec<SearchResult> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }

        let mut ranked = Vec::new();
        let mut named_stops = Vec::new();

        for stop in self.stops() {
            if stop.name.to_lowercase() == needle || stop.id.as_str().to_lowercase() == needle {
                named_stops.push(stop.id.clone());
            }
            if let Some(quality) = best_match([stop.name.as_str(), stop.id.as_str()], &needle) {
                ranked.push(Ranked {
                    quality,
                    result: SearchResult::Stop {
                        stop_id: stop.id.clone(),
                        name: stop.name.clone(),
                    },
                });
            }
        }

        for route in self.routes() {
            let names = [
                route.short_name.as_deref(),
                route.long_name.as_deref(),
                Some(route.id.as_str()),
            ];
            if let Some(quality) = best_match(names.into_iter().flatten(), &needle) {
                ranked.push(Ranked {
                    quality,
                    result: SearchResult::Route {
                        route_id: route.id.clone(),
                        name: route.display_name().to_string(),
                    },
                });
            }
        }

        if is_train_number(query) {
            let number = normalize_train_number(query);
            for trip_id in self.trip_ids() {
                let candidate = self.train_number(trip_id.as_str());
                if let Some(quality) = match_quality(&candidate, &number) {
                    ranked.push(Ranked {
                        quality,
                        result: self.train_result(trip_id),
                    });
                }
            }
        }

        for stop_id in named_stops {
            for trip_id in self.trips_for_stop(stop_id.as_str()) {
                ranked.push(Ranked {
                    quality: MatchQuality::ServesStop,
                    result: self.train_result(trip_id),
                });
            }
        }

        ranked.sort_by(Ranked::rank_order);

        let mut seen = HashSet::new();
        ranked
            .into_iter()
            .map(|r| r.result)
            .filter(|result| seen.insert((result.kind(), result.id().to_string())))
            .take(MAX_RESULTS)
            .collect()
    }

    fn train_result(&self, trip_id: &TripIdentifier) -> SearchResult {
        let stop_times = self.stop_times(trip_id.as_str());
        let name_of = |index: Option<usize>| {
            index
                .and_then(|i| stop_times.get(i))
                .map(|st| {
                    let id = st.stop_id.as_str();
                    self.stop_name(id).unwrap_or(id).to_string()
                })
        };

        SearchResult::Train {
            trip_id: trip_id.clone(),
            train_number: self.train_number(trip_id.as_str()),
            origin: name_of(Some(0)),
            destination: name_of(stop_times.len().checked_sub(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::index::fixtures::{self, stop, stop_time};

    fn index() -> ScheduleIndex {
        ScheduleIndex::build(fixtures::corridor(), None)
    }

    #[test]
    fn test_empty_query_finds_nothing() {
        assert!(index().search("   ").is_empty());
    }

    #[test]
    fn test_stop_name_case_insensitive() {
        let results = index().search("chicago");
        assert_eq!(
            results[0],
            SearchResult::Stop {
                stop_id: StopIdentifier::new("C"),
                name: "Chicago".into()
            }
        );
    }

    #[test]
    fn test_exact_ranks_before_prefix_and_substring() {
        let mut tables = fixtures::corridor();
        tables.stops.push(stop("P1", "New Haven", 41.3, -72.9));
        tables.stops.push(stop("P2", "Haven", 41.0, -73.0));
        tables.stops.push(stop("P3", "Havenwood", 41.0, -73.0));
        let index = ScheduleIndex::build(tables, None);

        let names: Vec<_> = index
            .search("haven")
            .into_iter()
            .filter(|r| r.kind() == SearchKind::Stop)
            .map(|r| r.label())
            .collect();
        assert_eq!(names, vec!["Haven", "Havenwood", "New Haven"]);
    }

    #[test]
    fn test_route_by_short_name() {
        let results = index().search("lsl");
        assert!(matches!(
            &results[0],
            SearchResult::Route { route_id, name }
                if route_id.as_str() == "R1" && name == "Lake Shore Limited"
        ));
    }

    #[test]
    fn test_train_number_with_carrier_prefix() {
        let results = index().search("AMTK 049");
        let trains: Vec<_> = results
            .iter()
            .filter(|r| r.kind() == SearchKind::Train)
            .collect();

        assert_eq!(trains.len(), 1);
        assert_eq!(trains[0].id(), "T1");
        assert_eq!(trains[0].label(), "Train 49: Albany to Chicago");
    }

    #[test]
    fn test_exact_stop_lists_serving_trips() {
        let results = index().search("Buffalo");
        assert_eq!(results[0].kind(), SearchKind::Stop);
        assert!(results.iter().any(|r| r.kind() == SearchKind::Train && r.id() == "T1"));
        assert!(!results.iter().any(|r| r.id() == "T2"));
    }

    #[test]
    fn test_results_capped_and_deduplicated() {
        let mut tables = fixtures::corridor();
        for i in 0..30 {
            let id = format!("X{i}");
            tables.stops.push(stop(&id, &format!("Xenia {i}"), 39.0, -84.0));
            tables.stop_times.push(stop_time(&format!("T{i}"), &id, "08:00:00", 1));
        }
        let index = ScheduleIndex::build(tables, None);

        let results = index.search("x");
        assert_eq!(results.len(), MAX_RESULTS);

        let mut identities: Vec<_> = results
            .iter()
            .map(|r| (r.kind(), r.id().to_string()))
            .collect();
        identities.sort();
        identities.dedup();
        assert_eq!(identities.len(), MAX_RESULTS);
    }
}
