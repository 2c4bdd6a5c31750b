use media_migrate_config::MatchingConfig;
use media_migrate_models::{DestinationShowMatch, MatchMethod, WatchedShow};
use media_migrate_sources::{Destination, MigrateError};
use tracing::{debug, warn};

use crate::similarity::{best_hit, meets_threshold, search_query};

/// Resolves source shows to destination show ids.
///
/// The TMDB id lookup is authoritative: a show found that way never reaches
/// the title search. Lookup errors other than fatal ones degrade to
/// `Unresolved`.
#[derive(Debug, Clone)]
pub struct ShowMatcher {
    similarity_threshold: f64,
    title_fallback: bool,
}

impl Default for ShowMatcher {
    fn default() -> Self {
        Self::from_config(&MatchingConfig::default())
    }
}

impl ShowMatcher {
    pub fn new(similarity_threshold: f64, title_fallback: bool) -> Self {
        Self {
            similarity_threshold,
            title_fallback,
        }
    }

    pub fn from_config(config: &MatchingConfig) -> Self {
        Self::new(config.similarity_threshold, config.title_fallback)
    }

    pub async fn resolve(
        &self,
        destination: &dyn Destination,
        show: &WatchedShow,
    ) -> Result<DestinationShowMatch, MigrateError> {
        let mut id_miss = None;

        if let Some(tmdb_id) = show.ids.tmdb_id {
            match destination.show_by_tmdb_id(tmdb_id).await {
                Ok(Some(found)) => {
                    debug!("Matched '{}' by TMDB id {} -> {}", show.title, tmdb_id, found.name);
                    return Ok(DestinationShowMatch::Matched {
                        show_id: found.id,
                        method: MatchMethod::ExternalId,
                        score: 1.0,
                    });
                }
                Ok(None) => id_miss = Some(format!("TMDB id {} not found", tmdb_id)),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("TMDB lookup for '{}' failed: {}", show.title, e);
                    id_miss = Some(format!("TMDB lookup failed: {}", e));
                }
            }
        }

        if !self.title_fallback {
            return Ok(DestinationShowMatch::Unresolved {
                reason: id_miss.unwrap_or_else(|| "no TMDB id and title search disabled".to_string()),
            });
        }

        let query = search_query(&show.title);
        let hits = match destination.search_shows(&query).await {
            Ok(hits) => hits,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                return Ok(DestinationShowMatch::Unresolved {
                    reason: format!("title search failed: {}", e),
                })
            }
        };

        let Some((hit, score)) = best_hit(&show.title, show.year, &hits) else {
            return Ok(DestinationShowMatch::Unresolved {
                reason: format!("no search results for '{}'", query),
            });
        };

        if meets_threshold(score, self.similarity_threshold) {
            debug!("Matched '{}' by title -> '{}' (score {:.2})", show.title, hit.name, score);
            Ok(DestinationShowMatch::Matched {
                show_id: hit.id,
                method: MatchMethod::TitleSearch,
                score,
            })
        } else {
            Ok(DestinationShowMatch::Unresolved {
                reason: format!(
                    "best candidate '{}' scored {:.2}, below {:.2}",
                    hit.name, score, self.similarity_threshold
                ),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{show, FakeDestination};
    use media_migrate_models::{DestinationShow, SearchHit};

    #[tokio::test]
    async fn test_id_match_never_falls_through_to_title_search() {
        let dest = FakeDestination::new().with_show(DestinationShow {
            id: 1396,
            name: "Something Else Entirely".to_string(),
            year: Some(2008),
        });
        let matched = ShowMatcher::default()
            .resolve(&dest, &show("Breaking Bad", Some(2008), Some(1396)))
            .await
            .unwrap();

        assert_eq!(
            matched,
            DestinationShowMatch::Matched {
                show_id: 1396,
                method: MatchMethod::ExternalId,
                score: 1.0
            }
        );
        assert_eq!(dest.calls("search"), 0);
    }

    #[tokio::test]
    async fn test_title_fallback_above_threshold() {
        let dest = FakeDestination::new().with_search_hits(vec![
            SearchHit { id: 5, name: "The Office".to_string(), year: Some(2005) },
            SearchHit { id: 6, name: "The Office".to_string(), year: Some(2001) },
        ]);
        let matched = ShowMatcher::default()
            .resolve(&dest, &show("The Office (US)", Some(2005), None))
            .await
            .unwrap();

        // "office us" vs "office": 1 - 3/9, plus the year bonus, is below 0.85
        assert!(!matched.is_matched());

        let matched = ShowMatcher::default()
            .resolve(&dest, &show("Office", Some(2005), None))
            .await
            .unwrap();
        assert_eq!(matched.show_id(), Some(5));
        assert!(matches!(matched, DestinationShowMatch::Matched { method: MatchMethod::TitleSearch, .. }));
    }

    #[tokio::test]
    async fn test_below_threshold_is_unresolved() {
        let dest = FakeDestination::new().with_search_hits(vec![SearchHit {
            id: 9,
            name: "Breaking Point".to_string(),
            year: Some(2008),
        }]);
        let matched = ShowMatcher::default()
            .resolve(&dest, &show("Breaking Bad", Some(2008), Some(1)))
            .await
            .unwrap();

        match matched {
            DestinationShowMatch::Unresolved { reason } => assert!(reason.contains("Breaking Point")),
            other => panic!("expected unresolved, got {:?}", other),
        }
        assert_eq!(dest.calls("search"), 1);
    }

    #[tokio::test]
    async fn test_title_fallback_disabled() {
        let dest = FakeDestination::new().with_search_hits(vec![SearchHit {
            id: 9,
            name: "Dark".to_string(),
            year: None,
        }]);
        let matched = ShowMatcher::new(0.85, false)
            .resolve(&dest, &show("Dark", None, None))
            .await
            .unwrap();
        assert!(!matched.is_matched());
        assert_eq!(dest.calls("search"), 0);
    }

    #[tokio::test]
    async fn test_fatal_lookup_errors_propagate() {
        let dest = FakeDestination::new().failing_lookups(|| MigrateError::ServiceUnavailable {
            service: "serializd",
            message: "502".to_string(),
        });
        let result = ShowMatcher::default()
            .resolve(&dest, &show("Dark", None, Some(70523)))
            .await;
        assert!(matches!(result, Err(MigrateError::ServiceUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_non_fatal_lookup_errors_degrade() {
        let dest = FakeDestination::new().failing_lookups(|| MigrateError::UnexpectedStatus {
            service: "serializd",
            status: 400,
            body: String::new(),
        });
        let matched = ShowMatcher::default()
            .resolve(&dest, &show("Dark", None, Some(70523)))
            .await
            .unwrap();
        assert!(!matched.is_matched());
    }
}
