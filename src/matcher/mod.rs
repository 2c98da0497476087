//! Correlation of exchange markets with live-event feed records
//!
//! Market and feed are named independently, so matching is deliberately
//! permissive: a false positive still has to clear the edge threshold, a
//! false negative silently loses the data-edge path.

pub mod normalize;


pub use normalize::LabelNormalizer;

use crate::config::MatcherConfig;
use crate::types::{LiveEvent, Market, MatchConfidence, MatchResult, Orientation};
use normalize::{fold, labels_overlap};
use std::collections::HashMap;
use tracing::debug;

pub struct EventMatcher {
    normalizer: LabelNormalizer,
}

struct Candidate<'a> {
    event: &'a LiveEvent,
    orientation: Orientation,
    exact: bool,
}

impl EventMatcher {
    pub fn new(config: &MatcherConfig) -> Self {
        Self {
            normalizer: LabelNormalizer::new(&config.strip_tokens),
        }
    }

    /// Pair one market with at most one live event.
    ///
    /// Both orientations are tried since feed ordering need not follow market
    /// ordering. Among several matches a `Live` event wins over `Scheduled`,
    /// which wins over `Finished`; remaining ties keep input order.
    pub fn match_market(&self, market: &Market, live_events: &[LiveEvent]) -> MatchResult {
        let market_a = self.normalizer.normalize(&market.participant_a);
        let market_b = self.normalizer.normalize(&market.participant_b);

        let mut best: Option<Candidate<'_>> = None;
        for event in live_events {
            let Some(candidate) = self.candidate(market, &market_a, &market_b, event) else {
                continue;
            };
            let better = match &best {
                None => true,
                Some(current) => {
                    candidate.event.status.match_priority() > current.event.status.match_priority()
                }
            };
            if better {
                best = Some(candidate);
            }
        }

        match best {
            Some(c) => MatchResult {
                market_id: market.id.clone(),
                event: Some(c.event.clone()),
                confidence: if c.exact {
                    MatchConfidence::Exact
                } else {
                    MatchConfidence::Normalized
                },
                orientation: c.orientation,
            },
            None => MatchResult::unmatched(&market.id),
        }
    }

    /// Match every market of a cycle. A market id listed twice keeps the
    /// event it was first paired with.
    pub fn match_cycle(&self, markets: &[Market], live_events: &[LiveEvent]) -> Vec<MatchResult> {
        let mut claimed: HashMap<&str, MatchResult> = HashMap::new();
        let mut results = Vec::with_capacity(markets.len());

        for market in markets {
            if let Some(previous) = claimed.get(market.id.as_str()) {
                debug!("Market {} listed twice, reusing its match", market.id);
                results.push(previous.clone());
                continue;
            }
            let result = if live_events.is_empty() {
                MatchResult::unmatched(&market.id)
            } else {
                self.match_market(market, live_events)
            };
            if let Some(event) = &result.event {
                debug!(
                    "Matched market {} to event {} ({:?}, {:?})",
                    market.id, event.id, result.confidence, result.orientation
                );
            }
            claimed.insert(market.id.as_str(), result.clone());
            results.push(result);
        }

        results
    }

    fn candidate<'a>(
        &self,
        market: &Market,
        market_a: &str,
        market_b: &str,
        event: &'a LiveEvent,
    ) -> Option<Candidate<'a>> {
        let event_1 = self.normalizer.normalize(&event.participant_1);
        let event_2 = self.normalizer.normalize(&event.participant_2);

        let orientation = if labels_overlap(market_a, &event_1) && labels_overlap(market_b, &event_2) {
            Orientation::Aligned
        } else if labels_overlap(market_a, &event_2) && labels_overlap(market_b, &event_1) {
            Orientation::Swapped
        } else {
            return None;
        };

        let (first, second) = match orientation {
            Orientation::Aligned => (&event.participant_1, &event.participant_2),
            Orientation::Swapped => (&event.participant_2, &event.participant_1),
        };
        let exact = fold(&market.participant_a) == fold(first)
            && fold(&market.participant_b) == fold(second);

        Some(Candidate {
            event,
            orientation,
            exact,
        })
    }
}
