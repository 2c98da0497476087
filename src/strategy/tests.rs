//! Unit tests for strategy module

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::client::mock::{live_event, market, scheduled_event};
    use crate::config::EdgeConfig;
    use crate::types::{MatchConfidence, MatchResult, Orientation};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn calculator() -> EdgeCalculator {
        EdgeCalculator::new(EdgeConfig::default(), Arc::new(FeedImpliedEstimator))
    }

    fn matched(market_id: &str, implied: Decimal, orientation: Orientation) -> MatchResult {
        MatchResult {
            market_id: market_id.to_string(),
            event: Some(live_event("e1", "A", "B", Some(implied))),
            confidence: MatchConfidence::Exact,
            orientation,
        }
    }

    #[test]
    fn test_arbitrage_fires_below_threshold() {
        let m = market("m1", "A", "B", dec!(0.40), dec!(0.55));
        let arb = calculator().check_arbitrage(&m).unwrap();
        assert_eq!(arb.price_sum, dec!(0.95));
        assert_eq!(arb.profit, dec!(0.05));
    }

    #[test]
    fn test_arbitrage_threshold_is_exclusive() {
        let calc = calculator();
        let at = market("m1", "A", "B", dec!(0.485), dec!(0.5));
        assert!(calc.check_arbitrage(&at).is_none());

        let just_below = market("m2", "A", "B", dec!(0.4849), dec!(0.5));
        let arb = calc.check_arbitrage(&just_below).unwrap();
        assert_eq!(arb.profit, Decimal::ONE - dec!(0.9849));
    }

    #[test]
    fn test_arbitrage_profit_over_price_grid() {
        let calc = calculator();
        let mut a = dec!(0.30);
        while a <= dec!(0.60) {
            let m = market("m", "A", "B", a, dec!(0.40));
            let sum = a + dec!(0.40);
            match calc.check_arbitrage(&m) {
                Some(arb) => {
                    assert!(sum < dec!(0.985));
                    assert_eq!(arb.profit, Decimal::ONE - sum);
                }
                None => assert!(sum >= dec!(0.985)),
            }
            a += dec!(0.005);
        }
    }

    #[test]
    fn test_arbitrage_needs_no_match() {
        let m = market("m1", "A", "B", dec!(0.40), dec!(0.55));
        let (opp, _) = calculator().evaluate(&m, None);
        assert_eq!(opp.source, OpportunitySource::Arbitrage);
        assert_eq!(opp.side, OutcomeSide::Both);
        assert_eq!(opp.entry_price, dec!(0.95));
        assert!(opp.edge.is_none());
    }

    #[test]
    fn test_data_edge_on_cheap_side() {
        let m = market("m1", "A", "B", dec!(0.30), dec!(0.70));
        let mr = matched("m1", dec!(0.45), Orientation::Aligned);

        let (opp, miss) = calculator().evaluate(&m, Some(&mr));
        assert_eq!(opp.source, OpportunitySource::DataEdge);
        assert_eq!(opp.edge, Some(dec!(0.15)));
        assert_eq!(opp.side, OutcomeSide::A);
        assert_eq!(opp.entry_price, dec!(0.30));
        assert!(miss.is_none());
    }

    #[test]
    fn test_negative_edge_buys_other_side() {
        let m = market("m1", "A", "B", dec!(0.60), dec!(0.40));
        let mr = matched("m1", dec!(0.50), Orientation::Aligned);

        let (opp, _) = calculator().evaluate(&m, Some(&mr));
        assert_eq!(opp.source, OpportunitySource::DataEdge);
        assert_eq!(opp.edge, Some(dec!(0.10)));
        assert_eq!(opp.side, OutcomeSide::B);
        assert_eq!(opp.entry_price, dec!(0.40));
        assert_eq!(opp.effective_edge(), dec!(0.10));
    }

    #[test]
    fn test_swapped_orientation_flips_probability() {
        let m = market("m1", "A", "B", dec!(0.30), dec!(0.70));
        // feed says participant 1 (market B) wins with 0.55, so A is 0.45
        let mr = matched("m1", dec!(0.55), Orientation::Swapped);
        assert_eq!(calculator().data_edge(&m, Some(&mr)), Some((OutcomeSide::A, dec!(0.15))));
    }

    #[test]
    fn test_overround_book_prices_b_on_its_own() {
        // sum 1.02, no arbitrage; B is only 0.01 cheap against 1 - 0.37
        let m = market("m1", "A", "B", dec!(0.40), dec!(0.62));
        let mr = matched("m1", dec!(0.37), Orientation::Aligned);

        assert_eq!(calculator().data_edge(&m, Some(&mr)), Some((OutcomeSide::B, dec!(0.01))));
        let (opp, miss) = calculator().evaluate(&m, Some(&mr));
        assert_eq!(opp.source, OpportunitySource::None);
        assert_eq!(opp.effective_edge(), Decimal::ZERO);
        assert_eq!(miss.unwrap().edge, dec!(0.01));
    }

    #[test]
    fn test_overround_book_with_no_cheap_side() {
        // both sides priced above the estimate
        let m = market("m1", "A", "B", dec!(0.52), dec!(0.52));
        let mr = matched("m1", dec!(0.50), Orientation::Aligned);

        assert_eq!(calculator().data_edge(&m, Some(&mr)), Some((OutcomeSide::A, dec!(-0.02))));
        let (opp, miss) = calculator().evaluate(&m, Some(&mr));
        assert_eq!(opp.source, OpportunitySource::None);
        assert!(miss.is_none());
    }

    #[test]
    fn test_underround_book_finds_b_edge() {
        // sum 0.99 sits above the arbitrage threshold; A looks fairly priced
        let m = market("m1", "A", "B", dec!(0.50), dec!(0.49));
        let mr = matched("m1", dec!(0.495), Orientation::Aligned);

        let (opp, _) = calculator().evaluate(&m, Some(&mr));
        assert_eq!(opp.source, OpportunitySource::DataEdge);
        assert_eq!(opp.side, OutcomeSide::B);
        assert_eq!(opp.entry_price, dec!(0.49));
        assert_eq!(opp.edge, Some(dec!(0.015)));
        assert_eq!(opp.effective_edge(), dec!(0.015));
    }

    #[test]
    fn test_edge_threshold_inclusive() {
        let m = market("m1", "A", "B", dec!(0.50), dec!(0.50));
        let mr = matched("m1", dec!(0.515), Orientation::Aligned);
        let (opp, _) = calculator().evaluate(&m, Some(&mr));
        assert_eq!(opp.source, OpportunitySource::DataEdge);
    }

    #[test]
    fn test_near_miss_recorded_but_not_fired() {
        let m = market("m1", "A", "B", dec!(0.50), dec!(0.50));
        let mr = matched("m1", dec!(0.51), Orientation::Aligned);

        let (opp, miss) = calculator().evaluate(&m, Some(&mr));
        assert_eq!(opp.source, OpportunitySource::None);
        assert_eq!(opp.edge, Some(dec!(0.01)));
        assert_eq!(miss.unwrap().edge, dec!(0.01));
    }

    #[test]
    fn test_tiny_edge_is_not_near_miss() {
        let m = market("m1", "A", "B", dec!(0.50), dec!(0.50));
        let mr = matched("m1", dec!(0.502), Orientation::Aligned);
        let (opp, miss) = calculator().evaluate(&m, Some(&mr));
        assert_eq!(opp.source, OpportunitySource::None);
        assert!(miss.is_none());
    }

    #[test]
    fn test_event_without_state_has_no_edge() {
        let m = market("m1", "A", "B", dec!(0.30), dec!(0.70));
        let mr = MatchResult {
            market_id: "m1".to_string(),
            event: Some(scheduled_event("e1", "A", "B")),
            confidence: MatchConfidence::Exact,
            orientation: Orientation::Aligned,
        };
        assert!(calculator().data_edge(&m, Some(&mr)).is_none());
        assert!(calculator().data_edge(&m, Some(&MatchResult::unmatched("m1"))).is_none());
    }

    #[test]
    fn test_arbitrage_precedes_data_edge() {
        let m = market("m1", "A", "B", dec!(0.30), dec!(0.60));
        let mr = matched("m1", dec!(0.45), Orientation::Aligned);

        let (opp, _) = calculator().evaluate(&m, Some(&mr));
        assert_eq!(opp.source, OpportunitySource::Arbitrage);
        // the edge is still carried for the audit trail
        assert_eq!(opp.edge, Some(dec!(0.15)));
    }

    #[test]
    fn test_no_estimate_disables_data_edge() {
        let calc = EdgeCalculator::new(EdgeConfig::default(), Arc::new(NoEstimate));
        let m = market("m1", "A", "B", dec!(0.30), dec!(0.70));
        let mr = matched("m1", dec!(0.45), Orientation::Aligned);
        assert!(calc.data_edge(&m, Some(&mr)).is_none());
    }

    #[test]
    fn test_scan_drops_none_sources() {
        let markets = vec![
            market("arb", "A", "B", dec!(0.40), dec!(0.55)),
            market("flat", "C", "D", dec!(0.50), dec!(0.50)),
            market("edge", "E", "F", dec!(0.30), dec!(0.70)),
        ];
        let matches = vec![
            MatchResult::unmatched("arb"),
            MatchResult::unmatched("flat"),
            matched("edge", dec!(0.45), Orientation::Aligned),
        ];

        let scan = calculator().scan(&markets, &matches);
        assert_eq!(scan.opportunities.len(), 2);
        assert_eq!(scan.count(OpportunitySource::Arbitrage), 1);
        assert_eq!(scan.count(OpportunitySource::DataEdge), 1);
        assert!(scan.near_misses.is_empty());
    }
}
