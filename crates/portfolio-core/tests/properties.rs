use portfolio_core::{
    Action, IndicatorSnapshot, PositionContext, RecommendationScorer, RiskOverride,
    SentimentScore,
};
use proptest::prelude::*;

fn snapshot(rsi: f64, macd_line: f64, macd_signal: f64, sma_short: f64, sma_long: f64) -> IndicatorSnapshot {
    IndicatorSnapshot::new()
        .with_rsi(rsi)
        .with_macd(macd_line, macd_signal)
        .with_sma(sma_short, sma_long)
}

fn position(pnl_pct: f64, cash: f64) -> PositionContext {
    PositionContext::new(10.0, 100.0, 100.0)
        .with_portfolio(50_000.0, cash)
        .with_unrealized_pnl_pct(pnl_pct)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256,
        .. ProptestConfig::default()
    })]

    #[test]
    fn confidence_is_bounded_for_valid_inputs(
        rsi in -50.0f64..200.0,
        macd_line in -5.0f64..5.0,
        macd_signal in -5.0f64..5.0,
        sma_short in 1.0f64..500.0,
        sma_long in 1.0f64..500.0,
        sentiment in -3.0f64..3.0,
        pnl in -90.0f64..300.0,
        cash in 0.0f64..100_000.0,
    ) {
        let scorer = RecommendationScorer::default();
        let rec = scorer
            .score(
                &snapshot(rsi, macd_line, macd_signal, sma_short, sma_long),
                SentimentScore::Scored(sentiment),
                &position(pnl, cash),
            )
            .unwrap();

        prop_assert!(matches!(rec.action, Action::Buy | Action::Sell | Action::Hold));
        prop_assert!((0.0..=100.0).contains(&rec.confidence));
    }

    #[test]
    fn scoring_is_deterministic(
        rsi in 0.0f64..100.0,
        macd_line in -5.0f64..5.0,
        sentiment in -1.0f64..1.0,
        pnl in -50.0f64..50.0,
    ) {
        let scorer = RecommendationScorer::default();
        let snap = snapshot(rsi, macd_line, 0.0, 101.0, 100.0);
        let ctx = position(pnl, 1_000.0);

        let first = scorer.score(&snap, SentimentScore::Scored(sentiment), &ctx).unwrap();
        let second = scorer.score(&snap, SentimentScore::Scored(sentiment), &ctx).unwrap();

        prop_assert_eq!(first.confidence.to_bits(), second.confidence.to_bits());
        prop_assert_eq!(first.total_score.to_bits(), second.total_score.to_bits());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn large_gains_always_sell(
        rsi in 0.0f64..100.0,
        sentiment in -1.0f64..1.0,
        pnl in 20.0f64..500.0,
    ) {
        let rec = RecommendationScorer::default()
            .score(&snapshot(rsi, 1.0, 0.0, 120.0, 100.0), SentimentScore::Scored(sentiment), &position(pnl, 0.0))
            .unwrap();
        prop_assert_eq!(rec.action, Action::Sell);
        prop_assert_eq!(rec.risk_override, Some(RiskOverride::ProfitTaking));
    }

    #[test]
    fn large_losses_always_sell(
        rsi in 0.0f64..100.0,
        sentiment in -1.0f64..1.0,
        pnl in -100.0f64..=-10.0,
    ) {
        let rec = RecommendationScorer::default()
            .score(&snapshot(rsi, 1.0, 0.0, 120.0, 100.0), SentimentScore::Scored(sentiment), &position(pnl, 0.0))
            .unwrap();
        prop_assert_eq!(rec.action, Action::Sell);
        prop_assert_eq!(rec.risk_override, Some(RiskOverride::StopLoss));
    }
}

#[test]
fn profit_taking_example() {
    let rec = RecommendationScorer::default()
        .score(
            &IndicatorSnapshot::new().with_rsi(80.0),
            SentimentScore::Unscored,
            &position(25.0, 0.0),
        )
        .unwrap();
    assert_eq!(rec.action, Action::Sell);
    assert!(rec.reasons.iter().any(|r| r.to_lowercase().contains("profit")));
}

#[test]
fn stop_loss_example() {
    let rec = RecommendationScorer::default()
        .score(
            &IndicatorSnapshot::new().with_rsi(20.0),
            SentimentScore::Unscored,
            &position(-15.0, 0.0),
        )
        .unwrap();
    assert_eq!(rec.action, Action::Sell);
    assert!(rec.reasons.iter().any(|r| r.contains("Stop-loss")));
}

#[test]
fn scorer_is_shareable_across_threads() {
    let scorer = std::sync::Arc::new(RecommendationScorer::default());
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let scorer = std::sync::Arc::clone(&scorer);
            std::thread::spawn(move || {
                scorer
                    .score(
                        &IndicatorSnapshot::new().with_rsi(25.0),
                        SentimentScore::Scored(0.0),
                        &position(f64::from(i), 10_000.0),
                    )
                    .map(|r| r.action)
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap().unwrap(), Action::Buy);
    }
}
