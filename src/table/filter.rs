use crate::source::types::TradeWithStrategy;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
}

impl Outcome {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "win" | "wins" => Some(Self::Win),
            "loss" | "losses" => Some(Self::Loss),
            _ => None,
        }
    }
}

/// A single pure test on a merged trade. Predicates never look at each
/// other, so any application order yields the same set.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Strategy(String),
    Asset(String),
    /// Sign of realised P&L; a flat trade is neither a win nor a loss.
    Outcome(Outcome),
    /// Inclusive on both ends, against entry time.
    EnteredBetween {
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    },
}

impl Predicate {
    pub fn matches(&self, t: &TradeWithStrategy) -> bool {
        match self {
            Predicate::Strategy(name) => t.strategy == *name,
            Predicate::Asset(asset) => t.trade.asset == *asset,
            Predicate::Outcome(Outcome::Win) => t.trade.pnl() > 0.0,
            Predicate::Outcome(Outcome::Loss) => t.trade.pnl() < 0.0,
            Predicate::EnteredBetween { from, to } => {
                let at = t.trade.entry_time;
                from.map_or(true, |f| at >= f) && to.map_or(true, |e| at <= e)
            }
        }
    }
}

/// AND of all predicates. An empty pipeline passes everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterPipeline {
    predicates: Vec<Predicate>,
}

impl FilterPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn matches(&self, t: &TradeWithStrategy) -> bool {
        self.predicates.iter().all(|p| p.matches(t))
    }

    pub fn apply<R: AsRef<TradeWithStrategy>>(&self, records: impl IntoIterator<Item = R>) -> Vec<R> {
        records.into_iter().filter(|r| self.matches(r.as_ref())).collect()
    }
}

impl AsRef<TradeWithStrategy> for TradeWithStrategy {
    fn as_ref(&self) -> &TradeWithStrategy {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::testing::trade;

    fn tagged(strategy: &str, id: &str, asset: &str, pnl: f64, entry: &str) -> TradeWithStrategy {
        TradeWithStrategy {
            strategy: strategy.into(),
            trade: trade(id, asset, "CLOSED", pnl, entry),
        }
    }

    fn fixture() -> Vec<TradeWithStrategy> {
        vec![
            tagged("A", "1", "BTC", 10.0, "2026-03-01T10:00:00Z"),
            tagged("A", "2", "ETH", -4.0, "2026-03-02T10:00:00Z"),
            tagged("B", "1", "BTC", -1.0, "2026-03-03T10:00:00Z"),
            tagged("A", "3", "BTC", 0.0, "2026-03-04T10:00:00Z"),
            tagged("B", "2", "ETH", 7.0, "2026-03-05T10:00:00Z"),
        ]
    }

    fn ids(rows: &[TradeWithStrategy]) -> Vec<(String, String)> {
        let mut v: Vec<_> = rows
            .iter()
            .map(|t| (t.strategy.clone(), t.trade.id.clone()))
            .collect();
        v.sort();
        v
    }

    #[test]
    fn test_composition_is_order_independent() {
        let strategy = Predicate::Strategy("A".into());
        let asset = Predicate::Asset("BTC".into());

        let ab = FilterPipeline::new().with(strategy.clone()).with(asset.clone()).apply(fixture());
        let ba = FilterPipeline::new().with(asset.clone()).with(strategy.clone()).apply(fixture());
        assert_eq!(ids(&ab), ids(&ba));

        // (A ∧ B) applied in two passes equals one pass
        let staged = FilterPipeline::new()
            .with(asset)
            .apply(FilterPipeline::new().with(strategy).apply(fixture()));
        assert_eq!(ids(&staged), ids(&ab));
        assert_eq!(ids(&ab), vec![("A".into(), "1".into()), ("A".into(), "3".into())]);
    }

    #[test]
    fn test_win_loss_sign() {
        let wins = FilterPipeline::new().with(Predicate::Outcome(Outcome::Win)).apply(fixture());
        assert_eq!(wins.len(), 2);
        let losses = FilterPipeline::new().with(Predicate::Outcome(Outcome::Loss)).apply(fixture());
        assert_eq!(losses.len(), 2);
    }

    #[test]
    fn test_date_range_inclusive() {
        let range = Predicate::EnteredBetween {
            from: Some("2026-03-02T10:00:00Z".parse().unwrap()),
            to: Some("2026-03-04T10:00:00Z".parse().unwrap()),
        };
        let rows = FilterPipeline::new().with(range).apply(fixture());
        assert_eq!(rows.len(), 3);

        let open_ended = Predicate::EnteredBetween {
            from: Some("2026-03-05T10:00:00Z".parse().unwrap()),
            to: None,
        };
        assert_eq!(FilterPipeline::new().with(open_ended).apply(fixture()).len(), 1);
    }

    #[test]
    fn test_no_match_is_empty_not_error() {
        let rows = FilterPipeline::new()
            .with(Predicate::Strategy("A".into()))
            .with(Predicate::Strategy("B".into()))
            .apply(fixture());
        assert!(rows.is_empty());
    }

    #[test]
    fn test_empty_pipeline_passes_all() {
        assert_eq!(FilterPipeline::new().apply(fixture()).len(), 5);
    }
}
