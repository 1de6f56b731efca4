//! Request counters exposed in OpenMetrics text format at `/metrics`.

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

use domains::DomainError;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct OutcomeLabels {
    pub outcome: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct ReviewWriteLabels {
    pub operation: String,
    pub outcome: String,
}

pub struct Metrics {
    registry: Registry,
    searches: Family<OutcomeLabels, Counter>,
    review_writes: Family<ReviewWriteLabels, Counter>,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("campsite");
        let searches = Family::<OutcomeLabels, Counter>::default();
        let review_writes = Family::<ReviewWriteLabels, Counter>::default();
        registry.register(
            "searches",
            "Site searches by outcome",
            searches.clone(),
        );
        registry.register(
            "review_writes",
            "Review submissions, edits, deletions and flags by outcome",
            review_writes.clone(),
        );
        Self {
            registry,
            searches,
            review_writes,
        }
    }

    pub fn record_search<T>(&self, result: &Result<T, DomainError>) {
        self.searches
            .get_or_create(&OutcomeLabels {
                outcome: outcome(result).to_string(),
            })
            .inc();
    }

    pub fn record_review_write<T>(&self, operation: &str, result: &Result<T, DomainError>) {
        self.review_writes
            .get_or_create(&ReviewWriteLabels {
                operation: operation.to_string(),
                outcome: outcome(result).to_string(),
            })
            .inc();
    }

    pub fn render(&self) -> Result<String, std::fmt::Error> {
        let mut body = String::new();
        encode(&mut body, &self.registry)?;
        Ok(body)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

fn outcome<T>(result: &Result<T, DomainError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(e) => e.code(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_render_with_outcome_labels() {
        let metrics = Metrics::new();
        metrics.record_search::<()>(&Ok(()));
        metrics.record_search::<()>(&Err(DomainError::InvalidRadius(-1.0)));
        metrics.record_review_write::<()>("submit", &Err(DomainError::RateLimited));

        let body = metrics.render().unwrap();
        assert!(body.contains("campsite_searches_total{outcome=\"ok\"} 1"));
        assert!(body.contains("campsite_searches_total{outcome=\"invalid_radius\"} 1"));
        assert!(body.contains(
            "campsite_review_writes_total{operation=\"submit\",outcome=\"rate_limited\"} 1"
        ));
    }
}
