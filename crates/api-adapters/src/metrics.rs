//! Prometheus counters for HTTP traffic and votes.

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry;

use domains::{VoteDirection, VoteTarget};

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct HttpLabels {
    pub method: String,
    pub status: String,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct VoteLabels {
    pub target: String,
    pub direction: String,
}

pub struct Metrics {
    registry: Registry,
    http_requests: Family<HttpLabels, Counter>,
    votes: Family<VoteLabels, Counter>,
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::with_prefix("agora");
        let http_requests = Family::<HttpLabels, Counter>::default();
        registry.register("http_requests", "HTTP requests by method and status", http_requests.clone());
        let votes = Family::<VoteLabels, Counter>::default();
        registry.register("votes", "Accepted votes by target and direction", votes.clone());
        Self { registry, http_requests, votes }
    }

    pub fn record_request(&self, method: &str, status: u16) {
        self.http_requests
            .get_or_create(&HttpLabels { method: method.to_owned(), status: status.to_string() })
            .inc();
    }

    pub fn record_vote(&self, target: &VoteTarget, direction: VoteDirection) {
        self.votes
            .get_or_create(&VoteLabels { target: target.kind().to_owned(), direction: direction.to_string() })
            .inc();
    }

    /// OpenMetrics text exposition.
    pub fn encode(&self) -> Result<String, std::fmt::Error> {
        let mut out = String::new();
        encode(&mut out, &self.registry)?;
        Ok(out)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn counters_show_up_in_the_exposition() {
        let metrics = Metrics::new();
        metrics.record_request("GET", 200);
        metrics.record_request("GET", 200);
        metrics.record_vote(&VoteTarget::Post(Uuid::new_v4()), VoteDirection::Up);

        let text = metrics.encode().unwrap();
        assert!(text.contains(r#"agora_http_requests_total{method="GET",status="200"} 2"#), "{text}");
        assert!(text.contains(r#"agora_votes_total{target="post",direction="up"} 1"#), "{text}");
        assert!(text.ends_with("# EOF\n"));
    }
}
