//! Optional external metrics provider consulted while building task context.

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};

/// Source of run-level metrics exposed to skills under
/// `context.executionState.metrics`.
///
/// The coordinator functions without one; a missing or failing provider
/// yields an empty object.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    async fn metrics(&self, workflow_id: &str) -> Result<JsonValue, String>;
}

/// Provider that always reports nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

#[async_trait]
impl MetricsProvider for NoopMetrics {
    async fn metrics(&self, _workflow_id: &str) -> Result<JsonValue, String> {
        Ok(json!({}))
    }
}

/// Queries `provider`, degrading to `{}` when it is absent or fails.
pub(crate) async fn collect(
    provider: Option<&dyn MetricsProvider>,
    workflow_id: &str,
) -> JsonValue {
    let Some(provider) = provider else {
        return json!({});
    };
    match provider.metrics(workflow_id).await {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(
                workflow_id,
                error = %e,
                "Metrics provider failed; continuing without metrics"
            );
            json!({})
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    #[async_trait]
    impl MetricsProvider for Failing {
        async fn metrics(&self, _workflow_id: &str) -> Result<JsonValue, String> {
            Err("goal service unreachable".to_string())
        }
    }

    struct Fixed;

    #[async_trait]
    impl MetricsProvider for Fixed {
        async fn metrics(&self, workflow_id: &str) -> Result<JsonValue, String> {
            Ok(json!({"workflow": workflow_id, "mrr": 1200}))
        }
    }

    #[tokio::test]
    async fn test_absent_provider_is_empty() {
        assert_eq!(collect(None, "wf").await, json!({}));
    }

    #[tokio::test]
    async fn test_failing_provider_degrades() {
        assert_eq!(collect(Some(&Failing as &dyn MetricsProvider), "wf").await, json!({}));
    }

    #[tokio::test]
    async fn test_provider_values_pass_through() {
        assert_eq!(collect(Some(&Fixed as &dyn MetricsProvider), "wf").await["mrr"], 1200);
        assert_eq!(collect(Some(&NoopMetrics as &dyn MetricsProvider), "wf").await, json!({}));
    }
}
