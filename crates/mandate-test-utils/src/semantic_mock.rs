// Path: crates/mandate-test-utils/src/semantic_mock.rs
use async_trait::async_trait;
use mandate_api::capabilities::{SemanticEvaluation, SemanticEvaluator};
use mandate_types::error::Result;
use rand::seq::SliceRandom;
use rand::thread_rng;
use serde_json::{json, Value};

/// A mock `SemanticEvaluator` for tests that exercise the policy engine's
/// semantic-clause path without a real LLM provider. Every call returns the
/// same verdict (configured at construction) but re-renders it with shuffled
/// field order and alternating compact/pretty JSON on each invocation, so a
/// test that (incorrectly) asserts on raw reasoning-string bytes rather than
/// on parsed fields will flake instead of silently locking in an
/// implementation detail of the mock.
#[derive(Debug, Clone)]
pub struct MockSemanticEvaluator {
    compliant: bool,
    confidence: f64,
}

impl MockSemanticEvaluator {
    pub fn new(compliant: bool, confidence: f64) -> Self {
        Self {
            compliant,
            confidence,
        }
    }

    pub fn always_compliant() -> Self {
        Self::new(true, 0.95)
    }

    pub fn always_non_compliant() -> Self {
        Self::new(false, 0.1)
    }

    fn render_reasoning(&self) -> String {
        mock_reasoning_json(self.compliant)
    }
}

#[async_trait]
impl SemanticEvaluator for MockSemanticEvaluator {
    async fn evaluate(
        &self,
        _clauses: &[String],
        _reasoning: Option<&str>,
        _context: &Value,
    ) -> Result<SemanticEvaluation> {
        Ok(SemanticEvaluation {
            compliant: self.compliant,
            confidence: self.confidence,
            reasoning: self.render_reasoning(),
            latency_ms: 12,
            cost: 0.0,
        })
    }
}

/// Renders a structurally identical but byte-for-byte different JSON string
/// on each call, simulating a real LLM's lack of output determinism.
fn mock_reasoning_json(compliant: bool) -> String {
    let mut fields = vec![
        ("compliant", json!(compliant)),
        ("summary", json!("reviewed transaction against the attached clause")),
    ];
    fields.shuffle(&mut thread_rng());
    let fields_map: serde_json::Map<String, Value> =
        fields.into_iter().map(|(k, v)| (k.to_string(), v)).collect();
    let value = Value::Object(fields_map);

    if rand::random() {
        serde_json::to_string_pretty(&value)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization failed: {}"}}"#, e))
    } else {
        serde_json::to_string(&value)
            .unwrap_or_else(|e| format!(r#"{{"error":"serialization failed: {}"}}"#, e))
    }
}
