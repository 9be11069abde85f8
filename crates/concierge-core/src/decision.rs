//! The decision-generation contract.
//!
//! Handlers delegate every judgment call ("which specialist", "reply or
//! ignore", "how stressed is the user") to a decision provider that
//! returns schema-constrained JSON. The contract is deliberately narrow:
//! one request, one structured response. Providers are expected to be
//! idempotent-safe to retry and to perform their own bounded retries on
//! transient failures.

use std::future::Future;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde_json::Value;

use concierge_types::error::DecisionError;

/// One schema-constrained generation request.
#[derive(Debug, Clone)]
pub struct DecisionRequest {
    /// Name of the expected response schema, e.g. "EmailDecision".
    pub schema_name: String,
    /// JSON schema the response must validate against.
    pub schema: Value,
    /// Instructions describing the handler's role and output rules.
    pub system_prompt: String,
    /// The conversation context the decision is about.
    pub input: String,
}

impl DecisionRequest {
    pub fn new(
        schema_name: impl Into<String>,
        schema: Value,
        system_prompt: impl Into<String>,
        input: impl Into<String>,
    ) -> Self {
        Self {
            schema_name: schema_name.into(),
            schema,
            system_prompt: system_prompt.into(),
            input: input.into(),
        }
    }
}

/// Trait for decision-generation backends.
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition). The
/// production implementation wraps an OpenAI-compatible chat API; tests
/// use scripted providers.
pub trait DecisionProvider: Send + Sync {
    /// Provider name for logs, e.g. "openai".
    fn name(&self) -> &str;

    /// Generate one structured decision.
    fn generate(
        &self,
        request: &DecisionRequest,
    ) -> impl Future<Output = Result<Value, DecisionError>> + Send;
}

/// Object-safe version of [`DecisionProvider`] with boxed futures.
pub trait DecisionProviderDyn: Send + Sync {
    fn name(&self) -> &str;

    fn generate_boxed<'a>(
        &'a self,
        request: &'a DecisionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Value, DecisionError>> + Send + 'a>>;
}

/// Blanket implementation: any `DecisionProvider` automatically implements
/// `DecisionProviderDyn`.
impl<T: DecisionProvider> DecisionProviderDyn for T {
    fn name(&self) -> &str {
        DecisionProvider::name(self)
    }

    fn generate_boxed<'a>(
        &'a self,
        request: &'a DecisionRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Value, DecisionError>> + Send + 'a>> {
        Box::pin(self.generate(request))
    }
}

/// Type-erased decision provider shared by all handlers.
pub struct BoxDecisionProvider {
    inner: Box<dyn DecisionProviderDyn + Send + Sync>,
}

impl BoxDecisionProvider {
    pub fn new<T: DecisionProvider + 'static>(provider: T) -> Self {
        Self {
            inner: Box::new(provider),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub async fn generate(&self, request: &DecisionRequest) -> Result<Value, DecisionError> {
        self.inner.generate_boxed(request).await
    }

    /// Generate and deserialize into the expected decision type.
    pub async fn generate_as<T: DeserializeOwned>(
        &self,
        request: &DecisionRequest,
    ) -> Result<T, DecisionError> {
        let value = self.generate(request).await?;
        serde_json::from_value(value).map_err(|err| DecisionError::SchemaMismatch {
            schema: request.schema_name.clone(),
            message: err.to_string(),
        })
    }
}

impl std::fmt::Debug for BoxDecisionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxDecisionProvider")
            .field("name", &self.inner.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    struct Canned(Value);

    impl DecisionProvider for Canned {
        fn name(&self) -> &str {
            "canned"
        }

        async fn generate(&self, _request: &DecisionRequest) -> Result<Value, DecisionError> {
            Ok(self.0.clone())
        }
    }

    #[derive(Debug, Deserialize)]
    struct Verdict {
        approve: bool,
    }

    fn request() -> DecisionRequest {
        DecisionRequest::new("Verdict", json!({"type": "object"}), "decide", "input")
    }

    #[tokio::test]
    async fn test_generate_as_deserializes() {
        let provider = BoxDecisionProvider::new(Canned(json!({"approve": true})));
        let verdict: Verdict = provider.generate_as(&request()).await.unwrap();
        assert!(verdict.approve);
    }

    #[tokio::test]
    async fn test_generate_as_reports_schema_mismatch() {
        let provider = BoxDecisionProvider::new(Canned(json!({"approve": "maybe"})));
        let err = provider.generate_as::<Verdict>(&request()).await.unwrap_err();
        match err {
            DecisionError::SchemaMismatch { schema, .. } => assert_eq!(schema, "Verdict"),
            other => panic!("expected schema mismatch, got {other:?}"),
        }
    }
}
