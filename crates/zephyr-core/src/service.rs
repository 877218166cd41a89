//! Request orchestration
//!
//! Runs one request through detection, conversation building, parameter
//! mapping and generation. Every stage returns a `Result`; the first error
//! moves the request to [`PipelineStage::Failed`] and is handed back to the
//! caller unchanged.

use crate::{
    conversation::compose_conversation,
    generation::map_params,
    location::is_location_related,
    request::GenerationRequest,
    worker::{GenerationJob, GenerationWorker},
    CoreError, Result,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// States a request passes through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Received,
    ContextEvaluated,
    ConversationBuilt,
    ParametersMapped,
    Generating,
    Extracted,
    Responded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Failure,
}

/// Final result of a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationOutcome {
    #[serde(rename = "response")]
    pub text: String,
    pub status: OutcomeStatus,
}

impl GenerationOutcome {
    pub fn success(text: impl Into<String>) -> Self {
        Self { text: text.into(), status: OutcomeStatus::Success }
    }
}

/// Stateless request handler in front of the generation worker
#[derive(Clone)]
pub struct RequestService {
    worker: Arc<GenerationWorker>,
}

impl RequestService {
    pub fn new(worker: Arc<GenerationWorker>) -> Self {
        Self { worker }
    }

    pub fn worker(&self) -> &GenerationWorker {
        &self.worker
    }

    /// Handle one request
    pub async fn handle(&self, request: &GenerationRequest) -> Result<GenerationOutcome> {
        self.handle_with_observer(request, |_| {}).await
    }

    /// Handle one request, reporting every stage transition to `observe`
    pub async fn handle_with_observer<F>(
        &self,
        request: &GenerationRequest,
        mut observe: F,
    ) -> Result<GenerationOutcome>
    where
        F: FnMut(PipelineStage) + Send,
    {
        let span = info_span!("ask", request_id = %Uuid::new_v4());

        async move {
            let mut advance = |stage: PipelineStage| {
                debug!(?stage, "pipeline stage");
                observe(stage);
            };

            match self.run(request, &mut advance).await {
                Ok(text) => {
                    advance(PipelineStage::Responded);
                    Ok(GenerationOutcome::success(text))
                }
                Err(err) => {
                    advance(PipelineStage::Failed);
                    if err.is_client_error() {
                        warn!("Request rejected: {}", err);
                    } else {
                        error!("Request failed: {}", err);
                    }
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run<F>(&self, request: &GenerationRequest, advance: &mut F) -> Result<String>
    where
        F: FnMut(PipelineStage) + Send,
    {
        advance(PipelineStage::Received);
        if request.prompt.is_empty() {
            return Err(CoreError::invalid_parameter(
                "prompt",
                format!("{:?}", request.prompt),
                "non-empty text",
            ));
        }

        let location_related = is_location_related(&request.prompt, request.nearby_place());
        advance(PipelineStage::ContextEvaluated);

        let conversation = compose_conversation(request, location_related);
        advance(PipelineStage::ConversationBuilt);

        let params = map_params(request)?;
        advance(PipelineStage::ParametersMapped);

        info!(
            location_related,
            max_new_tokens = params.max_new_tokens,
            "Submitting generation"
        );
        advance(PipelineStage::Generating);
        let reply = self.worker.submit(GenerationJob { conversation, params }).await?;
        advance(PipelineStage::Extracted);

        info!(
            prompt_tokens = reply.prompt_tokens,
            generated_tokens = reply.generated_tokens,
            "Generation complete"
        );
        Ok(reply.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{conversation::Conversation, testing::MockEngine, worker::WorkerConfig};

    fn service_with(engine: Arc<MockEngine>) -> RequestService {
        let worker = GenerationWorker::spawn(engine, &WorkerConfig::default()).unwrap();
        RequestService::new(Arc::new(worker))
    }

    async fn run_observed(
        service: &RequestService,
        request: &GenerationRequest,
    ) -> (Result<GenerationOutcome>, Vec<PipelineStage>) {
        let mut stages = Vec::new();
        let result = service
            .handle_with_observer(request, |stage| stages.push(stage))
            .await;
        (result, stages)
    }

    #[tokio::test]
    async fn test_location_prompt_reaches_generation_with_system_turn() {
        let engine = Arc::new(MockEngine::new(" It's a large urban park. "));
        let service = service_with(engine.clone());
        let request = GenerationRequest::new("What's here?").with_nearby_place("Central Park");

        let (result, stages) = run_observed(&service, &request).await;

        assert_eq!(result.unwrap(), GenerationOutcome::success("It's a large urban park."));
        assert_eq!(
            stages,
            vec![
                PipelineStage::Received,
                PipelineStage::ContextEvaluated,
                PipelineStage::ConversationBuilt,
                PipelineStage::ParametersMapped,
                PipelineStage::Generating,
                PipelineStage::Extracted,
                PipelineStage::Responded,
            ]
        );
        assert_eq!(
            engine.conversations(),
            vec![Conversation::with_system(
                "User is near Central Park. Answer the questions concisely",
                "What's here?"
            )]
        );
    }

    #[tokio::test]
    async fn test_unrelated_prompt_reaches_generation_without_system_turn() {
        let engine = Arc::new(MockEngine::new("4"));
        let service = service_with(engine.clone());
        let request = GenerationRequest::new("What is 2+2?").with_nearby_place("Central Park");

        let (result, stages) = run_observed(&service, &request).await;

        assert_eq!(result.unwrap().text, "4");
        assert!(stages.contains(&PipelineStage::Generating));
        assert_eq!(engine.conversations(), vec![Conversation::user("What is 2+2?")]);
    }

    #[tokio::test]
    async fn test_params_forwarded_to_engine() {
        let engine = Arc::new(MockEngine::new("ok"));
        let service = service_with(engine.clone());
        let request = GenerationRequest {
            max_tokens: 100,
            temperature: 0.5,
            top_p: 0.9,
            top_k: 40,
            ..GenerationRequest::new("hello")
        };

        service.handle(&request).await.unwrap();

        let params = &engine.params()[0];
        assert_eq!(params.max_new_tokens, 100);
        assert_eq!(params.temperature, 0.5);
        assert_eq!(params.top_p, 0.9);
        assert_eq!(params.top_k, 40);
        assert_eq!(params.repetition_penalty, 1.1);
    }

    #[tokio::test]
    async fn test_invalid_parameter_fails_before_engine() {
        let engine = Arc::new(MockEngine::new("never"));
        let service = service_with(engine.clone());

        for request in [
            GenerationRequest { max_tokens: 0, ..GenerationRequest::new("hi") },
            GenerationRequest { top_p: 1.5, ..GenerationRequest::new("hi") },
            GenerationRequest { temperature: 0.0, ..GenerationRequest::new("hi") },
        ] {
            let (result, stages) = run_observed(&service, &request).await;
            assert!(matches!(result, Err(CoreError::InvalidParameter { .. })));
            assert_eq!(stages.last(), Some(&PipelineStage::Failed));
            assert!(!stages.contains(&PipelineStage::Generating));
        }

        assert_eq!(engine.generate_calls(), 0);
        assert!(engine.conversations().is_empty());
    }

    #[tokio::test]
    async fn test_empty_prompt_rejected() {
        let engine = Arc::new(MockEngine::new("never"));
        let service = service_with(engine.clone());

        let (result, stages) = run_observed(&service, &GenerationRequest::new("")).await;

        match result {
            Err(CoreError::InvalidParameter { parameter, .. }) => assert_eq!(parameter, "prompt"),
            other => panic!("unexpected result: {:?}", other),
        }
        assert_eq!(stages, vec![PipelineStage::Received, PipelineStage::Failed]);
        assert_eq!(engine.generate_calls(), 0);
    }

    #[tokio::test]
    async fn test_whitespace_prompt_is_passed_to_engine() {
        let engine = Arc::new(MockEngine::new("Hello"));
        let service = service_with(engine.clone());

        let outcome = service.handle(&GenerationRequest::new(" ")).await.unwrap();

        assert_eq!(outcome.text, "Hello");
        assert_eq!(engine.conversations(), vec![Conversation::user(" ")]);
    }

    #[tokio::test]
    async fn test_engine_failure_surfaces_without_retry() {
        let engine = Arc::new(MockEngine::failing("CUDA out of memory"));
        let service = service_with(engine.clone());

        let (result, stages) = run_observed(&service, &GenerationRequest::new("hi")).await;

        assert!(matches!(result, Err(CoreError::GenerationFailure { .. })));
        assert_eq!(
            &stages[stages.len() - 2..],
            &[PipelineStage::Generating, PipelineStage::Failed]
        );
        assert_eq!(engine.generate_calls(), 1);
    }

    #[test]
    fn test_outcome_wire_format() {
        let value = serde_json::to_value(GenerationOutcome::success("Hello")).unwrap();
        assert_eq!(value, serde_json::json!({ "response": "Hello", "status": "success" }));
    }
}
