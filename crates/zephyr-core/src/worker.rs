//! Single-slot generation worker
//!
//! The engine is a non-reentrant resource. The worker owns it on a dedicated
//! OS thread and runs one job at a time, in the order jobs were queued. The
//! queue is bounded, so callers wait for a free slot once it fills up.

use crate::{
    conversation::Conversation,
    engine::{EngineHandle, TextGenerationEngine},
    extract::extract_response,
    generation::GenerationParams,
    CoreError, Result,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    any::Any,
    panic::{catch_unwind, AssertUnwindSafe},
    thread::JoinHandle,
    time::Instant,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn, Span};

/// Worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Maximum number of jobs waiting behind the running one
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { queue_capacity: 32 }
    }
}

/// Work handed to the engine for one request
#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub conversation: Conversation,
    pub params: GenerationParams,
}

/// Result of a completed job
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationReply {
    /// Extracted, trimmed response text
    pub text: String,
    pub prompt_tokens: usize,
    pub generated_tokens: usize,
}

struct Envelope {
    job: GenerationJob,
    reply: oneshot::Sender<Result<GenerationReply>>,
    span: Span,
}

/// A queued job whose reply has not arrived yet
pub struct PendingGeneration {
    receiver: oneshot::Receiver<Result<GenerationReply>>,
}

impl PendingGeneration {
    /// Wait for the worker to finish the job
    pub async fn wait(self) -> Result<GenerationReply> {
        self.receiver.await.unwrap_or_else(|_| {
            Err(CoreError::engine_unavailable(
                "Generation worker stopped before replying",
                "Check the server logs for an engine failure and restart the server",
            ))
        })
    }
}

/// Bounded single-worker execution context around an engine
pub struct GenerationWorker {
    sender: Mutex<Option<mpsc::Sender<Envelope>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
    model_name: String,
    queue_capacity: usize,
}

impl GenerationWorker {
    /// Start the worker thread. The engine must already be loaded.
    pub fn spawn(engine: EngineHandle, config: &WorkerConfig) -> Result<Self> {
        if config.queue_capacity == 0 {
            return Err(CoreError::invalid_parameter(
                "queue_capacity",
                "0",
                "integer > 0",
            ));
        }

        let model_name = engine.model_name().to_string();
        let (sender, receiver) = mpsc::channel(config.queue_capacity);

        let thread = std::thread::Builder::new()
            .name("zephyr-generation".to_string())
            .spawn(move || run_worker(engine, receiver))
            .map_err(|e| {
                CoreError::engine_load(
                    "Failed to start generation worker thread",
                    "Check process thread limits",
                    e.into(),
                )
            })?;

        info!(
            "Generation worker ready (model: {}, queue capacity: {})",
            model_name, config.queue_capacity
        );

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            thread: Mutex::new(Some(thread)),
            model_name,
            queue_capacity: config.queue_capacity,
        })
    }

    /// Queue a job, waiting for a free slot if the queue is full.
    ///
    /// Jobs run in the order this call completes.
    pub async fn enqueue(&self, job: GenerationJob) -> Result<PendingGeneration> {
        let sender = self.sender.lock().clone().ok_or_else(stopped)?;
        let (reply, receiver) = oneshot::channel();
        let envelope = Envelope { job, reply, span: Span::current() };

        sender.send(envelope).await.map_err(|_| stopped())?;
        Ok(PendingGeneration { receiver })
    }

    /// Queue a job and wait for its reply
    pub async fn submit(&self, job: GenerationJob) -> Result<GenerationReply> {
        self.enqueue(job).await?.wait().await
    }

    /// Whether new jobs are accepted
    pub fn is_accepting(&self) -> bool {
        self.sender
            .lock()
            .as_ref()
            .map_or(false, |sender| !sender.is_closed())
    }

    /// Number of jobs waiting in the queue
    pub fn queued(&self) -> usize {
        self.sender
            .lock()
            .as_ref()
            .map_or(0, |sender| sender.max_capacity() - sender.capacity())
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Stop accepting jobs, let queued jobs finish and join the worker thread
    pub async fn shutdown(&self) {
        self.sender.lock().take();
        let thread = self.thread.lock().take();
        if let Some(thread) = thread {
            info!("Waiting for generation worker to drain");
            match tokio::task::spawn_blocking(move || thread.join()).await {
                Ok(Ok(())) => info!("Generation worker stopped"),
                _ => warn!("Generation worker did not stop cleanly"),
            }
        }
    }
}

fn stopped() -> CoreError {
    CoreError::engine_unavailable(
        "Generation worker is not accepting jobs",
        "The server is shutting down or the engine failed; restart the server",
    )
}

fn run_worker(engine: EngineHandle, mut receiver: mpsc::Receiver<Envelope>) {
    while let Some(envelope) = receiver.blocking_recv() {
        let _entered = envelope.span.enter();
        let start = Instant::now();

        let result = catch_unwind(AssertUnwindSafe(|| run_job(engine.as_ref(), &envelope.job)))
            .unwrap_or_else(|payload| {
                let message = panic_message(payload.as_ref());
                error!("Engine panicked: {}", message);
                Err(CoreError::generation("ENGINE_PANIC", message, "Running generation job"))
            });

        debug!("Generation job finished in {:.2}s", start.elapsed().as_secs_f64());
        if envelope.reply.send(result).is_err() {
            debug!("Caller went away before the generation finished");
        }
    }
    debug!("Generation queue closed");
}

fn run_job(engine: &dyn TextGenerationEngine, job: &GenerationJob) -> Result<GenerationReply> {
    let prompt = engine.apply_chat_template(&job.conversation)?;
    let tokens = engine.tokenize(&prompt)?;
    debug!("Templated prompt is {} tokens", tokens.len());

    let output = engine.generate(&tokens, &job.params)?;
    let text = extract_response(engine, &output, tokens.len())?;

    Ok(GenerationReply {
        text,
        prompt_tokens: tokens.len(),
        generated_tokens: output.sequence.len().saturating_sub(tokens.len()),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{generation::map_params, request::GenerationRequest, testing::MockEngine};
    use std::{sync::Arc, time::Duration};

    fn job(prompt: &str) -> GenerationJob {
        GenerationJob {
            conversation: Conversation::user(prompt),
            params: map_params(&GenerationRequest::new(prompt)).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_submit_runs_full_engine_pipeline() {
        let engine = Arc::new(MockEngine::new("  Four.  "));
        let worker = GenerationWorker::spawn(engine.clone(), &WorkerConfig::default()).unwrap();

        let reply = worker.submit(job("What is 2+2?")).await.unwrap();

        assert_eq!(reply.text, "Four.");
        assert_eq!(reply.prompt_tokens, "<|user|>\nWhat is 2+2?</s>\n<|assistant|>\n".len());
        assert_eq!(reply.generated_tokens, "  Four.  ".len() + 1);
        assert_eq!(engine.conversations(), vec![Conversation::user("What is 2+2?")]);
        worker.shutdown().await;
    }

    #[tokio::test]
    async fn test_jobs_run_one_at_a_time_in_queue_order() {
        let engine = Arc::new(MockEngine::new("ok").with_delay(Duration::from_millis(20)));
        let worker = GenerationWorker::spawn(engine.clone(), &WorkerConfig::default()).unwrap();

        let mut pending = Vec::new();
        for i in 0..5 {
            pending.push(worker.enqueue(job(&format!("question {}", i))).await.unwrap());
        }
        for p in pending {
            assert_eq!(p.wait().await.unwrap().text, "ok");
        }

        let prompts = engine.prompts();
        for (i, prompt) in prompts.iter().enumerate() {
            assert!(prompt.contains(&format!("question {}", i)));
        }
        assert_eq!(prompts.len(), 5);
        assert_eq!(engine.max_concurrent_generations(), 1);
        worker.shutdown().await;
    }

    #[tokio::test]
    async fn test_concurrent_callers_are_serialized() {
        let engine = Arc::new(MockEngine::new("ok").with_delay(Duration::from_millis(10)));
        let worker = Arc::new(
            GenerationWorker::spawn(engine.clone(), &WorkerConfig { queue_capacity: 2 }).unwrap(),
        );

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let worker = Arc::clone(&worker);
                tokio::spawn(async move { worker.submit(job(&format!("q{}", i))).await })
            })
            .collect();

        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }
        assert_eq!(engine.generate_calls(), 8);
        assert_eq!(engine.max_concurrent_generations(), 1);
    }

    #[tokio::test]
    async fn test_engine_panic_is_generation_failure_and_worker_survives() {
        let worker =
            GenerationWorker::spawn(Arc::new(MockEngine::panicking()), &WorkerConfig::default())
                .unwrap();

        let first = worker.submit(job("boom")).await.unwrap_err();
        assert_eq!(first.code(), "ENGINE_PANIC");

        let second = worker.submit(job("boom again")).await.unwrap_err();
        assert_eq!(second.code(), "ENGINE_PANIC");
        assert!(worker.is_accepting());
    }

    #[tokio::test]
    async fn test_engine_error_is_passed_through() {
        let worker = GenerationWorker::spawn(
            Arc::new(MockEngine::failing("out of memory")),
            &WorkerConfig::default(),
        )
        .unwrap();

        match worker.submit(job("hi")).await {
            Err(CoreError::GenerationFailure { message, .. }) => assert_eq!(message, "out of memory"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_jobs() {
        let worker =
            GenerationWorker::spawn(Arc::new(MockEngine::new("ok")), &WorkerConfig::default())
                .unwrap();
        assert!(worker.is_accepting());

        worker.shutdown().await;

        assert!(!worker.is_accepting());
        let err = worker.submit(job("hi")).await.unwrap_err();
        assert_eq!(err.code(), "ENGINE_UNAVAILABLE");
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = GenerationWorker::spawn(
            Arc::new(MockEngine::new("ok")),
            &WorkerConfig { queue_capacity: 0 },
        );
        assert!(result.is_err());
    }
}
