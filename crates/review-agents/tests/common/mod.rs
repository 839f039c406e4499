//! Shared fixtures: a scripted Completion Service and small documents.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use review_agents::{AgentToggles, Orchestrator, PipelineSettings, ReviewConfig};
use review_coordination::{
    CallRole, CompletionError, CompletionRequest, CompletionResponse, CompletionResult,
    CompletionService, Document, ModelRegistry, ReviewEvent, ReviewReport, SubstrateSettings,
};
use serde_json::{json, Value};

#[derive(Clone)]
enum Step {
    Reply(Value),
    Fail(CompletionError),
    Stall(Duration),
}

/// Completion Service answering from a script keyed by role and chunk
/// index. Unscripted calls answer `{}`, which every result type accepts.
#[derive(Default)]
pub struct ScriptedService {
    script: Mutex<HashMap<(CallRole, Option<usize>), Step>>,
    calls: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, role: CallRole, chunk: Option<usize>, step: Step) -> Self {
        self.script.lock().unwrap().insert((role, chunk), step);
        self
    }

    pub fn reply(self, role: CallRole, value: Value) -> Self {
        self.push(role, None, Step::Reply(value))
    }

    pub fn reply_chunk(self, role: CallRole, chunk: usize, value: Value) -> Self {
        self.push(role, Some(chunk), Step::Reply(value))
    }

    pub fn fail(self, role: CallRole) -> Self {
        self.push(role, None, Step::Fail(CompletionError::Fatal("scripted failure".into())))
    }

    pub fn fail_chunk(self, role: CallRole, chunk: usize) -> Self {
        self.push(
            role,
            Some(chunk),
            Step::Fail(CompletionError::Fatal("scripted chunk failure".into())),
        )
    }

    pub fn stall(self, role: CallRole, delay: Duration) -> Self {
        self.push(role, None, Step::Stall(delay))
    }

    pub fn calls(&self, role: CallRole) -> Vec<CompletionRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.role == role)
            .cloned()
            .collect()
    }
}

fn response(output: Value) -> CompletionResponse {
    CompletionResponse {
        output,
        input_tokens: 1_000,
        output_tokens: 200,
    }
}

#[async_trait]
impl CompletionService for ScriptedService {
    async fn complete(&self, request: CompletionRequest) -> CompletionResult<CompletionResponse> {
        self.calls.lock().unwrap().push(request.clone());
        let step = {
            let script = self.script.lock().unwrap();
            script
                .get(&(request.role, request.chunk.map(|c| c.index)))
                .or_else(|| script.get(&(request.role, None)))
                .cloned()
        };
        match step {
            None => Ok(response(json!({}))),
            Some(Step::Reply(value)) => Ok(response(value)),
            Some(Step::Fail(err)) => Err(err),
            Some(Step::Stall(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(response(json!({})))
            }
        }
    }
}

/// Every agent on, no retries.
pub fn settings() -> PipelineSettings {
    PipelineSettings {
        agents: AgentToggles::all_enabled(),
        chunk_words: 400,
        context_sentences: 1,
        max_domain_queries: 6,
        substrate: SubstrateSettings {
            max_retries: 0,
            ..SubstrateSettings::default()
        },
        models: ModelRegistry::default(),
    }
}

/// Text of paragraph `n`: ten distinct words `p{n}w1 .. p{n}w10`.
pub fn paragraph_text(n: usize) -> String {
    (1..=10)
        .map(|w| format!("p{n}w{w}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// `count` ten-word paragraphs `p_1..`, split into two sections.
pub fn document(count: usize) -> Document {
    let paragraphs: Vec<Value> = (1..=count)
        .map(|n| json!({"paragraph_id": format!("p_{n}"), "text": paragraph_text(n)}))
        .collect();
    let half = count.div_ceil(2);
    let ids: Vec<String> = (1..=count).map(|n| format!("p_{n}")).collect();
    Document::from_json(
        &json!({
            "document_id": "doc-1",
            "title": "A small trial",
            "sections": [
                {"section_id": "s1", "title": "Methods", "paragraph_ids": ids[..half].to_vec()},
                {"section_id": "s2", "title": "Results", "paragraph_ids": ids[half..].to_vec()}
            ],
            "paragraphs": paragraphs
        })
        .to_string(),
    )
    .unwrap()
}

/// One draft finding quoting words `from..=to` of paragraph `n`.
pub fn draft(category: &str, n: usize, from: usize, to: usize) -> Value {
    let quote = (from..=to)
        .map(|w| format!("p{n}w{w}"))
        .collect::<Vec<_>>()
        .join(" ");
    json!({
        "category": category,
        "severity": "minor",
        "title": format!("{category} in p_{n}"),
        "description": "Scripted finding.",
        "paragraph_id": format!("p_{n}"),
        "quoted_text": quote
    })
}

pub fn batch(findings: Vec<Value>) -> Value {
    json!({ "findings": findings })
}

pub async fn run_review(
    service: &Arc<ScriptedService>,
    settings: PipelineSettings,
    document: Document,
    config: ReviewConfig,
) -> Vec<ReviewEvent> {
    let orchestrator = Orchestrator::new(service.clone(), settings);
    orchestrator.start(Arc::new(document), config).collect().await
}

pub fn final_report(events: &[ReviewEvent]) -> &ReviewReport {
    match events.last() {
        Some(ReviewEvent::RunCompleted { report, .. }) => report.as_ref(),
        other => panic!("expected RunCompleted last, got {other:?}"),
    }
}
