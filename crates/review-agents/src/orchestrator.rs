//! Review orchestration: the fixed six-agent dependency graph.
//!
//! ```text
//! Briefing ──┬──▶ Clarity ───────────────────────────┐
//!            ├──▶ RigorFind ──┬──▶ RigorRewrite ─────┼──▶ Assembler
//!            │                └──┐                   │
//!            └───────────────────┴──▶ Adversary ─────┘
//! Domain ────────────────────────────▲
//! ```
//!
//! Every stage plus the final assembly is spawned at once and waits only on
//! the latches it needs. A disabled stage opens its latch with an empty
//! value, so dependents cannot tell it apart from a stage that found
//! nothing. Only a briefing failure ends the run early: it seals the feed
//! with a fatal error and abandons the briefing latch, which unwinds every
//! dependent without further output.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use futures::Stream;
use review_coordination::{
    event_feed, latch, AgentCallSubstrate, AgentId, AgentRunMetrics, Assembler, ChunkOutcome,
    CompletionService, Document, EventFeed, EventStream, Finding, Latch, LatchWaiter, ReviewEvent,
    Stage,
};
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::agents::adversary::AdversaryAgent;
use crate::agents::briefing::{Briefing, BriefingAgent};
use crate::agents::clarity::ClarityAgent;
use crate::agents::domain::{DomainPipeline, EvidencePack};
use crate::agents::rigor::{RigorFinder, RigorRewriter};
use crate::agents::{AgentContext, AgentError, AgentOutput, FanOut};
use crate::config::{PipelineSettings, ReviewConfig};

/// Entry point for review runs. One orchestrator serves many runs.
pub struct Orchestrator {
    substrate: AgentCallSubstrate,
    settings: Arc<PipelineSettings>,
    assembler: Arc<Assembler>,
}

impl Orchestrator {
    pub fn new(service: Arc<dyn CompletionService>, settings: PipelineSettings) -> Self {
        let substrate =
            AgentCallSubstrate::new(service, settings.models.clone(), settings.substrate.clone());
        Self {
            substrate,
            settings: Arc::new(settings),
            assembler: Arc::new(Assembler::default()),
        }
    }

    pub fn with_assembler(mut self, assembler: Assembler) -> Self {
        self.assembler = Arc::new(assembler);
        self
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Launch a run. Must be called inside a tokio runtime.
    pub fn start(&self, document: Arc<Document>, config: ReviewConfig) -> ReviewRun {
        let run_id = Uuid::new_v4();
        let (feed, events) = event_feed();
        let ctx = AgentContext::new(self.substrate.clone(), document)
            .with_steering(config.steering_memo.as_deref());

        info!(
            %run_id,
            document = %ctx.document.document_id,
            paragraphs = ctx.document.paragraphs.len(),
            panel = config.panel_mode,
            "Review run starting"
        );

        let state = Arc::new(PipelineState {
            ctx,
            config,
            settings: Arc::clone(&self.settings),
            assembler: Arc::clone(&self.assembler),
            feed,
            findings: Mutex::new(Vec::new()),
            metrics: Mutex::new(Vec::new()),
            started: Instant::now(),
        });

        let (briefing_tx, briefing_rx) = latch::<Briefing>();
        let (evidence_tx, evidence_rx) = latch::<EvidencePack>();
        let (raw_tx, raw_rx) = latch::<Vec<Finding>>();
        let (clarity_tx, clarity_rx) = latch::<()>();
        let (rewrite_tx, rewrite_rx) = latch::<()>();
        let (adversary_tx, adversary_rx) = latch::<()>();

        let mut tasks = JoinSet::new();
        let span = |stage: &str| info_span!("review_stage", %run_id, stage);

        tasks.spawn(run_briefing(state.clone(), briefing_tx).instrument(span("briefing")));
        tasks.spawn(run_domain(state.clone(), evidence_tx).instrument(span("domain")));
        tasks.spawn(
            run_clarity(state.clone(), briefing_rx.clone(), clarity_tx)
                .instrument(span("clarity")),
        );
        tasks.spawn(
            run_rigor_find(state.clone(), briefing_rx.clone(), raw_tx)
                .instrument(span("rigor_find")),
        );
        tasks.spawn(
            run_rigor_rewrite(state.clone(), raw_rx.clone(), rewrite_tx)
                .instrument(span("rigor_rewrite")),
        );
        tasks.spawn(
            run_adversary(state.clone(), briefing_rx, evidence_rx, raw_rx, adversary_tx)
                .instrument(span("adversary")),
        );
        tasks.spawn(
            run_assembly(state, clarity_rx, rewrite_rx, adversary_rx)
                .instrument(span("assembler")),
        );

        ReviewRun {
            run_id,
            events,
            tasks,
            finished: false,
        }
    }
}

// ── Run handle ──────────────────────────────────────────────────────

/// A live review run. Dropping it aborts every outstanding task.
pub struct ReviewRun {
    run_id: Uuid,
    events: EventStream,
    tasks: JoinSet<()>,
    finished: bool,
}

impl ReviewRun {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Next event in feed order, or `None` after the terminal event.
    pub async fn next_event(&mut self) -> Option<ReviewEvent> {
        if self.finished {
            return None;
        }
        match self.events.recv().await {
            Some(event) => {
                if event.is_terminal() {
                    self.shutdown().await;
                }
                Some(event)
            }
            None => {
                error!(run_id = %self.run_id, "Event feed closed without a terminal event");
                self.shutdown().await;
                Some(ReviewEvent::run_error(
                    "Review run stopped without producing a result",
                    false,
                    None,
                ))
            }
        }
    }

    /// Abort every task and wait for each to unwind.
    pub async fn cancel(mut self) {
        if !self.finished {
            info!(run_id = %self.run_id, "Review run cancelled");
        }
        self.shutdown().await;
    }

    /// Drain the run to its terminal event.
    pub async fn collect(mut self) -> Vec<ReviewEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.next_event().await {
            events.push(event);
        }
        events
    }

    pub fn into_stream(self) -> impl Stream<Item = ReviewEvent> {
        futures::stream::unfold(self, |mut run| async move {
            run.next_event().await.map(|event| (event, run))
        })
    }

    async fn shutdown(&mut self) {
        self.finished = true;
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}
    }
}

// ── Shared run state ────────────────────────────────────────────────

struct PipelineState {
    ctx: AgentContext,
    config: ReviewConfig,
    settings: Arc<PipelineSettings>,
    assembler: Arc<Assembler>,
    feed: EventFeed,
    findings: Mutex<Vec<Finding>>,
    metrics: Mutex<Vec<AgentRunMetrics>>,
    started: Instant,
}

impl PipelineState {
    fn enabled(&self, stage: Stage) -> bool {
        let per_run = match stage {
            Stage::Domain => self.config.enable_domain,
            _ => true,
        };
        per_run && self.settings.agents.enabled(stage)
    }

    /// Append to the accumulator, then announce each finding.
    fn record_findings(&self, findings: Vec<Finding>) {
        if findings.is_empty() {
            return;
        }
        self.findings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(findings.iter().cloned());
        for finding in findings {
            self.feed.emit(ReviewEvent::finding_discovered(finding));
        }
    }

    fn record_metrics(&self, metrics: Vec<AgentRunMetrics>) {
        self.metrics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(metrics);
    }

    /// Record an agent's output and close its stage.
    fn record_output(&self, stage: Stage, output: AgentOutput, started: Instant) {
        let cost = output.cost_usd();
        let count = output.findings.len();
        self.record_metrics(output.metrics);
        self.record_findings(output.findings);
        self.stage_completed(stage, count, started, cost);
    }

    fn stage_started(&self, stage: Stage) -> Instant {
        debug!(stage = stage.as_str(), "Stage started");
        let event = match stage {
            Stage::Adversary if self.config.panel_mode => {
                ReviewEvent::stage_started_by(stage, AgentId::AdversaryPanel)
            }
            _ => ReviewEvent::stage_started(stage),
        };
        self.feed.emit(event);
        Instant::now()
    }

    fn stage_completed(&self, stage: Stage, findings: usize, started: Instant, cost_usd: f64) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(stage = stage.as_str(), findings, elapsed_ms, cost_usd, "Stage completed");
        self.feed.emit(ReviewEvent::stage_completed(
            stage, findings, elapsed_ms, cost_usd,
        ));
    }

    fn recoverable(&self, stage: Stage, err: &AgentError) {
        warn!(stage = stage.as_str(), error = %err, "Stage failed, continuing without it");
        self.feed.emit(ReviewEvent::run_error(
            format!("{} failed: {err}", stage.as_str()),
            true,
            Some(stage),
        ));
    }
}

// ── Fan-out draining ────────────────────────────────────────────────

#[derive(Default)]
struct FanOutTally {
    total: usize,
    succeeded: usize,
    findings_count: usize,
    cost_usd: f64,
    /// Findings held back instead of recorded.
    held: Vec<Finding>,
}

/// Forward chunk reports to the feed as they finish. With `record` set,
/// findings enter the accumulator immediately; otherwise they are held.
async fn drain_fan_out(
    state: &PipelineState,
    agent: AgentId,
    mut fan_out: FanOut,
    record: bool,
) -> FanOutTally {
    let mut tally = FanOutTally {
        total: fan_out.total(),
        ..Default::default()
    };

    while let Some(report) = fan_out.next().await {
        match report.result {
            Ok(output) => {
                let count = output.findings.len();
                tally.succeeded += 1;
                tally.findings_count += count;
                tally.cost_usd += output.cost_usd();
                state.feed.emit(ReviewEvent::chunk_completed(
                    agent,
                    report.index,
                    report.total,
                    ChunkOutcome::Succeeded {
                        findings_count: count,
                    },
                ));
                state.record_metrics(output.metrics);
                if record {
                    state.record_findings(output.findings);
                } else {
                    tally.held.extend(output.findings);
                }
            }
            Err(err) => {
                warn!(
                    agent = %agent,
                    chunk = report.index,
                    total = report.total,
                    error = %err,
                    "Chunk failed"
                );
                state.feed.emit(ReviewEvent::chunk_completed(
                    agent,
                    report.index,
                    report.total,
                    ChunkOutcome::Failed {
                        error: err.to_string(),
                    },
                ));
            }
        }
    }
    tally
}

fn close_fan_out(
    state: &PipelineState,
    stage: Stage,
    agent: AgentId,
    tally: &FanOutTally,
    started: Instant,
) {
    if tally.total > 0 && tally.succeeded == 0 {
        state.recoverable(
            stage,
            &AgentError::AllChunksFailed {
                agent,
                total: tally.total,
            },
        );
    } else {
        state.stage_completed(stage, tally.findings_count, started, tally.cost_usd);
    }
}

// ── Stage tasks ─────────────────────────────────────────────────────

async fn run_briefing(state: Arc<PipelineState>, done: Latch<Briefing>) {
    if !state.enabled(Stage::Briefing) {
        done.open(Briefing::default());
        return;
    }
    let started = state.stage_started(Stage::Briefing);
    match BriefingAgent.run(&state.ctx).await {
        Ok((briefing, metrics)) => {
            let cost = metrics.cost_usd;
            state.record_metrics(vec![metrics]);
            state.stage_completed(Stage::Briefing, 0, started, cost);
            done.open(briefing);
        }
        Err(err) => {
            error!(error = %err, "Briefing failed, aborting run");
            state.feed.finish(ReviewEvent::run_error(
                format!("briefing failed: {err}"),
                false,
                Some(Stage::Briefing),
            ));
            // Dropping the unopened latch releases every dependent.
        }
    }
}

async fn run_domain(state: Arc<PipelineState>, done: Latch<EvidencePack>) {
    if !state.enabled(Stage::Domain) {
        done.open(EvidencePack::default());
        return;
    }
    let started = state.stage_started(Stage::Domain);
    let pipeline = DomainPipeline::new(state.settings.max_domain_queries);
    match pipeline.run(&state.ctx).await {
        Ok((pack, metrics)) => {
            let cost = review_coordination::metrics::total_cost(&metrics);
            state.record_metrics(metrics);
            state.stage_completed(Stage::Domain, 0, started, cost);
            done.open(pack);
        }
        Err(err) => {
            state.recoverable(Stage::Domain, &err);
            done.open(EvidencePack::with_gap("Domain research failed"));
        }
    }
}

async fn run_clarity(
    state: Arc<PipelineState>,
    briefing: LatchWaiter<Briefing>,
    done: Latch<()>,
) {
    if !state.enabled(Stage::Clarity) {
        done.open(());
        return;
    }
    let Ok(briefing) = briefing.wait().await else {
        debug!("Briefing abandoned, clarity not started");
        return;
    };
    let started = state.stage_started(Stage::Clarity);
    let agent = ClarityAgent::new(state.settings.chunk_words, state.settings.context_sentences);
    let fan_out = agent.fan_out(&state.ctx, briefing);
    let tally = drain_fan_out(&state, AgentId::Clarity, fan_out, true).await;
    close_fan_out(&state, Stage::Clarity, AgentId::Clarity, &tally, started);
    done.open(());
}

async fn run_rigor_find(
    state: Arc<PipelineState>,
    briefing: LatchWaiter<Briefing>,
    raw: Latch<Vec<Finding>>,
) {
    if !state.enabled(Stage::RigorFind) {
        raw.open(Vec::new());
        return;
    }
    let Ok(briefing) = briefing.wait().await else {
        debug!("Briefing abandoned, rigor not started");
        return;
    };
    let started = state.stage_started(Stage::RigorFind);
    let finder = RigorFinder::new(state.settings.context_sentences);
    let fan_out = finder.fan_out(&state.ctx, briefing);
    let tally = drain_fan_out(&state, AgentId::RigorFind, fan_out, false).await;
    close_fan_out(&state, Stage::RigorFind, AgentId::RigorFind, &tally, started);
    raw.open(tally.held);
}

/// Reports either the rewritten findings or, when rewriting is disabled or
/// fails, the raw rigor findings.
async fn run_rigor_rewrite(
    state: Arc<PipelineState>,
    raw: LatchWaiter<Vec<Finding>>,
    done: Latch<()>,
) {
    let Ok(raw) = raw.wait().await else {
        return;
    };
    if raw.is_empty() {
        done.open(());
        return;
    }
    if !state.enabled(Stage::RigorRewrite) {
        state.record_findings(raw.to_vec());
        done.open(());
        return;
    }

    let started = state.stage_started(Stage::RigorRewrite);
    match RigorRewriter.run(&state.ctx, &raw).await {
        Ok(output) => state.record_output(Stage::RigorRewrite, output, started),
        Err(err) => {
            state.recoverable(Stage::RigorRewrite, &err);
            state.record_findings(raw.to_vec());
        }
    }
    done.open(());
}

async fn run_adversary(
    state: Arc<PipelineState>,
    briefing: LatchWaiter<Briefing>,
    evidence: LatchWaiter<EvidencePack>,
    raw: LatchWaiter<Vec<Finding>>,
    done: Latch<()>,
) {
    if !state.enabled(Stage::Adversary) {
        done.open(());
        return;
    }
    let Ok((briefing, evidence, raw)) =
        tokio::try_join!(briefing.wait(), evidence.wait(), raw.wait())
    else {
        debug!("Upstream abandoned, adversary not started");
        return;
    };

    let started = state.stage_started(Stage::Adversary);
    let agent = AdversaryAgent::new(state.config.panel_mode);
    match agent.run(&state.ctx, &briefing, &evidence, &raw).await {
        Ok(output) => state.record_output(Stage::Adversary, output, started),
        Err(err) => state.recoverable(Stage::Adversary, &err),
    }
    done.open(());
}

async fn run_assembly(
    state: Arc<PipelineState>,
    clarity: LatchWaiter<()>,
    rewrite: LatchWaiter<()>,
    adversary: LatchWaiter<()>,
) {
    if tokio::try_join!(clarity.wait(), rewrite.wait(), adversary.wait()).is_err() {
        debug!("Upstream abandoned, assembly skipped");
        return;
    }

    let started = state.stage_started(Stage::Assembler);
    let findings = std::mem::take(
        &mut *state
            .findings
            .lock()
            .unwrap_or_else(PoisonError::into_inner),
    );
    let metrics = std::mem::take(&mut *state.metrics.lock().unwrap_or_else(PoisonError::into_inner));
    let report = state.assembler.assemble(&state.ctx.document, &findings, &metrics);
    state.stage_completed(Stage::Assembler, report.findings.len(), started, 0.0);

    info!(
        elapsed_ms = state.started.elapsed().as_millis() as u64,
        cost_usd = report.metadata.total_cost_usd,
        findings_in = findings.len(),
        findings_out = report.findings.len(),
        agents = report.metadata.agents_run.len(),
        "Review run completed"
    );
    state.feed.finish(ReviewEvent::run_completed(report));
}
