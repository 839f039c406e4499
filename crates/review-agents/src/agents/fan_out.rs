//! Chunk fan-out for agents that split the document.
//!
//! Every chunk runs as its own task. Results flow through a bounded channel
//! sized to the chunk count, so a finished chunk never waits on the
//! consumer, and the consumer sees reports in completion order. Dropping a
//! [`FanOut`] aborts chunks still in flight.

use std::future::Future;

use review_coordination::{CallRole, ChunkDescriptor, ChunkPosition};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::{AgentContext, AgentOutput, AgentResult, FindingBatch};

/// Outcome of one chunk.
#[derive(Debug)]
pub struct ChunkReport {
    pub index: usize,
    pub total: usize,
    pub result: AgentResult<AgentOutput>,
}

pub struct FanOut {
    reports: mpsc::Receiver<ChunkReport>,
    _tasks: JoinSet<()>,
    total: usize,
}

impl FanOut {
    /// Start one task per chunk. `run` builds each chunk's future.
    pub fn spawn<F, Fut>(chunks: Vec<ChunkDescriptor>, run: F) -> Self
    where
        F: Fn(ChunkDescriptor) -> Fut,
        Fut: Future<Output = AgentResult<AgentOutput>> + Send + 'static,
    {
        let total = chunks.len();
        let (tx, reports) = mpsc::channel(total.max(1));
        let mut tasks = JoinSet::new();

        for chunk in chunks {
            let tx = tx.clone();
            let index = chunk.index;
            let work = run(chunk);
            tasks.spawn(async move {
                let result = work.await;
                let _ = tx.send(ChunkReport { index, total, result }).await;
            });
        }

        Self {
            reports,
            _tasks: tasks,
            total,
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Next finished chunk, or `None` once every chunk has reported.
    pub async fn next(&mut self) -> Option<ChunkReport> {
        self.reports.recv().await
    }
}

/// One finding-producing call over a chunk.
pub(crate) async fn review_chunk(
    ctx: AgentContext,
    role: CallRole,
    system: std::sync::Arc<str>,
    user: String,
    chunk: ChunkPosition,
) -> AgentResult<AgentOutput> {
    let (batch, metrics): (FindingBatch, _) =
        ctx.substrate.call(role, &system, &user, Some(chunk)).await?;
    Ok(AgentOutput {
        findings: batch.into_findings(role.agent()),
        metrics: vec![metrics],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentError;
    use review_coordination::CompletionError;
    use std::time::Duration;

    fn chunks(n: usize) -> Vec<ChunkDescriptor> {
        (0..n)
            .map(|index| ChunkDescriptor {
                index,
                total: n,
                paragraph_ids: vec![format!("p{index}")],
                heading: None,
                context_before: vec![],
                context_after: vec![],
                word_count: 1,
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_reports_arrive_in_completion_order() {
        let mut fan_out = FanOut::spawn(chunks(3), |chunk| async move {
            // Chunk 0 is slowest, chunk 2 fastest.
            let delay = 30 - 10 * chunk.index as u64;
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok(AgentOutput::default())
        });

        let mut order = Vec::new();
        while let Some(report) = fan_out.next().await {
            assert_eq!(report.total, 3);
            order.push(report.index);
        }
        assert_eq!(order, vec![2, 1, 0]);
    }

    #[tokio::test]
    async fn test_failed_chunk_does_not_cancel_siblings() {
        let mut fan_out = FanOut::spawn(chunks(3), |chunk| async move {
            if chunk.index == 1 {
                Err(AgentError::Completion(CompletionError::Fatal("boom".into())))
            } else {
                Ok(AgentOutput::default())
            }
        });

        let mut ok = 0;
        let mut failed = Vec::new();
        while let Some(report) = fan_out.next().await {
            match report.result {
                Ok(_) => ok += 1,
                Err(_) => failed.push(report.index),
            }
        }
        assert_eq!(ok, 2);
        assert_eq!(failed, vec![1]);
    }

    #[tokio::test]
    async fn test_no_chunks_finishes_immediately() {
        let mut fan_out = FanOut::spawn(Vec::new(), |_| async { Ok(AgentOutput::default()) });
        assert_eq!(fan_out.total(), 0);
        assert!(fan_out.next().await.is_none());
    }
}
