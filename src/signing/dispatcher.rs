/// Concurrent batch dispatch
///
/// A batch is split round-robin over N workers, each running the pipeline
/// over its own partition on a separate task. All tasks are joined before
/// results are merged, so no worker outlives the batch and the failure
/// cache is only updated afterwards by the caller.
use crate::{
    error::{SignerError, SignerResult},
    portal::Document,
    signing::{run_partition, CertificateBinding, SigningContext, SigningResult},
};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Merged outcome of a batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    pub total: SigningResult,
    /// Signed count per worker, in worker order
    pub per_worker: Vec<usize>,
}

impl BatchResult {
    fn from_partitions(partitions: Vec<SigningResult>) -> Self {
        let mut batch = BatchResult::default();
        for partition in partitions {
            batch.per_worker.push(partition.signed);
            batch.total.merge(partition);
        }
        batch
    }

    /// Per-worker counts rendered as `[n][m]...`
    pub fn summary(&self) -> String {
        self.per_worker.iter().map(|n| format!("[{}]", n)).collect()
    }
}

/// Split `items` into `workers` partitions; item i goes to partition
/// i mod workers. Always returns `workers.max(1)` partitions, some possibly
/// empty.
pub fn partition<T>(items: Vec<T>, workers: usize) -> Vec<Vec<T>> {
    let workers = workers.max(1);
    let mut partitions: Vec<Vec<T>> = (0..workers).map(|_| Vec::new()).collect();
    for (i, item) in items.into_iter().enumerate() {
        partitions[i % workers].push(item);
    }
    partitions
}

/// Sign `docs` with `workers` concurrent workers.
///
/// If any partition ends with `SessionExpired` or `StopRequested`, the
/// first such condition in worker order is returned regardless of how the
/// other partitions ended.
pub async fn dispatch(
    ctx: &SigningContext,
    docs: Vec<Document>,
    bindings: Arc<Vec<CertificateBinding>>,
    workers: usize,
) -> SignerResult<BatchResult> {
    let partitions = partition(docs, workers);
    let worker_count = partitions.len();
    debug!("Dispatching to {} worker(s)", worker_count);

    let mut set = JoinSet::new();
    for (worker, docs) in partitions.into_iter().enumerate() {
        let ctx = ctx.clone();
        let bindings = Arc::clone(&bindings);
        set.spawn(async move { (worker, run_partition(&ctx, worker, docs, &bindings).await) });
    }

    // Completion order is arbitrary; slot outcomes back into worker order
    let mut outcomes: Vec<Option<SignerResult<SigningResult>>> =
        (0..worker_count).map(|_| None).collect();
    let mut aborted: Option<SignerError> = None;

    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((worker, outcome)) => outcomes[worker] = Some(outcome),
            Err(e) => {
                error!("Worker task aborted: {}", e);
                aborted.get_or_insert(SignerError::Internal(format!("Worker aborted: {}", e)));
            }
        }
    }

    let mut escalation: Option<SignerError> = None;
    let mut failure: Option<SignerError> = aborted;
    let mut results = Vec::with_capacity(worker_count);

    for (worker, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Some(Ok(result)) => results.push(result),
            Some(Err(e)) if e.is_escalating() => {
                escalation.get_or_insert(e);
            }
            Some(Err(e)) => {
                error!("[{}] worker failed: {}", worker, e);
                failure.get_or_insert(e);
            }
            None => {}
        }
    }

    if let Some(e) = escalation {
        return Err(e);
    }
    if let Some(e) = failure {
        return Err(e);
    }

    Ok(BatchResult::from_partitions(results))
}
