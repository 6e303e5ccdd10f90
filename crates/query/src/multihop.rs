use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::confidence::{compute_confidence, redecompose_cause, RedecomposeCause};
use crate::config::EngineConfig;
use crate::decompose::Decomposer;
use crate::model::{ConfidenceMetrics, EvidenceBundle, EvidenceNode, RetrievalPath, Route, SubQuestion};
use crate::retriever::HybridChunkRetriever;
use crate::tracer::GraphEvidenceTracer;
use extract::SeedResolver;
use index::name_key;

/// States of the decomposition loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Decompose,
    Discover,
    CheckConfidence,
    Redecompose(RedecomposeCause),
    Synthesize,
}

/// Facts the transition function needs from the running state.
#[derive(Debug, Clone, Copy)]
pub struct LoopSignals {
    pub attempts: usize,
    pub max_attempts: usize,
    pub cause: Option<RedecomposeCause>,
    pub has_pending: bool,
}

/// Pure transition function. `Synthesize` is terminal.
pub fn next_phase(phase: LoopPhase, signals: &LoopSignals) -> LoopPhase {
    match phase {
        LoopPhase::Decompose => LoopPhase::Discover,
        LoopPhase::Discover => LoopPhase::CheckConfidence,
        LoopPhase::CheckConfidence => match signals.cause {
            Some(cause) if signals.attempts < signals.max_attempts => LoopPhase::Redecompose(cause),
            _ => LoopPhase::Synthesize,
        },
        LoopPhase::Redecompose(_) if signals.has_pending => LoopPhase::Discover,
        LoopPhase::Redecompose(_) | LoopPhase::Synthesize => LoopPhase::Synthesize,
    }
}

/// Running state of one multi-hop query. Passes only ever add to it.
#[derive(Debug, Clone, Default)]
pub struct LoopState {
    pub sub_questions: Vec<SubQuestion>,
    /// Index range of the most recent discovery pass in `sub_questions`.
    pub latest_pass: std::ops::Range<usize>,
    pub pending: Vec<String>,
    pub seeds: Vec<String>,
    pub evidence: Vec<EvidenceNode>,
    pub metrics: Option<ConfidenceMetrics>,
    pub cause: Option<RedecomposeCause>,
    pub attempts: usize,
    pub decomposition_failed: bool,
    pub walk_degraded: bool,
}

impl LoopState {
    fn latest(&self) -> &[SubQuestion] {
        &self.sub_questions[self.latest_pass.clone()]
    }

    fn union_seeds(&mut self, questions: &[SubQuestion]) {
        let mut known: HashSet<String> = self.seeds.iter().map(|s| name_key(s)).collect();
        for entity in questions.iter().flat_map(|q| q.resolved_entities.iter()) {
            if known.insert(name_key(entity)) {
                self.seeds.push(entity.clone());
            }
        }
    }

    /// Keeps the best score per entity, best first; ties keep arrival order.
    fn merge_evidence(&mut self, nodes: Vec<EvidenceNode>) {
        let mut position: HashMap<String, usize> = self
            .evidence
            .iter()
            .enumerate()
            .map(|(i, n)| (name_key(&n.entity_name), i))
            .collect();
        for node in nodes {
            let key = name_key(&node.entity_name);
            match position.get(&key) {
                Some(&i) => {
                    if node.score > self.evidence[i].score {
                        self.evidence[i].score = node.score;
                    }
                }
                None => {
                    position.insert(key, self.evidence.len());
                    self.evidence.push(node);
                }
            }
        }
        self.evidence.sort_by(|a, b| b.score.total_cmp(&a.score));
    }

    fn found_digest(&self) -> String {
        self.evidence
            .iter()
            .take(10)
            .map(|n| format!("- {}", n.entity_name))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Decompose, discover in parallel, check confidence, and re-decompose a
/// bounded number of times.
#[derive(Clone)]
pub struct DecompositionLoop {
    decomposer: Decomposer,
    resolver: SeedResolver,
    tracer: GraphEvidenceTracer,
    config: EngineConfig,
}

impl DecompositionLoop {
    pub fn new(
        decomposer: Decomposer,
        resolver: SeedResolver,
        tracer: GraphEvidenceTracer,
        config: EngineConfig,
    ) -> Self {
        Self {
            decomposer,
            resolver,
            tracer,
            config,
        }
    }

    pub async fn run(&self, query: &str) -> LoopState {
        let mut state = LoopState::default();
        let mut phase = LoopPhase::Decompose;

        while phase != LoopPhase::Synthesize {
            match phase {
                LoopPhase::Decompose => {
                    let decomposition = self.decomposer.decompose(query).await;
                    state.decomposition_failed = decomposition.failed;
                    state.pending = decomposition.questions;
                }
                LoopPhase::Discover => self.discover_pass(query, &mut state).await,
                LoopPhase::CheckConfidence => {
                    let weights = &self.config.confidence;
                    let metrics = compute_confidence(state.latest(), weights);
                    state.cause = redecompose_cause(&metrics, state.latest().len(), weights);
                    debug!(
                        score = metrics.score,
                        satisfied_ratio = metrics.satisfied_ratio,
                        entity_diversity = metrics.entity_diversity,
                        cause = ?state.cause,
                        "Checked decomposition confidence"
                    );
                    state.metrics = Some(metrics);
                }
                LoopPhase::Redecompose(cause) => {
                    state.attempts += 1;
                    let previous: Vec<String> =
                        state.sub_questions.iter().map(|q| q.text.clone()).collect();
                    let metrics = state.metrics.clone().unwrap_or_else(|| {
                        compute_confidence(state.latest(), &self.config.confidence)
                    });
                    state.pending = self
                        .decomposer
                        .refine(query, cause, &metrics, &previous, &state.found_digest())
                        .await;
                    info!(
                        attempt = state.attempts,
                        cause = ?cause,
                        new_questions = state.pending.len(),
                        "Re-decomposing query"
                    );
                }
                LoopPhase::Synthesize => {}
            }

            let signals = LoopSignals {
                attempts: state.attempts,
                max_attempts: self.config.max_redecompose_attempts,
                cause: state.cause,
                has_pending: !state.pending.is_empty(),
            };
            phase = next_phase(phase, &signals);
        }

        state
    }

    async fn discover_pass(&self, query: &str, state: &mut LoopState) {
        let offset = state.sub_questions.len();
        let questions: Vec<(usize, String)> = std::mem::take(&mut state.pending)
            .into_iter()
            .enumerate()
            .map(|(i, text)| (offset + i, text))
            .collect();

        let discovered = self.discover(questions).await;
        state.union_seeds(&discovered);
        state.sub_questions.extend(discovered);
        state.latest_pass = offset..state.sub_questions.len();

        // Consolidated trace over every seed found so far.
        let trace = self
            .tracer
            .trace(query, &state.seeds, self.config.consolidated_trace_top_k)
            .await;
        state.walk_degraded |= trace.walk_degraded;
        state.merge_evidence(trace.nodes);
        state.evidence.truncate(self.config.consolidated_trace_top_k);
    }

    /// Seed resolution and tracing for each sub-question, at most
    /// `discovery_concurrency` at a time. Results come back in index order; a
    /// task that dies yields an empty sub-question.
    async fn discover(&self, questions: Vec<(usize, String)>) -> Vec<SubQuestion> {
        let permits = Arc::new(Semaphore::new(self.config.discovery_concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (index, text) in &questions {
            let permits = permits.clone();
            let resolver = self.resolver.clone();
            let tracer = self.tracer.clone();
            let (index, text) = (*index, text.clone());
            let seed_top_k = self.config.seed_top_k;
            let trace_top_k = self.config.sub_question_trace_top_k;

            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let seeds = resolver.disambiguate(&text, seed_top_k).await;
                let trace = tracer.trace(&text, &seeds, trace_top_k).await;
                SubQuestion {
                    text,
                    index,
                    resolved_entities: seeds,
                    evidence_count: trace.nodes.len(),
                }
            });
        }

        let mut finished: HashMap<usize, SubQuestion> = HashMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(question) => {
                    finished.insert(question.index, question);
                }
                Err(e) => warn!(error = %e, "Sub-question discovery task failed"),
            }
        }

        questions
            .into_iter()
            .map(|(index, text)| {
                finished.remove(&index).unwrap_or(SubQuestion {
                    text,
                    index,
                    resolved_entities: Vec::new(),
                    evidence_count: 0,
                })
            })
            .collect()
    }
}

/// Multi-hop route: the decomposition loop, then chunk retrieval over the
/// consolidated evidence.
pub struct MultiHopSearchEngine {
    decomposition: DecompositionLoop,
    retriever: HybridChunkRetriever,
}

impl MultiHopSearchEngine {
    pub fn new(decomposition: DecompositionLoop, retriever: HybridChunkRetriever) -> Self {
        Self {
            decomposition,
            retriever,
        }
    }

    pub async fn search(&self, query: &str) -> EvidenceBundle {
        let state = self.decomposition.run(query).await;
        info!(
            sub_questions = state.sub_questions.len(),
            seeds = state.seeds.len(),
            evidence = state.evidence.len(),
            attempts = state.attempts,
            "Decomposition loop finished"
        );

        let mut bundle = EvidenceBundle::new(Route::MultiHop);
        if state.walk_degraded {
            bundle.record_degraded(RetrievalPath::Walk);
        }
        bundle.seeds = state.seeds;
        bundle.evidence = state.evidence;
        bundle.sub_questions = state.sub_questions;
        bundle.confidence = state.metrics;
        bundle.redecompose_attempts = state.attempts;
        bundle.decomposition_failed = state.decomposition_failed;

        self.retriever.collect(query, &mut bundle, true).await;
        bundle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use extract::GenerativeClient;
    use index::InMemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts concurrent seed-resolution calls.
    #[derive(Default)]
    struct SlowSeeds {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl GenerativeClient for SlowSeeds {
        async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok("[]".to_string())
        }
    }

    #[tokio::test]
    async fn test_discovery_runs_at_most_four_at_once() {
        let llm = Arc::new(SlowSeeds::default());
        let config = EngineConfig::default();
        let decomposition = DecompositionLoop::new(
            Decomposer::new(llm.clone(), config.max_sub_questions),
            SeedResolver::new(llm.clone()),
            GraphEvidenceTracer::new(Arc::new(InMemoryStore::new("tenant")), false),
            config,
        );
        let questions: Vec<(usize, String)> = (0..6)
            .map(|i| (i, format!("Which party signed contract number {}?", i)))
            .collect();

        let discovered = decomposition.discover(questions).await;

        assert_eq!(llm.peak.load(Ordering::SeqCst), 4);
        let indexes: Vec<usize> = discovered.iter().map(|q| q.index).collect();
        assert_eq!(indexes, vec![0, 1, 2, 3, 4, 5]);
    }

    fn signals(attempts: usize, cause: Option<RedecomposeCause>, has_pending: bool) -> LoopSignals {
        LoopSignals {
            attempts,
            max_attempts: 1,
            cause,
            has_pending,
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        let s = signals(0, None, false);
        assert_eq!(next_phase(LoopPhase::Decompose, &s), LoopPhase::Discover);
        assert_eq!(next_phase(LoopPhase::Discover, &s), LoopPhase::CheckConfidence);
        assert_eq!(next_phase(LoopPhase::CheckConfidence, &s), LoopPhase::Synthesize);
        assert_eq!(next_phase(LoopPhase::Synthesize, &s), LoopPhase::Synthesize);
    }

    #[test]
    fn test_redecompose_is_bounded() {
        let cause = Some(RedecomposeCause::SparseEvidence);
        assert_eq!(
            next_phase(LoopPhase::CheckConfidence, &signals(0, cause, false)),
            LoopPhase::Redecompose(RedecomposeCause::SparseEvidence)
        );
        assert_eq!(
            next_phase(LoopPhase::CheckConfidence, &signals(1, cause, false)),
            LoopPhase::Synthesize
        );
    }

    #[test]
    fn test_redecompose_without_new_questions_synthesizes() {
        let phase = LoopPhase::Redecompose(RedecomposeCause::Concentration);
        assert_eq!(next_phase(phase, &signals(1, None, true)), LoopPhase::Discover);
        assert_eq!(next_phase(phase, &signals(1, None, false)), LoopPhase::Synthesize);
    }

    #[test]
    fn test_merge_evidence_keeps_best_score() {
        let mut state = LoopState {
            evidence: vec![EvidenceNode::new("Acme", 0.5), EvidenceNode::new("Beta", 0.4)],
            ..Default::default()
        };
        state.merge_evidence(vec![EvidenceNode::new("ACME", 0.9), EvidenceNode::new("Gamma", 0.1)]);

        assert_eq!(
            state.evidence,
            vec![
                EvidenceNode::new("Acme", 0.9),
                EvidenceNode::new("Beta", 0.4),
                EvidenceNode::new("Gamma", 0.1),
            ]
        );
    }
}
