use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use reqwest::Client;
use tracing::{error, info, warn};

use crate::config::{Credentials, Settings};
use crate::error::Result;
use crate::modules::action::{write_json_atomic, AuditLog};
use crate::modules::brain::decision::{action_consistency, ConsistencyReport};
use crate::modules::brain::{
    AssessmentAgent, AssessmentRecord, ChatModel, DecisionRules, OpenAiChatModel, PromptAssembler,
    RiskAssessment,
};
use crate::modules::evaluation::{build_report, EvaluationReport, FailedRecord, Outcome};
use crate::modules::intake::dataset::statistics;
use crate::modules::intake::{load_labeled, Transaction};
use crate::modules::memory::ingest::IngestStats;
use crate::modules::memory::{
    build_embedder, open_index, ContextRetriever, DocumentStoreBuilder, Embedder, VectorIndex,
};
use crate::utils::{HttpClientFactory, RetryPolicy};

type Store = (Arc<dyn Embedder>, Arc<dyn VectorIndex>);

fn open_store(settings: &Settings, creds: &Credentials, client: Client, retry: RetryPolicy) -> Result<Store> {
    let embedder = build_embedder(&settings.embedding, creds, client, retry)?;
    let index = open_index(&settings.store, creds.qdrant_api_key.clone())?;
    Ok((embedder, index))
}

fn store_builder(settings: &Settings, store: &Store) -> DocumentStoreBuilder {
    DocumentStoreBuilder::new(
        store.0.clone(),
        store.1.clone(),
        settings.ingest.chunk_size,
        settings.ingest.chunk_overlap,
    )
}

async fn ingest_into(settings: &Settings, store: &Store, rebuild: bool) -> Result<IngestStats> {
    let ingest = &settings.ingest;
    let builder = store_builder(settings, store);
    if rebuild {
        builder.rebuild(&ingest.policy_paths, &ingest.cases_path).await
    } else {
        builder.build_index(&ingest.policy_paths, &ingest.cases_path).await
    }
}

/// Ingests the configured corpus without a chat model, so only the
/// embedding provider's credentials are required.
pub async fn ingest_corpus(settings: &Settings, creds: &Credentials, rebuild: bool) -> Result<IngestStats> {
    settings.validate()?;
    creds.require_embedding_key(settings)?;
    let client = HttpClientFactory::create()?;
    let store = open_store(settings, creds, client, RetryPolicy::from_config(&settings.retry))?;
    ingest_into(settings, &store, rebuild).await
}

/// Owns the embedder, index and agent for one process.
pub struct Pipeline {
    settings: Settings,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    agent: AssessmentAgent,
}

impl Pipeline {
    /// Checks settings and credentials, then wires the hosted providers.
    /// Nothing here talks to the network.
    pub fn from_settings(settings: Settings, creds: &Credentials) -> Result<Self> {
        settings.validate()?;
        let chat_key = creds.require_chat_key()?.to_string();
        creds.require_embedding_key(&settings)?;

        let client = HttpClientFactory::create()?;
        let retry = RetryPolicy::from_config(&settings.retry);

        let (embedder, index) = open_store(&settings, creds, client.clone(), retry.clone())?;
        let chat: Arc<dyn ChatModel> = Arc::new(OpenAiChatModel::new(
            client,
            chat_key,
            &settings.chat.base_url,
            retry,
        ));

        Ok(Self::with_components(settings, embedder, index, chat))
    }

    /// Assembles a pipeline around explicit components.
    pub fn with_components(
        settings: Settings,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        chat: Arc<dyn ChatModel>,
    ) -> Self {
        let retriever = ContextRetriever::new(embedder.clone(), index.clone(), settings.retrieval.strategy);
        let agent = AssessmentAgent::new(
            retriever,
            PromptAssembler::new(settings.chat.model.clone()),
            chat,
            DecisionRules::from_config(&settings.decision),
            settings.retrieval.top_k,
        )
        .with_grounding_threshold(settings.decision.grounding_threshold)
        .with_audit(AuditLog::new(settings.paths.reports_dir.clone()));

        Self {
            settings,
            embedder,
            index,
            agent,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    fn store(&self) -> Store {
        (self.embedder.clone(), self.index.clone())
    }

    /// Build-if-absent, judged by the chunks of the active embedding model.
    pub async fn ensure_index(&self) -> Result<()> {
        let ingest = &self.settings.ingest;
        store_builder(&self.settings, &self.store())
            .ensure_built(&ingest.policy_paths, &ingest.cases_path)
            .await
            .map(|_| ())
    }

    pub async fn ingest(&self, rebuild: bool) -> Result<IngestStats> {
        ingest_into(&self.settings, &self.store(), rebuild).await
    }

    pub async fn run(&self, tx: &Transaction) -> Result<RiskAssessment> {
        self.agent.assess(tx).await
    }

    pub async fn run_detailed(&self, tx: &Transaction) -> Result<AssessmentRecord> {
        self.agent.assess_detailed(tx).await
    }

    /// Loads one transaction, assesses it and writes the five-field result.
    /// The output file only appears once the assessment has succeeded.
    pub async fn run_file(&self, input: &Path, output: &Path, rebuild: bool) -> Result<RiskAssessment> {
        let tx = Transaction::load(input)?;
        info!("📥 Loaded transaction {} from {}", tx.id_or_unknown(), input.display());

        if rebuild {
            self.ingest(true).await?;
        } else {
            self.ensure_index().await?;
        }

        let assessment = self.run(&tx).await?;
        write_json_atomic(output, &assessment)?;
        Ok(assessment)
    }

    /// Assesses the same transaction `runs` times and measures how often the action repeats.
    pub async fn check_consistency(&self, tx: &Transaction, runs: usize) -> Result<ConsistencyReport> {
        let mut actions = Vec::with_capacity(runs);
        for _ in 0..runs {
            actions.push(self.run(tx).await?.recommended_action);
        }
        let report = action_consistency(&actions);
        info!(
            "🔁 [{}] action consistency {:.0}% over {} runs",
            tx.id_or_unknown(),
            report.consistency * 100.0,
            runs
        );
        Ok(report)
    }

    /// Runs every labelled record and writes the metrics report.
    /// A failed record is counted and reported; the batch continues.
    /// With `consistency_runs >= 2` the first record is also re-assessed that many times;
    /// if that fails the report is still written, without `action_consistency`.
    pub async fn evaluate(
        &self,
        dataset: &Path,
        report_path: &Path,
        consistency_runs: usize,
    ) -> Result<EvaluationReport> {
        let records = load_labeled(dataset)?;
        let stats = statistics(&records);
        info!("🧪 Evaluating {} labelled transactions from {}", records.len(), dataset.display());
        self.ensure_index().await?;

        let start = Instant::now();
        let mut outcomes = Vec::with_capacity(records.len());
        let mut failures = Vec::new();

        for (i, record) in records.iter().enumerate() {
            let tx_id = record
                .transaction
                .transaction_id
                .clone()
                .unwrap_or_else(|| format!("#{}", i + 1));
            match self.run_detailed(&record.transaction).await {
                Ok(detail) => {
                    if detail.assessment.risk_level != record.ground_truth {
                        warn!(
                            "❗ {}: predicted {} but labelled {}",
                            tx_id, detail.assessment.risk_level, record.ground_truth
                        );
                    }
                    outcomes.push(Outcome {
                        transaction_id: tx_id,
                        truth: record.ground_truth,
                        predicted: detail.assessment.risk_level,
                        action: detail.assessment.recommended_action,
                        rules_agree: detail.decision_review.agrees,
                        groundedness: detail.groundedness,
                    });
                }
                Err(e) => {
                    error!("❌ {}: assessment failed: {}", tx_id, e);
                    failures.push(FailedRecord {
                        transaction_id: tx_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        let mut report = build_report(&outcomes, failures, stats);
        if consistency_runs >= 2 {
            if let Some(first) = records.first() {
                match self.check_consistency(&first.transaction, consistency_runs).await {
                    Ok(consistency) => report.action_consistency = Some(consistency),
                    Err(e) => error!("❌ Action consistency check failed: {}", e),
                }
            }
        }
        info!(
            "📊 Accuracy {:.1}% | High-risk F1 {:.3} | {} failures | {:.1}s",
            report.accuracy * 100.0,
            report.high_risk.f1,
            report.failures.len(),
            start.elapsed().as_secs_f64()
        );
        write_json_atomic(report_path, &report)?;
        Ok(report)
    }
}
