use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};

use weave_core::ServiceError;
use weave_llm::LLMProvider;

use crate::aggregate::{aggregate, AggregateResult, AggregationStrategy};
use crate::config::{slugify, JudgeConfig};
use crate::judge::{EvaluationContext, JudgeResult, LLMJudge};

/// Frames emitted by a streaming evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EvaluationEvent {
    JudgeStarted {
        judge_id: String,
        started_at: DateTime<Utc>,
    },
    JudgeCompleted {
        judge_id: String,
        result: JudgeResult,
        duration_ms: u64,
    },
    EvaluationCompleted {
        final_result: AggregateResult,
    },
}

#[derive(Default)]
struct JudgeInner {
    configs: HashMap<String, JudgeConfig>,
    providers: HashMap<String, Arc<dyn LLMProvider>>,
    default_provider: Option<Arc<dyn LLMProvider>>,
}

/// Registry of named judges plus the provider pool they evaluate with.
/// Carries its own lock so evaluations never contend with server state.
#[derive(Default)]
pub struct JudgeServer {
    inner: RwLock<JudgeInner>,
}

impl JudgeServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a judge. Derives the id from the name when absent; the stored
    /// config (with its final id) is returned.
    pub async fn register_judge(
        &self,
        config: Option<JudgeConfig>,
    ) -> Result<JudgeConfig, ServiceError> {
        let mut config =
            config.ok_or_else(|| ServiceError::invalid_argument("judge config is required"))?;
        if config.id.is_empty() {
            config.id = slugify(&config.name);
        }
        let mut inner = self.inner.write().await;
        inner.configs.insert(config.id.clone(), config.clone());
        log::info!("Registered judge '{}' ({})", config.name, config.id);
        Ok(config)
    }

    pub async fn get_judge(&self, judge_id: &str) -> Option<JudgeConfig> {
        let inner = self.inner.read().await;
        inner.configs.get(judge_id).cloned()
    }

    pub async fn list_judges(&self) -> Vec<JudgeConfig> {
        let inner = self.inner.read().await;
        let mut configs: Vec<JudgeConfig> = inner.configs.values().cloned().collect();
        configs.sort_by(|a, b| a.id.cmp(&b.id));
        configs
    }

    pub async fn register_provider(&self, name: impl Into<String>, provider: Arc<dyn LLMProvider>) {
        let mut inner = self.inner.write().await;
        inner.providers.insert(name.into(), provider);
    }

    pub async fn set_default_provider(&self, provider: Arc<dyn LLMProvider>) {
        let mut inner = self.inner.write().await;
        inner.default_provider = Some(provider);
    }

    pub async fn get_provider(&self, name: &str) -> Option<Arc<dyn LLMProvider>> {
        let inner = self.inner.read().await;
        inner.providers.get(name).cloned()
    }

    /// Snapshot the configs and provider for an evaluation run, in request
    /// order. All lookups fail before any judge runs.
    async fn resolve(
        &self,
        judge_ids: &[String],
    ) -> Result<(Vec<JudgeConfig>, Arc<dyn LLMProvider>), ServiceError> {
        if judge_ids.is_empty() {
            return Err(ServiceError::invalid_argument(
                "at least one judge id is required",
            ));
        }
        let inner = self.inner.read().await;
        let provider = inner.default_provider.clone().ok_or_else(|| {
            ServiceError::failed_precondition("no LLM provider configured for judges")
        })?;
        let mut configs = Vec::with_capacity(judge_ids.len());
        for judge_id in judge_ids {
            let config = inner
                .configs
                .get(judge_id)
                .cloned()
                .ok_or_else(|| ServiceError::not_found(format!("judge not found: {}", judge_id)))?;
            configs.push(config);
        }
        Ok((configs, provider))
    }

    pub async fn evaluate_with_judges(
        &self,
        judge_ids: &[String],
        context: &EvaluationContext,
        strategy: AggregationStrategy,
    ) -> Result<AggregateResult, ServiceError> {
        let (configs, provider) = self.resolve(judge_ids).await?;

        let mut results = Vec::with_capacity(configs.len());
        let mut weights = Vec::with_capacity(configs.len());
        for config in configs {
            weights.push(config.weight);
            let judge = LLMJudge::new(config, provider.clone());
            results.push(judge.evaluate(context).await?);
        }
        Ok(aggregate(results, &weights, strategy))
    }

    /// Streaming variant: one started/completed frame per judge, then a
    /// single completion frame. Send failures mean the consumer left; the
    /// evaluation still runs to completion.
    pub async fn evaluate_streaming(
        &self,
        judge_ids: &[String],
        context: &EvaluationContext,
        strategy: AggregationStrategy,
        events: mpsc::Sender<EvaluationEvent>,
    ) -> Result<AggregateResult, ServiceError> {
        let (configs, provider) = self.resolve(judge_ids).await?;

        let mut results = Vec::with_capacity(configs.len());
        let mut weights = Vec::with_capacity(configs.len());
        for config in configs {
            let judge_id = config.id.clone();
            let _ = events
                .send(EvaluationEvent::JudgeStarted {
                    judge_id: judge_id.clone(),
                    started_at: Utc::now(),
                })
                .await;

            let started = Instant::now();
            weights.push(config.weight);
            let judge = LLMJudge::new(config, provider.clone());
            let result = judge.evaluate(context).await?;

            let _ = events
                .send(EvaluationEvent::JudgeCompleted {
                    judge_id,
                    result: result.clone(),
                    duration_ms: started.elapsed().as_millis() as u64,
                })
                .await;
            results.push(result);
        }

        let final_result = aggregate(results, &weights, strategy);
        let _ = events
            .send(EvaluationEvent::EvaluationCompleted {
                final_result: final_result.clone(),
            })
            .await;
        Ok(final_result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_core::RpcCode;
    use weave_llm::ScriptedProvider;

    fn judge_config(name: &str, weight: Option<f64>) -> JudgeConfig {
        JudgeConfig {
            id: String::new(),
            name: name.to_string(),
            criteria: "quality".to_string(),
            weight,
            pass_threshold: None,
        }
    }

    #[tokio::test]
    async fn register_derives_slug_id_and_upserts() {
        let server = JudgeServer::new();
        let stored = server
            .register_judge(Some(judge_config("Accuracy Judge", None)))
            .await
            .expect("register");
        assert_eq!(stored.id, "accuracy-judge");

        let mut second = judge_config("Accuracy Judge", Some(2.0));
        second.id = "accuracy-judge".to_string();
        server.register_judge(Some(second)).await.expect("upsert");
        let fetched = server.get_judge("accuracy-judge").await.expect("get");
        assert_eq!(fetched.weight, Some(2.0));
    }

    #[tokio::test]
    async fn register_rejects_missing_config() {
        let server = JudgeServer::new();
        let err = server.register_judge(None).await.expect_err("nil config");
        assert_eq!(err.code, RpcCode::InvalidArgument);
    }

    #[tokio::test]
    async fn evaluate_requires_judges_and_provider() {
        let server = JudgeServer::new();
        let err = server
            .evaluate_with_judges(&[], &EvaluationContext::default(), Default::default())
            .await
            .expect_err("empty ids");
        assert_eq!(err.code, RpcCode::InvalidArgument);

        server
            .register_judge(Some(judge_config("Accuracy", None)))
            .await
            .expect("register");
        let err = server
            .evaluate_with_judges(
                &["accuracy".to_string()],
                &EvaluationContext::default(),
                Default::default(),
            )
            .await
            .expect_err("no provider");
        assert_eq!(err.code, RpcCode::FailedPrecondition);
    }

    #[tokio::test]
    async fn evaluate_unknown_judge_is_not_found() {
        let server = JudgeServer::new();
        server
            .set_default_provider(Arc::new(ScriptedProvider::new()))
            .await;
        let err = server
            .evaluate_with_judges(
                &["missing".to_string()],
                &EvaluationContext::default(),
                Default::default(),
            )
            .await
            .expect_err("unknown judge");
        assert_eq!(err.code, RpcCode::NotFound);
    }

    #[tokio::test]
    async fn evaluate_aggregates_in_request_order() {
        let server = JudgeServer::new();
        let provider = ScriptedProvider::new();
        provider.push_text(r#"{"overall_score": 90, "verdict": "PASS"}"#);
        provider.push_text(r#"{"overall_score": 70, "verdict": "PASS"}"#);
        server.set_default_provider(Arc::new(provider)).await;

        server
            .register_judge(Some(judge_config("First", None)))
            .await
            .expect("register");
        server
            .register_judge(Some(judge_config("Second", None)))
            .await
            .expect("register");

        let result = server
            .evaluate_with_judges(
                &["first".to_string(), "second".to_string()],
                &EvaluationContext::default(),
                AggregationStrategy::WeightedAverage,
            )
            .await
            .expect("evaluate");

        assert_eq!(result.results.len(), 2);
        assert_eq!(result.results[0].judge_id, "first");
        assert_eq!(result.results[1].judge_id, "second");
        assert_eq!(result.final_score, 80.0);
        assert!(result.passed);
    }

    #[tokio::test]
    async fn provider_pool_lookup_by_name() {
        let server = JudgeServer::new();
        server
            .register_provider("fast", Arc::new(ScriptedProvider::new()))
            .await;
        assert!(server.get_provider("fast").await.is_some());
        assert!(server.get_provider("slow").await.is_none());
    }

    #[tokio::test]
    async fn streaming_emits_frames_in_order() {
        let server = JudgeServer::new();
        let provider = ScriptedProvider::new();
        provider.push_text(r#"{"overall_score": 90, "verdict": "PASS"}"#);
        server.set_default_provider(Arc::new(provider)).await;
        server
            .register_judge(Some(judge_config("Solo", None)))
            .await
            .expect("register");

        let (tx, mut rx) = mpsc::channel(16);
        server
            .evaluate_streaming(
                &["solo".to_string()],
                &EvaluationContext::default(),
                AggregationStrategy::AllMustPass,
                tx,
            )
            .await
            .expect("evaluate");

        let mut frames = Vec::new();
        while let Ok(event) = rx.try_recv() {
            frames.push(event);
        }
        assert_eq!(frames.len(), 3);
        assert!(matches!(frames[0], EvaluationEvent::JudgeStarted { .. }));
        assert!(matches!(frames[1], EvaluationEvent::JudgeCompleted { .. }));
        assert!(matches!(
            frames[2],
            EvaluationEvent::EvaluationCompleted { .. }
        ));
    }
}
