//! Optional free-text enrichment of a ranking. Never required for a result.

use async_trait::async_trait;
use serde::Serialize;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::types::ScoredMarket;

/// How many ranked markets are described to the narrator.
const NARRATIVE_TOP_MARKETS: usize = 5;

/// Structured summary handed to the narrator.
#[derive(Debug, Clone, Serialize)]
pub struct NarrativeContext {
    pub variety: String,
    pub markets: Vec<ScoredMarket>,
}

impl NarrativeContext {
    pub fn new(variety: &str, ranked: &[ScoredMarket]) -> Self {
        Self {
            variety: variety.to_string(),
            markets: ranked.iter().take(NARRATIVE_TOP_MARKETS).cloned().collect(),
        }
    }
}

#[async_trait]
pub trait Narrator: Send + Sync {
    async fn summarize(&self, context: &NarrativeContext) -> Result<String>;
}

/// OpenAI-compatible chat-completions client.
pub struct ChatNarrator {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl ChatNarrator {
    /// None when no API key is configured.
    pub fn from_config(cfg: &Config) -> Result<Option<Self>> {
        let Some(api_key) = cfg.narrative_api_key.clone() else {
            return Ok(None);
        };
        let client = reqwest::Client::builder()
            .timeout(cfg.narrative_timeout)
            .build()?;
        Ok(Some(Self {
            client,
            api_url: cfg.narrative_api_url.clone(),
            api_key,
            model: cfg.narrative_model.clone(),
        }))
    }
}

#[async_trait]
impl Narrator for ChatNarrator {
    async fn summarize(&self, context: &NarrativeContext) -> Result<String> {
        let request_body = serde_json::json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You advise farmers on where to sell produce. Be brief and concrete."
                },
                {
                    "role": "user",
                    "content": build_prompt(context)
                }
            ],
            "max_tokens": 300,
            "temperature": 0.4
        });

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Narrative(format!(
                "narrative service returned {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response.json().await?;
        extract_content(&body)
            .ok_or_else(|| AppError::Narrative("no content in response".to_string()))
    }
}

fn build_prompt(context: &NarrativeContext) -> String {
    let mut prompt = format!(
        "Recommend where to sell {} based on these ranked markets.\n",
        context.variety
    );
    for (rank, m) in context.markets.iter().enumerate() {
        let distance = m
            .distance_km
            .map(|d| format!("{d:.0} km"))
            .unwrap_or_else(|| "unknown distance".to_string());
        prompt.push_str(&format!(
            "{}. {} ({}, {}): best price {:.0} in month {}, lowest {:.0} in month {}, \
             {distance}, transport cost {:.0}, avg arrivals {:.1} t, score {}/5\n",
            rank + 1,
            m.market,
            m.district,
            m.state,
            m.high_price,
            m.high_price_month,
            m.low_price,
            m.low_price_month,
            m.transport_cost,
            m.arrivals_avg,
            m.score,
        ));
    }
    prompt
}

fn extract_content(body: &serde_json::Value) -> Option<String> {
    body.get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
