//! Chat-completions curator client.
//!
//! Sends the turn to an OpenAI-compatible `/chat/completions` endpoint with a
//! JSON-object response format and parses the reply into a
//! [`CurationDecision`]. Invalid observations are skipped; scores are clamped
//! into [0, 1]. Transport and parse failures surface as `Upstream` errors and
//! the pipeline degrades to the fallback decision.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use crate::config::CuratorConfig;
use crate::curator::{CurationDecision, CurationTurn, Curator, Observation, StorageType};
use crate::error::{EngramError, EngramResult};

pub struct OpenAiCurator {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

impl OpenAiCurator {
    pub fn new(config: &CuratorConfig) -> anyhow::Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("curator API key not configured"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
        })
    }

    fn build_prompt(turn: &CurationTurn) -> String {
        let mut prefs_context = String::new();
        if let Some(prefs) = &turn.curation_preferences {
            if !prefs.priority_topics.is_empty() {
                prefs_context.push_str(&format!(
                    "Priority topics: {}\n",
                    prefs.priority_topics.join(", ")
                ));
            }
            if let Some(bias) = &prefs.retention_bias {
                prefs_context.push_str(&format!("Retention bias: {bias}\n"));
            }
            if let Some(personality) = &prefs.agent_personality {
                prefs_context.push_str(&format!("Agent personality: {personality}\n"));
            }
        }

        format!(
            r#"You are a memory curation specialist. Analyze this conversation turn and
observe EVERYTHING worth remembering, no matter how small. Do not filter —
observe and score each piece of information.

{prefs_context}
Conversation turn:
User: {user}
Assistant: {agent}

Context: {context}

For each observation record:
- memory_type: facts | preferences | context | temporary | skills | relationships
- content: the specific information observed
- confidence_score (0-1): how sure you are the information is correct
- ephemerality_score (0-1): how quickly it becomes outdated (0 = permanent, 1 = expires immediately)
- contextual_value (0-1): usefulness for future conversations
- tags: 3-5 keywords
- rationale: why this was noted

Respond with valid JSON only:
{{
  "observations": [ {{ "memory_type": "...", "content": "...",
    "confidence_score": 0.9, "ephemerality_score": 0.1,
    "contextual_value": 0.8, "tags": [], "rationale": "..." }} ],
  "should_store": true,
  "overall_reasoning": "..."
}}"#,
            user = turn.user_input,
            agent = turn.agent_response,
            context = turn
                .conversation_context
                .as_deref()
                .unwrap_or("No additional context"),
        )
    }

    fn parse_reply(reply: &serde_json::Value) -> EngramResult<CurationDecision> {
        let raw_observations = reply
            .get("observations")
            .and_then(|v| v.as_array())
            .ok_or_else(|| EngramError::Upstream("curator reply missing observations".into()))?;

        let mut observations = Vec::new();
        for raw in raw_observations {
            match Self::parse_observation(raw) {
                Ok(obs) => observations.push(obs),
                Err(e) => tracing::warn!(error = %e, "skipping invalid curator observation"),
            }
        }

        Ok(CurationDecision {
            should_store: reply
                .get("should_store")
                .and_then(|v| v.as_bool())
                .unwrap_or_else(|| observations.iter().any(Observation::should_store)),
            overall_reasoning: reply
                .get("overall_reasoning")
                .and_then(|v| v.as_str())
                .unwrap_or("observation analysis")
                .to_string(),
            observations,
            requires_review: false,
        })
    }

    fn parse_observation(raw: &serde_json::Value) -> EngramResult<Observation> {
        let memory_type: StorageType = serde_json::from_value(
            raw.get("memory_type")
                .cloned()
                .unwrap_or(json!("context")),
        )
        .map_err(|e| EngramError::Upstream(format!("bad memory_type: {e}")))?;

        let content = raw
            .get("content")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| EngramError::Upstream("observation missing content".into()))?;

        let score = |key: &str, default: f64| {
            raw.get(key)
                .and_then(|v| v.as_f64())
                .unwrap_or(default)
                .clamp(0.0, 1.0)
        };

        Ok(Observation {
            memory_type,
            content: content.to_string(),
            confidence_score: score("confidence_score", 0.5),
            ephemerality_score: score("ephemerality_score", 0.5),
            contextual_value: score("contextual_value", 0.5),
            privacy_level: raw
                .get("privacy_level")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            tags: raw
                .get("tags")
                .and_then(|v| serde_json::from_value(v.clone()).ok())
                .unwrap_or_default(),
            rationale: raw
                .get("rationale")
                .or_else(|| raw.get("reasoning"))
                .and_then(|v| v.as_str())
                .unwrap_or("observed information")
                .to_string(),
        })
    }
}

#[async_trait]
impl Curator for OpenAiCurator {
    async fn analyze(&self, turn: &CurationTurn) -> EngramResult<CurationDecision> {
        let body = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a memory curation specialist. Always respond with valid JSON only, no additional text."
                },
                { "role": "user", "content": Self::build_prompt(turn) }
            ],
            "temperature": 0.1,
            "max_tokens": 1000,
            "response_format": { "type": "json_object" }
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EngramError::Upstream(format!(
                "curator endpoint returned {}",
                response.status()
            )));
        }

        let reply: serde_json::Value = response.json().await?;
        let content = reply["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| EngramError::Upstream("curator reply missing content".into()))?;

        let parsed: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| EngramError::Upstream(format!("curator reply is not JSON: {e}")))?;

        Self::parse_reply(&parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reply_clamps_and_skips_invalid() {
        let reply = json!({
            "observations": [
                {
                    "memory_type": "facts",
                    "content": "Christian lives in Liversedge",
                    "confidence_score": 1.7,
                    "ephemerality_score": -0.2,
                    "contextual_value": 0.9,
                    "tags": ["location"],
                    "reasoning": "stated clearly"
                },
                { "memory_type": "facts" },
                {
                    "memory_type": "temporary",
                    "content": "It's raining",
                    "confidence_score": 1.0,
                    "ephemerality_score": 0.95,
                    "contextual_value": 0.1
                }
            ],
            "should_store": true,
            "overall_reasoning": "two observations"
        });

        let decision = OpenAiCurator::parse_reply(&reply).unwrap();
        assert_eq!(decision.observations.len(), 2);
        assert_eq!(decision.observations[0].confidence_score, 1.0);
        assert_eq!(decision.observations[0].ephemerality_score, 0.0);
        assert_eq!(decision.observations[0].rationale, "stated clearly");
        assert!(decision.should_store);
        assert!(!decision.requires_review);
    }

    #[test]
    fn parse_reply_without_observations_errors() {
        let reply = json!({ "should_store": false });
        assert!(OpenAiCurator::parse_reply(&reply).is_err());
    }

    #[test]
    fn prompt_includes_turn_and_preferences() {
        let turn = CurationTurn {
            user_input: "My name is Christian".to_string(),
            agent_response: "Nice to meet you".to_string(),
            conversation_context: None,
            curation_preferences: Some(crate::curator::CurationPreferences {
                priority_topics: vec!["identity".to_string()],
                retention_bias: Some("conservative".to_string()),
                agent_personality: None,
            }),
        };
        let prompt = OpenAiCurator::build_prompt(&turn);
        assert!(prompt.contains("My name is Christian"));
        assert!(prompt.contains("Priority topics: identity"));
        assert!(prompt.contains("Retention bias: conservative"));
    }
}
