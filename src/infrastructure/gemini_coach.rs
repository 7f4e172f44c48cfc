// Gemini coaching client
use crate::application::coach::CoachClient;
use crate::domain::coach::{CoachPayload, CoachReply};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

const DEFAULT_SUMMARY: &str = "AI Coach summary unavailable.";

const PROMPT_TEMPLATE: &str = r##"
You are Apex Replay, an expert driving instructor.
Analyze the telemetry summary below and produce targeted coaching recommendations and specific track insights.

DATA (JSON):
{payload}

Respond strictly in JSON using this schema:
{
  "summary": "High level overview in <=60 words.",
  "race_brief": "Optional note (<=40 words) about track or race context if relevant.",
  "recommendations": [
    {
      "title": "Short hook (<=6 words)",
      "detail": "Actionable explanation (<=60 words)",
      "focus_area": "e.g. Braking, Turn-in, Exit, Consistency, Racecraft",
      "estimated_gain": "Optional description like '+0.25s' or 'Maintain +6 km/h'",
      "confidence": "high|medium|low"
    }
  ],
  "track_insights": [
    {
      "sector": 1,
      "type": "Braking|Line|Throttle|Gear|Strategy",
      "color": "#hexcode",
      "message": "Short insight (<= 5 words)",
      "detail": "Detailed explanation (<= 20 words)"
    }
  ]
}

"sector" is a 1-based integer.
COLOR MAPPING for track_insights:
- Braking: #ef4444 (Red)
- Line: #3b82f6 (Blue)
- Throttle: #10b981 (Green)
- Gear: #f59e0b (Amber)
- Strategy: #8b5cf6 (Purple)
"##;

#[derive(Debug, Clone)]
pub struct GeminiCoach {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

/// Loosely shaped reply as the model writes it.
#[derive(Debug, Deserialize)]
struct RawReply {
    summary: Option<String>,
    race_brief: Option<String>,
    #[serde(default)]
    recommendations: Vec<Value>,
    #[serde(default)]
    track_insights: Vec<Value>,
}

impl GeminiCoach {
    pub fn new(base_url: &str, model: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build Gemini HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn build_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url,
            urlencoding::encode(&self.model),
            urlencoding::encode(&self.api_key)
        )
    }
}

#[async_trait]
impl CoachClient for GeminiCoach {
    async fn coach(&self, payload: &CoachPayload) -> Result<CoachReply> {
        let prompt = build_prompt(payload)?;
        let body = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });

        let response = self
            .client
            .post(self.build_url())
            .json(&body)
            .send()
            .await
            .context("Failed to send request to Gemini")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Gemini request failed with status {}: {}", status, body);
        }

        let data = response
            .json::<GenerateResponse>()
            .await
            .context("Failed to parse Gemini response")?;

        let text: String = data
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .collect();
        debug!("Gemini replied with {} characters", text.len());

        parse_reply(&text)
    }
}

fn build_prompt(payload: &CoachPayload) -> Result<String> {
    let payload = serde_json::to_string(payload).context("Failed to serialize coach payload")?;
    Ok(PROMPT_TEMPLATE.replace("{payload}", &payload))
}

/// JSON body of a reply, unwrapping a Markdown code fence if present.
pub fn extract_json_block(raw: &str) -> Option<&str> {
    let stripped = raw.trim();
    if stripped.is_empty() {
        return None;
    }
    if stripped.starts_with('{') {
        return Some(stripped);
    }

    let Some(open) = stripped.find("```") else {
        return Some(stripped);
    };
    let after_fence = &stripped[open + 3..];
    let body = after_fence
        .get(..4)
        .filter(|tag| tag.eq_ignore_ascii_case("json"))
        .map_or(after_fence, |_| &after_fence[4..]);
    match body.find("```") {
        Some(close) => Some(body[..close].trim()),
        None => Some(stripped),
    }
}

fn parse_reply(text: &str) -> Result<CoachReply> {
    let json = extract_json_block(text).context("Gemini response lacked JSON content")?;
    let raw: RawReply = serde_json::from_str(json).context("Gemini response was not valid JSON")?;

    let recommendations = raw
        .recommendations
        .iter()
        .map(|rec| {
            let field = |key: &str, default: &str| {
                rec.get(key)
                    .and_then(Value::as_str)
                    .unwrap_or(default)
                    .to_string()
            };
            json!({
                "title": field("title", "Suggested focus"),
                "detail": field("detail", ""),
                "focus_area": field("focus_area", "Driving"),
                "estimated_gain": rec.get("estimated_gain").cloned().unwrap_or(Value::Null),
                "confidence": field("confidence", "medium"),
            })
        })
        .collect();

    Ok(CoachReply {
        summary: raw
            .summary
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SUMMARY.to_string()),
        recommendations,
        race_brief: raw.race_brief,
        track_insights: raw.track_insights,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_block() {
        assert_eq!(extract_json_block("  {\"a\": 1} "), Some("{\"a\": 1}"));
        assert_eq!(
            extract_json_block("Here you go:\n```json\n{\"a\": 1}\n```\nGood luck"),
            Some("{\"a\": 1}")
        );
        assert_eq!(extract_json_block("```\n{\"b\": 2}\n```"), Some("{\"b\": 2}"));
        assert_eq!(extract_json_block("   "), None);
    }

    #[test]
    fn test_parse_reply_fills_defaults() {
        let text = r#"```json
        {
          "summary": "Carry more speed through turn 5.",
          "recommendations": [{"detail": "Brake 10 m later", "confidence": "high"}],
          "track_insights": [{"sector": 3, "type": "Braking"}]
        }
        ```"#;

        let reply = parse_reply(text).unwrap();
        assert_eq!(reply.summary, "Carry more speed through turn 5.");
        assert_eq!(reply.recommendations[0]["title"], "Suggested focus");
        assert_eq!(reply.recommendations[0]["confidence"], "high");
        assert_eq!(reply.recommendations[0]["estimated_gain"], Value::Null);
        assert_eq!(reply.track_insights.len(), 1);
        assert!(reply.race_brief.is_none());
    }

    #[test]
    fn test_parse_reply_rejects_prose() {
        assert!(parse_reply("I cannot help with that.").is_err());

        let reply = parse_reply("{}").unwrap();
        assert_eq!(reply.summary, DEFAULT_SUMMARY);
    }

    #[test]
    fn test_build_url_encodes_key() {
        let coach = GeminiCoach::new(
            "https://example.test/",
            "gemini-2.5-pro",
            "a b",
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            coach.build_url(),
            "https://example.test/v1beta/models/gemini-2.5-pro:generateContent?key=a%20b"
        );
    }
}
