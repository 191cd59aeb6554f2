//! P0 perception agents: pain, emotion, trend, and scene scanners
//!
//! Each agent turns raw content items into typed signals via token-pattern
//! detection, with scores weighted by content length, recency, and
//! source-type tier. All four are deterministic given identical input,
//! snapshot, and config.

use async_trait::async_trait;
use serde_json::json;

use verdure_core::Signal;
use verdure_types::{AgentId, Quadrant, Result, SignalKind, SourceType};

use crate::agents::traits::{
    AgentConfig, AgentInput, AgentPayload, ContentItem, LayerAgent, MemorySnapshot,
};

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "this", "that", "you", "your", "are", "was", "but", "not",
    "have", "has", "its", "it's", "too", "very", "just", "about", "from", "into", "out",
];

const KEYWORD_LIMIT: usize = 8;

/// Salient lowercase words of a text: length >= 3, stopwords removed,
/// first occurrence order preserved
fn extract_keywords(text: &str) -> Vec<String> {
    let mut keywords = Vec::new();
    for raw in text.split(|c: char| !c.is_alphanumeric()) {
        let word = raw.to_lowercase();
        if word.len() < 3 || STOPWORDS.contains(&word.as_str()) {
            continue;
        }
        if !keywords.contains(&word) {
            keywords.push(word);
            if keywords.len() == KEYWORD_LIMIT {
                break;
            }
        }
    }
    keywords
}

fn length_weight(text: &str) -> f64 {
    match text.len() {
        len if len > 2000 => 1.0,
        len if len > 500 => 0.8,
        len if len > 100 => 0.6,
        _ => 0.4,
    }
}

fn recency_weight(item: &ContentItem, input: &AgentInput) -> f64 {
    let age_hours = (input.reference_time - item.published_at).num_hours();
    match age_hours {
        h if h < 24 => 1.0,
        h if h < 72 => 0.8,
        h if h < 168 => 0.6,
        _ => 0.4,
    }
}

fn source_tier_weight(source_type: SourceType) -> f64 {
    match source_type {
        SourceType::Sensor => 0.9,
        SourceType::Processor => 0.8,
        SourceType::Event => 0.7,
        SourceType::Manual => 0.6,
    }
}

/// Composite weighting shared by the perception scorers
fn content_weight(item: &ContentItem, input: &AgentInput) -> f64 {
    0.5 + 0.2 * length_weight(&item.text)
        + 0.2 * recency_weight(item, input)
        + 0.1 * source_tier_weight(item.source_type)
}

fn matched_tokens(text: &str, vocabulary: &[&str]) -> Vec<String> {
    let lowered = text.to_lowercase();
    vocabulary
        .iter()
        .filter(|token| lowered.contains(*token))
        .map(|token| token.to_string())
        .collect()
}

/// Q1P0 PainScanner: detects urgent user painpoints
pub struct PainScannerAgent;

impl PainScannerAgent {
    const PAIN_TOKENS: &'static [&'static str] = &[
        "slow", "broken", "frustrat", "fail", "crash", "bug", "annoying", "struggle",
        "waste", "stuck", "confusing", "can't", "doesn't work", "impossible",
    ];

    pub fn new() -> Self {
        Self
    }
}

impl Default for PainScannerAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LayerAgent for PainScannerAgent {
    fn id(&self) -> AgentId {
        AgentId::Q1P0
    }

    fn default_config(&self) -> AgentConfig {
        AgentConfig::from_pairs(&[
            ("urgency_threshold", 60.0),
            ("emotion_weight", 0.3),
            ("recency_decay", 24.0),
        ])
    }

    async fn invoke(
        &self,
        input: &AgentInput,
        _snapshot: &MemorySnapshot,
        config: &AgentConfig,
    ) -> Result<AgentPayload> {
        let threshold = config.get("urgency_threshold", 60.0);
        let mut signals = Vec::new();

        for item in &input.items {
            let matched = matched_tokens(&item.text, Self::PAIN_TOKENS);
            if matched.is_empty() {
                continue;
            }

            let base = 40.0 + 12.0 * matched.len() as f64;
            let urgency = (base * content_weight(item, input)).clamp(0.0, 100.0);
            if urgency < threshold {
                continue;
            }

            signals.push(
                Signal::new(
                    format!("Q1P0-{}-{}", input.session_id, item.id),
                    Quadrant::Q1,
                    SignalKind::Pain,
                )
                .with_keywords(extract_keywords(&item.text))
                .with_score(urgency)
                .with_text(item.text.clone())
                .with_payload("matched_tokens", json!(matched))
                .with_payload("source", json!(item.source.clone())),
            );
        }

        Ok(AgentPayload::Signals { signals })
    }
}

/// Q2P0 EmotionWatcher: detects strong emotional resonance
pub struct EmotionWatcherAgent;

impl EmotionWatcherAgent {
    /// Lexicon of emotion markers with base intensities
    const EMOTION_TOKENS: &'static [(&'static str, &'static str, f64)] = &[
        ("furious", "anger", 90.0),
        ("hate", "anger", 85.0),
        ("angry", "anger", 80.0),
        ("thrilled", "joy", 85.0),
        ("love", "joy", 80.0),
        ("excited", "joy", 75.0),
        ("anxious", "fear", 70.0),
        ("worried", "fear", 60.0),
        ("scared", "fear", 75.0),
        ("disappointed", "sadness", 65.0),
        ("heartbroken", "sadness", 85.0),
        ("overwhelmed", "stress", 72.0),
    ];

    pub fn new() -> Self {
        Self
    }
}

impl Default for EmotionWatcherAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LayerAgent for EmotionWatcherAgent {
    fn id(&self) -> AgentId {
        AgentId::Q2P0
    }

    fn default_config(&self) -> AgentConfig {
        AgentConfig::from_pairs(&[("intensity_threshold", 60.0), ("trigger_limit", 5.0)])
    }

    async fn invoke(
        &self,
        input: &AgentInput,
        _snapshot: &MemorySnapshot,
        config: &AgentConfig,
    ) -> Result<AgentPayload> {
        let threshold = config.get("intensity_threshold", 60.0);
        let mut signals = Vec::new();

        for item in &input.items {
            let lowered = item.text.to_lowercase();
            let hits: Vec<&(&str, &str, f64)> = Self::EMOTION_TOKENS
                .iter()
                .filter(|(token, _, _)| lowered.contains(token))
                .collect();
            if hits.is_empty() {
                continue;
            }

            let peak = hits.iter().map(|(_, _, base)| *base).fold(0.0, f64::max);
            let intensity =
                ((peak + 4.0 * (hits.len() as f64 - 1.0)) * content_weight(item, input))
                    .clamp(0.0, 100.0);
            if intensity < threshold {
                continue;
            }

            // Dominant emotion is the highest-intensity hit
            let dominant = hits
                .iter()
                .max_by(|a, b| a.2.total_cmp(&b.2))
                .map(|(_, label, _)| *label)
                .unwrap_or("mixed");
            let triggers: Vec<String> = hits.iter().map(|(token, _, _)| token.to_string()).collect();

            signals.push(
                Signal::new(
                    format!("Q2P0-{}-{}", input.session_id, item.id),
                    Quadrant::Q2,
                    SignalKind::Emotion,
                )
                .with_keywords(extract_keywords(&item.text))
                .with_score(intensity)
                .with_text(item.text.clone())
                .with_payload("emotion", json!(dominant))
                .with_payload("intensity", json!(intensity))
                .with_payload("triggers", json!(triggers)),
            );
        }

        Ok(AgentPayload::Signals { signals })
    }
}

/// Q3P0 TrendHunter: detects rising topics
pub struct TrendHunterAgent;

impl TrendHunterAgent {
    const TREND_TOKENS: &'static [&'static str] = &[
        "trending", "viral", "everyone", "blowing up", "new", "launch", "growing",
        "surge", "taking off", "hype", "hot right now",
    ];

    pub fn new() -> Self {
        Self
    }
}

impl Default for TrendHunterAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LayerAgent for TrendHunterAgent {
    fn id(&self) -> AgentId {
        AgentId::Q3P0
    }

    fn default_config(&self) -> AgentConfig {
        AgentConfig::from_pairs(&[
            ("velocity_threshold", 70.0),
            ("novelty_weight", 0.4),
            ("window_size", 48.0),
        ])
    }

    async fn invoke(
        &self,
        input: &AgentInput,
        _snapshot: &MemorySnapshot,
        config: &AgentConfig,
    ) -> Result<AgentPayload> {
        let threshold = config.get("velocity_threshold", 70.0);
        let novelty_weight = config.get("novelty_weight", 0.4);
        let mut signals = Vec::new();

        for item in &input.items {
            let matched = matched_tokens(&item.text, Self::TREND_TOKENS);
            if matched.is_empty() {
                continue;
            }

            let novelty = recency_weight(item, input);
            let base = 50.0 + 14.0 * matched.len() as f64;
            let velocity = (base * (1.0 - novelty_weight + novelty_weight * novelty)
                * content_weight(item, input))
            .clamp(0.0, 100.0);
            if velocity < threshold {
                continue;
            }

            let keywords = extract_keywords(&item.text);
            let topic = keywords
                .iter()
                .take(2)
                .cloned()
                .collect::<Vec<_>>()
                .join(" ");

            signals.push(
                Signal::new(
                    format!("Q3P0-{}-{}", input.session_id, item.id),
                    Quadrant::Q3,
                    SignalKind::Trend,
                )
                .with_keywords(keywords)
                .with_score(velocity)
                .with_text(item.text.clone())
                .with_payload("topic", json!(topic))
                .with_payload("matched_tokens", json!(matched)),
            );
        }

        Ok(AgentPayload::Signals { signals })
    }
}

/// Q4P0 SceneDiscover: detects concrete usage scenarios
pub struct SceneDiscoverAgent;

impl SceneDiscoverAgent {
    const SCENE_TOKENS: &'static [&'static str] = &[
        "at work", "commute", "morning", "before bed", "weekend", "meeting", "travel",
        "gym", "kitchen", "on the go", "late night", "at home",
    ];

    pub fn new() -> Self {
        Self
    }
}

impl Default for SceneDiscoverAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LayerAgent for SceneDiscoverAgent {
    fn id(&self) -> AgentId {
        AgentId::Q4P0
    }

    fn default_config(&self) -> AgentConfig {
        AgentConfig::from_pairs(&[("specificity_threshold", 55.0)])
    }

    async fn invoke(
        &self,
        input: &AgentInput,
        _snapshot: &MemorySnapshot,
        config: &AgentConfig,
    ) -> Result<AgentPayload> {
        let threshold = config.get("specificity_threshold", 55.0);
        let mut signals = Vec::new();

        for item in &input.items {
            let matched = matched_tokens(&item.text, Self::SCENE_TOKENS);
            if matched.is_empty() {
                continue;
            }

            let base = 45.0 + 15.0 * matched.len() as f64;
            let specificity = (base * content_weight(item, input)).clamp(0.0, 100.0);
            if specificity < threshold {
                continue;
            }

            signals.push(
                Signal::new(
                    format!("Q4P0-{}-{}", input.session_id, item.id),
                    Quadrant::Q4,
                    SignalKind::Scene,
                )
                .with_keywords(extract_keywords(&item.text))
                .with_score(specificity)
                .with_text(item.text.clone())
                .with_payload("scene", json!(matched.join(", ")))
                .with_payload("matched_tokens", json!(matched)),
            );
        }

        Ok(AgentPayload::Signals { signals })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn input_with(texts: &[&str]) -> AgentInput {
        let now = Utc::now();
        AgentInput::new("sync-test")
            .with_reference_time(now)
            .with_items(
                texts
                    .iter()
                    .enumerate()
                    .map(|(i, text)| {
                        ContentItem::new(format!("item{}", i), *text)
                            .with_source("feed", SourceType::Sensor)
                            .with_published_at(now - chrono::Duration::hours(1))
                    })
                    .collect(),
            )
    }

    #[tokio::test]
    async fn pain_scanner_flags_urgent_items() {
        let agent = PainScannerAgent::new();
        let input = input_with(&[
            "login is so slow it keeps crashing and the bug makes me struggle daily",
            "lovely weather today",
        ]);
        let config = agent.default_config();

        let payload = agent
            .invoke(&input, &MemorySnapshot::default(), &config)
            .await
            .unwrap();
        let AgentPayload::Signals { signals } = payload else {
            panic!("expected signals");
        };
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].quadrant, Quadrant::Q1);
        assert!(signals[0].score >= 60.0);
        assert!(signals[0].keywords.contains(&"login".to_string()));
    }

    #[tokio::test]
    async fn pain_scanner_is_deterministic() {
        let agent = PainScannerAgent::new();
        let input = input_with(&["checkout flow keeps failing and the crash wastes my morning"]);
        let config = agent.default_config();
        let snapshot = MemorySnapshot::default();

        let a = agent.invoke(&input, &snapshot, &config).await.unwrap();
        let b = agent.invoke(&input, &snapshot, &config).await.unwrap();
        assert_eq!(
            serde_json::to_value(&a).unwrap(),
            serde_json::to_value(&b).unwrap()
        );
    }

    #[tokio::test]
    async fn emotion_watcher_reports_intensity_and_triggers() {
        let agent = EmotionWatcherAgent::new();
        let input = input_with(&["I am furious and disappointed, I hate how this update behaves"]);
        let config = agent.default_config();

        let payload = agent
            .invoke(&input, &MemorySnapshot::default(), &config)
            .await
            .unwrap();
        let AgentPayload::Signals { signals } = payload else {
            panic!("expected signals");
        };
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].kind, SignalKind::Emotion);
        assert_eq!(signals[0].payload["emotion"], json!("anger"));
        let triggers = signals[0].payload["triggers"].as_array().unwrap();
        assert!(triggers.contains(&json!("furious")));
    }

    #[tokio::test]
    async fn trend_hunter_respects_velocity_threshold() {
        let agent = TrendHunterAgent::new();
        let mut config = agent.default_config();
        config.set("velocity_threshold", 99.9);

        let input = input_with(&["this new launch is trending, everyone is talking"]);
        let payload = agent
            .invoke(&input, &MemorySnapshot::default(), &config)
            .await
            .unwrap();
        assert_eq!(payload.signal_count(), 0);
    }

    #[tokio::test]
    async fn scene_discover_extracts_scene_context() {
        let agent = SceneDiscoverAgent::new();
        let input = input_with(&["I always listen to summaries during my commute and at the gym"]);
        let config = agent.default_config();

        let payload = agent
            .invoke(&input, &MemorySnapshot::default(), &config)
            .await
            .unwrap();
        let AgentPayload::Signals { signals } = payload else {
            panic!("expected signals");
        };
        assert_eq!(signals.len(), 1);
        let scene = signals[0].payload["scene"].as_str().unwrap();
        assert!(scene.contains("commute"));
        assert!(scene.contains("gym"));
    }
}
