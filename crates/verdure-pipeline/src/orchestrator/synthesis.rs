//! Cross-quadrant signal synthesis
//!
//! Three deterministic rules combine P0 signals from paired quadrants into
//! higher-order opportunities. Given identical inputs and threshold the
//! output is bit-identical: candidate generation follows input order, ids
//! derive from the session id, and the final sort is stable by
//! `(-confidence, signal_id)`.

use chrono::Utc;

use verdure_core::{CrossQuadrantSignal, CrossSignalType, Signal};
use verdure_types::{AgentId, Quadrant, SignalPriority};

fn truncated(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        text.to_string()
    } else {
        let cut: String = text.chars().take(limit).collect();
        format!("{}...", cut)
    }
}

fn emotion_intensity(signal: &Signal) -> f64 {
    signal
        .payload
        .get("intensity")
        .and_then(|v| v.as_f64())
        .unwrap_or(signal.score)
}

fn emotion_triggers(signal: &Signal) -> Vec<String> {
    signal
        .payload
        .get("triggers")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

/// Urgent painpoints aligned with trending topics: the highest-value
/// pattern, an immediate content opportunity
fn detect_pain_trend(
    session_id: &str,
    pain_signals: &[Signal],
    trend_signals: &[Signal],
    threshold: f64,
) -> Vec<CrossQuadrantSignal> {
    let mut synthesized = Vec::new();

    for pain in pain_signals {
        for trend in trend_signals {
            let overlap = pain
                .keywords
                .iter()
                .filter(|k| trend.keywords.contains(k))
                .count();
            if overlap < 1 {
                continue;
            }

            let confidence = (0.5 + 0.2 * overlap as f64).min(1.0);
            if confidence < threshold {
                continue;
            }

            let topic = trend
                .payload
                .get("topic")
                .and_then(|v| v.as_str())
                .unwrap_or(&trend.text)
                .to_string();

            synthesized.push(CrossQuadrantSignal {
                signal_id: format!("PT-{}-{}", session_id, synthesized.len()),
                source_quadrants: vec![Quadrant::Q1, Quadrant::Q3],
                signal_type: CrossSignalType::PainTrend,
                title: format!("Trending painpoint: {}", truncated(&pain.text, 50)),
                description: format!(
                    "An urgent painpoint is currently trending. Pain: {}. Trend: {}.",
                    truncated(&pain.text, 100),
                    topic
                ),
                priority: if pain.score > 80.0 {
                    SignalPriority::Critical
                } else {
                    SignalPriority::High
                },
                confidence,
                raw_signals: vec![pain.signal_id.clone(), trend.signal_id.clone()],
                recommended_action: "Create immediate response content capturing this trend"
                    .to_string(),
                target_agents: vec![AgentId::Q1P1, AgentId::Q3P1],
                created_at: Utc::now(),
            });
        }
    }

    synthesized
}

/// Strong emotion inside a concrete scenario: a resonance opportunity
fn detect_emotion_scene(
    session_id: &str,
    emotion_signals: &[Signal],
    scene_signals: &[Signal],
    threshold: f64,
) -> Vec<CrossQuadrantSignal> {
    let mut synthesized = Vec::new();

    for emotion in emotion_signals {
        let intensity = emotion_intensity(emotion);
        if intensity <= 70.0 {
            continue;
        }
        let emotion_label = emotion
            .payload
            .get("emotion")
            .and_then(|v| v.as_str())
            .unwrap_or("strong")
            .to_string();

        for scene in scene_signals {
            let confidence = (intensity / 100.0 + 0.2).min(1.0);
            if confidence < threshold {
                continue;
            }

            let scene_context = scene
                .payload
                .get("scene")
                .and_then(|v| v.as_str())
                .unwrap_or(&scene.text)
                .to_string();

            synthesized.push(CrossQuadrantSignal {
                signal_id: format!("ES-{}-{}", session_id, synthesized.len()),
                source_quadrants: vec![Quadrant::Q2, Quadrant::Q4],
                signal_type: CrossSignalType::EmotionScene,
                title: format!(
                    "Emotional scenario: {} in {}",
                    emotion_label,
                    truncated(&scene_context, 30)
                ),
                description: format!(
                    "Strong {} emotion detected in scenario: {}.",
                    emotion_label, scene_context
                ),
                priority: SignalPriority::High,
                confidence,
                raw_signals: vec![emotion.signal_id.clone(), scene.signal_id.clone()],
                recommended_action: "Create emotionally resonant scenario-based content"
                    .to_string(),
                target_agents: vec![AgentId::Q2P1, AgentId::Q4P1],
                created_at: Utc::now(),
            });
        }
    }

    synthesized
}

/// Painpoints with a strong emotional component: high conversion potential
fn detect_pain_emotion(
    session_id: &str,
    pain_signals: &[Signal],
    emotion_signals: &[Signal],
    threshold: f64,
) -> Vec<CrossQuadrantSignal> {
    let mut synthesized = Vec::new();

    for pain in pain_signals {
        let pain_text = pain.text.to_lowercase();

        for emotion in emotion_signals {
            let intensity = emotion_intensity(emotion);
            let trigger_overlap = emotion_triggers(emotion)
                .iter()
                .any(|t| pain_text.contains(&t.to_lowercase()));
            if !trigger_overlap && intensity <= 75.0 {
                continue;
            }

            let confidence = (0.6 + 0.3 * intensity / 100.0).min(1.0);
            if confidence < threshold {
                continue;
            }

            synthesized.push(CrossQuadrantSignal {
                signal_id: format!("PE-{}-{}", session_id, synthesized.len()),
                source_quadrants: vec![Quadrant::Q1, Quadrant::Q2],
                signal_type: CrossSignalType::PainEmotion,
                title: format!("Emotional painpoint: {}", truncated(&pain.text, 50)),
                description: format!(
                    "Painpoint with strong emotional resonance. Urgency: {:.0}/100, emotion: {:.0}/100.",
                    pain.score, intensity
                ),
                priority: SignalPriority::High,
                confidence,
                raw_signals: vec![pain.signal_id.clone(), emotion.signal_id.clone()],
                recommended_action:
                    "Create content that both solves the problem and validates the emotion"
                        .to_string(),
                target_agents: vec![AgentId::Q1P1, AgentId::Q2P1],
                created_at: Utc::now(),
            });
        }
    }

    synthesized
}

/// Per-quadrant signal sets fed into one synthesis pass
#[derive(Debug, Default)]
pub struct SynthesisInput {
    pub pain: Vec<Signal>,
    pub emotion: Vec<Signal>,
    pub trend: Vec<Signal>,
    pub scene: Vec<Signal>,
}

/// Run all three rules, drop sub-threshold signals, and sort the
/// survivors by confidence descending (ties broken by signal id)
pub fn synthesize(
    session_id: &str,
    input: &SynthesisInput,
    min_confidence_threshold: f64,
) -> Vec<CrossQuadrantSignal> {
    let mut synthesized = Vec::new();

    if !input.pain.is_empty() && !input.trend.is_empty() {
        synthesized.extend(detect_pain_trend(
            session_id,
            &input.pain,
            &input.trend,
            min_confidence_threshold,
        ));
    }
    if !input.emotion.is_empty() && !input.scene.is_empty() {
        synthesized.extend(detect_emotion_scene(
            session_id,
            &input.emotion,
            &input.scene,
            min_confidence_threshold,
        ));
    }
    if !input.pain.is_empty() && !input.emotion.is_empty() {
        synthesized.extend(detect_pain_emotion(
            session_id,
            &input.pain,
            &input.emotion,
            min_confidence_threshold,
        ));
    }

    synthesized.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.signal_id.cmp(&b.signal_id))
    });
    synthesized
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use verdure_types::SignalKind;

    fn pain_signal(text: &str, score: f64, keywords: &[&str]) -> Signal {
        Signal::new("Q1P0-sync-0".to_string(), Quadrant::Q1, SignalKind::Pain)
            .with_text(text)
            .with_score(score)
            .with_keywords(keywords.iter().map(|k| k.to_string()).collect())
    }

    fn trend_signal(topic: &str, keywords: &[&str]) -> Signal {
        Signal::new("Q3P0-sync-0".to_string(), Quadrant::Q3, SignalKind::Trend)
            .with_keywords(keywords.iter().map(|k| k.to_string()).collect())
            .with_payload("topic", json!(topic))
    }

    fn emotion_signal(id: &str, intensity: f64, triggers: &[&str]) -> Signal {
        Signal::new(id.to_string(), Quadrant::Q2, SignalKind::Emotion)
            .with_score(intensity)
            .with_payload("intensity", json!(intensity))
            .with_payload("emotion", json!("anger"))
            .with_payload(
                "triggers",
                json!(triggers.iter().map(|t| t.to_string()).collect::<Vec<_>>()),
            )
    }

    #[test]
    fn pain_trend_single_overlap_hits_critical_at_threshold() {
        let input = SynthesisInput {
            pain: vec![pain_signal("login is too slow", 85.0, &["slow", "login"])],
            trend: vec![trend_signal("auth trends", &["login", "auth"])],
            ..Default::default()
        };

        let signals = synthesize("sync-t", &input, 0.7);
        assert_eq!(signals.len(), 1);
        let signal = &signals[0];
        assert_eq!(signal.signal_type, CrossSignalType::PainTrend);
        assert!((signal.confidence - 0.7).abs() < 1e-9);
        assert_eq!(signal.priority, SignalPriority::Critical);
        assert_eq!(signal.source_quadrants, vec![Quadrant::Q1, Quadrant::Q3]);
    }

    #[test]
    fn sub_threshold_signals_are_dropped() {
        let input = SynthesisInput {
            pain: vec![pain_signal("login is too slow", 60.0, &["slow", "login"])],
            trend: vec![trend_signal("auth trends", &["login"])],
            ..Default::default()
        };
        // One-keyword overlap gives 0.7, below a 0.75 threshold
        assert!(synthesize("sync-t", &input, 0.75).is_empty());
    }

    #[test]
    fn empty_input_yields_no_signals() {
        assert!(synthesize("sync-t", &SynthesisInput::default(), 0.7).is_empty());
    }

    #[test]
    fn pain_emotion_uses_trigger_overlap_or_intensity() {
        let pain = pain_signal("checkout is broken and slow", 70.0, &["checkout"]);

        // Trigger word appears in pain text; modest intensity still matches
        let by_trigger = SynthesisInput {
            pain: vec![pain.clone()],
            emotion: vec![emotion_signal("Q2P0-a", 50.0, &["broken"])],
            ..Default::default()
        };
        let signals = synthesize("sync-t", &by_trigger, 0.7);
        assert_eq!(signals.len(), 1);
        assert!((signals[0].confidence - 0.75).abs() < 1e-9);

        // No trigger overlap, but intensity above 75 matches on its own
        let by_intensity = SynthesisInput {
            pain: vec![pain.clone()],
            emotion: vec![emotion_signal("Q2P0-b", 80.0, &["unrelated"])],
            ..Default::default()
        };
        assert_eq!(synthesize("sync-t", &by_intensity, 0.7).len(), 1);

        // Neither condition holds
        let neither = SynthesisInput {
            pain: vec![pain],
            emotion: vec![emotion_signal("Q2P0-c", 60.0, &["unrelated"])],
            ..Default::default()
        };
        assert!(synthesize("sync-t", &neither, 0.7).is_empty());
    }

    #[test]
    fn output_is_sorted_and_bit_deterministic() {
        let input = SynthesisInput {
            pain: vec![
                pain_signal("login is too slow", 85.0, &["slow", "login"]),
                pain_signal("export is broken", 82.0, &["export", "broken"]),
            ],
            trend: vec![
                trend_signal("auth trends", &["login", "auth", "slow"]),
                trend_signal("export chatter", &["export"]),
            ],
            emotion: vec![emotion_signal("Q2P0-x", 90.0, &["slow"])],
            scene: vec![Signal::new("Q4P0-x".to_string(), Quadrant::Q4, SignalKind::Scene)
                .with_payload("scene", json!("commute"))],
        };

        let first = synthesize("sync-t", &input, 0.7);
        let second = synthesize("sync-t", &input, 0.7);

        let strip = |signals: &[CrossQuadrantSignal]| {
            signals
                .iter()
                .map(|s| (s.signal_id.clone(), s.confidence, s.signal_type))
                .collect::<Vec<_>>()
        };
        assert_eq!(strip(&first), strip(&second));

        for window in first.windows(2) {
            assert!(window[0].confidence >= window[1].confidence);
            if (window[0].confidence - window[1].confidence).abs() < 1e-12 {
                assert!(window[0].signal_id < window[1].signal_id);
            }
        }
    }
}
