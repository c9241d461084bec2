#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use eco_assess::backend::{BackendError, ModelBackend, PromptId};
use eco_assess::stages::Stages;
use serde_json::{json, Value};
use tokio::sync::Notify;

type Handler = Arc<dyn Fn(&Value) -> Result<Value, BackendError> + Send + Sync>;

/// Backend that answers each prompt from a scripted handler and records
/// every call it receives.
#[derive(Default)]
pub struct ScriptedBackend {
    handlers: Mutex<HashMap<PromptId, Handler>>,
    delays: Mutex<HashMap<PromptId, Duration>>,
    gates: Mutex<Vec<(PromptId, String, Arc<Notify>)>>,
    calls: Mutex<Vec<(PromptId, Value)>>,
}

impl ScriptedBackend {
    /// Every prompt answered with a valid response.
    pub fn healthy() -> Arc<Self> {
        let backend = Arc::new(Self::default());
        backend.respond(PromptId::ExtractProductInfo, |_| Ok(extraction_json("Steel Bottle", "A stainless steel bottle")));
        backend.respond(PromptId::AnalyzeProduct, |_| Ok(analysis_json(62.0)));
        backend.respond(PromptId::GenerateInsights, |_| Ok(insights_json()));
        backend.respond(PromptId::SuggestAlternatives, |_| Ok(alternatives_json(3)));
        backend
    }

    pub fn respond<F>(&self, prompt: PromptId, f: F)
    where
        F: Fn(&Value) -> Result<Value, BackendError> + Send + Sync + 'static,
    {
        self.handlers.lock().unwrap().insert(prompt, Arc::new(f));
    }

    pub fn fail(&self, prompt: PromptId) {
        self.respond(prompt, |_| Err(BackendError::Unavailable("scripted outage".into())));
    }

    pub fn delay(&self, prompt: PromptId, by: Duration) {
        self.delays.lock().unwrap().insert(prompt, by);
    }

    /// Hold calls to `prompt` whose input mentions `needle` until notified.
    pub fn gate(&self, prompt: PromptId, needle: &str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.gates.lock().unwrap().push((prompt, needle.to_string(), notify.clone()));
        notify
    }

    pub fn calls(&self) -> Vec<(PromptId, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, prompt: PromptId) -> Vec<Value> {
        self.calls().into_iter().filter(|(p, _)| *p == prompt).map(|(_, v)| v).collect()
    }

    pub fn stages(self: &Arc<Self>, timeout: Duration) -> Stages {
        Stages::new(self.clone(), timeout)
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    async fn invoke(&self, prompt: PromptId, input: Value) -> Result<Value, BackendError> {
        self.calls.lock().unwrap().push((prompt, input.clone()));

        let gate = {
            let text = input.to_string();
            let gates = self.gates.lock().unwrap();
            gates.iter().find(|(p, needle, _)| *p == prompt && text.contains(needle.as_str())).map(|(_, _, n)| n.clone())
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }
        let delay = self.delays.lock().unwrap().get(&prompt).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let handler = self.handlers.lock().unwrap().get(&prompt).cloned();
        match handler {
            Some(handler) => handler(&input),
            None => Err(BackendError::Unavailable(format!("no script for {}", prompt.as_str()))),
        }
    }
}

pub fn extraction_json(name: &str, description: &str) -> Value {
    json!({ "productName": name, "productDescription": description })
}

pub fn analysis_json(score: f64) -> Value {
    json!({
        "environmentalImpactAnalysis": "Durable product with an energy-intensive manufacturing step.",
        "keyFactors": "Steel production, long service life",
        "detailedAnalysis": {
            "carbonFootprint": { "analysis": "Steel smelting dominates emissions.", "impactLevel": "high" },
            "waterUsage": { "analysis": "Little water used in use phase.", "impactLevel": "low" },
            "materialSourcing": { "analysis": "Partly recycled steel.", "impactLevel": "medium" },
            "recyclability": { "analysis": "Steel is widely recyclable.", "impactLevel": "low" }
        },
        "overallSustainabilityScore": score
    })
}

pub fn insights_json() -> Value {
    json!({
        "actionableTips": ["Keep it for years", "Hand wash to extend life"],
        "positiveHighlights": ["Replaces single-use bottles"],
        "areasForConsideration": []
    })
}

pub fn alternatives_json(count: usize) -> Value {
    let alternatives: Vec<String> = (1..=count).map(|i| format!("Alternative {i}")).collect();
    json!({ "alternatives": alternatives, "reasoning": "Each option lowers embodied carbon." })
}

pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);
