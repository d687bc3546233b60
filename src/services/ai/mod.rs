//! Model pipeline: transport, intent interpretation, factor-conditioned
//! generation and prompt optimization.

pub mod client;
pub mod generator;
pub mod interpreter;
pub mod optimizer;
mod retry_policy;
pub mod types;

pub use client::{ModelClient, ModelTransport};
pub use types::{GenerationOutcome, Intent, ModelResponse};

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;

    use serde_json::Value as JsonValue;

    use super::client::ModelTransport;
    use super::types::ModelResponse;

    /// Transport stub that records every request and replays scripted
    /// responses. A single remaining response repeats forever, which lets a
    /// test script "always answers with a function call" behavior.
    pub struct ScriptedTransport {
        responses: Mutex<Vec<JsonValue>>,
        requests: Mutex<Vec<(String, JsonValue)>>,
    }

    impl ScriptedTransport {
        pub fn new(responses: Vec<JsonValue>) -> Self {
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn request(&self, index: usize) -> JsonValue {
            self.requests.lock().unwrap()[index].1.clone()
        }
    }

    impl ModelTransport for ScriptedTransport {
        async fn generate(
            &self,
            model: &str,
            request: &JsonValue,
        ) -> Result<ModelResponse, String> {
            self.requests
                .lock()
                .unwrap()
                .push((model.to_string(), request.clone()));
            let mut responses = self.responses.lock().unwrap();
            let raw = match responses.len() {
                0 => return Err("transporte sem resposta programada".to_string()),
                1 => responses[0].clone(),
                _ => responses.remove(0),
            };
            serde_json::from_value(raw).map_err(|e| e.to_string())
        }
    }
}
