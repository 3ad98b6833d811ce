use serde::{Deserialize, Serialize};

/// What the synthesizer hands back. The workflow only relies on `answer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesizedAnswer {
    #[serde(default)]
    pub thought_process: Vec<String>,
    pub answer: String,
    #[serde(default = "default_enough_context")]
    pub enough_context: bool,
}

fn default_enough_context() -> bool {
    true
}

impl SynthesizedAnswer {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            thought_process: Vec::new(),
            answer: answer.into(),
            enough_context: true,
        }
    }
}
