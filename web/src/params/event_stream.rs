use serde::Deserialize;

const DEFAULT_COUNT: u32 = 10;

#[derive(Debug, Deserialize)]
pub struct CounterParams {
    /// Number of events to emit before the stream ends.
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_count() -> u32 {
    DEFAULT_COUNT
}
