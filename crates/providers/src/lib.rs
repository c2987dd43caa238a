pub mod anthropic;
pub mod traits;
pub(crate) mod util;

pub use anthropic::AnthropicClient;
pub use traits::{ChatRequest, ChatResponse, ModelClient, Usage};
