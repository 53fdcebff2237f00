//! Backend implementations and the retry policy applied to them.
//!
//! Real backends talk to remote APIs and can fail; [`DegradedBackend`] is
//! local and cannot. The gateway retries the former and falls back to the
//! latter.

#[cfg(feature = "anthropic")]
pub mod anthropic;
pub mod degraded;
#[cfg(any(feature = "anthropic", feature = "openai"))]
mod http;
#[cfg(feature = "openai")]
pub mod openai;
pub mod retry;
pub mod traits;

#[cfg(feature = "anthropic")]
pub use anthropic::AnthropicBackend;
pub use degraded::{DEGRADED_BACKEND, DegradedBackend};
#[cfg(feature = "openai")]
pub use openai::OpenAiBackend;
pub use retry::RetryConfig;
pub use traits::Backend;
