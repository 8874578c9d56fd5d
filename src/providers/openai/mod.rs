pub mod chat;
pub mod openai;

pub use chat::OpenAIProvider;
pub use openai::OpenAIVisionProvider;
