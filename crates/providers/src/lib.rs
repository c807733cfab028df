pub mod openai_compatible;

pub use openai_compatible::{extract_json_object, OpenAICompatibleProvider};
