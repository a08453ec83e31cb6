pub mod capabilities;
pub mod chat;
pub mod gateway;
pub mod gemini;
pub mod llm;
pub mod router;
pub mod sse;

#[cfg(test)]
mod test_support;
