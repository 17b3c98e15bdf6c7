pub mod client;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use client::GeminiClient;
