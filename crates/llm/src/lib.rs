//! Model access for quarry.
//!
//! [`LlmClient`] is the provider seam, implemented by [`OllamaClient`] for a
//! local Ollama server and by [`ScriptedClient`] for tests and offline runs.
//! Pipeline stages hold a [`Generator`], which binds a client to one model,
//! temperature and deadline.
//!
//! ```no_run
//! use quarry_llm::{create_client, Generator};
//!
//! # async fn example() -> quarry_core::AppResult<()> {
//! let client = create_client("ollama", None, None)?;
//! let answer = Generator::new(client, "llama3.2")
//!     .with_temperature(0.0)
//!     .generate("How many tables does a star schema have?")
//!     .await?;
//! println!("{}", answer);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod factory;
pub mod generator;
pub mod providers;

pub use client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
pub use factory::create_client;
pub use generator::Generator;
pub use providers::{OllamaClient, ScriptedClient};
