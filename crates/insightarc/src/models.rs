//! These models represent the objects passed around by the agent
//!
//! There are several related formats we need to interact with:
//! - vercel useChat messages, sent from the interface to the server
//! - vercel streaming protocol parts, sent from the server to the interface
//! - openai messages/tools, sent from the agent to the LLM
//! - tool requests and responses, exchanged between the agent and its systems
//!
//! We always immediately convert those data models into the internal structs using
//! to/from helpers, so the internal models are not an exact match to any of these formats.
pub mod content;
pub mod message;
pub mod research;
pub mod role;
pub mod tool;
