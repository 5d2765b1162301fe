//! Agentive: a terminal front-end for an AI shopping agent.
//!
//! The UI talks to a single `/chat` backend endpoint. Each exchange sends the
//! typed (or dictated) message plus the conversation so far; the reply carries
//! the agent's text and, optionally, a voice clip, a product result set, and a
//! negotiated deal. Results land on the marketplace screen, deals on the deals
//! screen, and the whole conversation stays scrollable in the chat panel.

pub mod agent;
pub mod app;
pub mod config;
pub mod handler;
pub mod speech;
pub mod tui;
pub mod ui;
