//! HTTP host for the research agent: the text-agent and ACP protocols served
//! as server-sent event streams over one shared engine factory.

pub mod config;
pub mod error;
pub mod routes;
pub mod sse;
pub mod state;
