//! Integration scenarios.

pub mod event_flows;
pub mod gateway_flows;
pub mod resilience_flows;
