//! Integration flows

pub mod enforcer_flows;
pub mod policy_flows;
