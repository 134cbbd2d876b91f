//! Scenario and property-based tests for the NLP peripheral model.
//!
//! `fixtures` holds the shared worked-example NLP sources and a recording
//! `CpuHooks` implementation; `scenarios` drives the model end to end
//! through the public facade the way a real host would; `properties`
//! re-derives the design's quantified invariants and boundary behaviors as
//! proptest properties over the smaller internal modules they actually
//! live in.

pub mod fixtures;

#[cfg(test)]
mod scenarios;

#[cfg(test)]
mod properties;
