#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

//! Interpretable linear models of log critical micelle concentration.
//!
//! Subgraph fingerprints go through a fixed sequence of stages: low-frequency
//! pruning, elastic-net feature selection and a cross-validated ridge fit.
//! Each stage hands back the annotations it produced for the feature catalog
//! instead of writing into caller-owned state.

pub mod catalog;
pub mod config;
pub mod data;
pub mod elastic_net;
pub mod estimator;
pub mod frequency;
pub mod model;
pub mod report;
pub mod results;
pub mod ridge;
pub mod scaler;
