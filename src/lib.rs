//! Prediction Market Strategy Agents
//!
//! Signal-to-trade pipeline for Polymarket strategy processes: budgeted live
//! data polling, market/event matching, edge detection, tiered validation,
//! Kelly sizing and shared coordination state.

pub mod agent;
pub mod client;
pub mod config;
pub mod coordination;
pub mod error;
pub mod gate;
pub mod matcher;
pub mod model;
pub mod poller;
pub mod risk;
pub mod storage;
pub mod strategy;
pub mod types;

#[cfg(test)]
mod error_tests;
