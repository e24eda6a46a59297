//! Core domain types and logic.

pub mod account;
pub mod auth;
pub mod bookkeeping;
pub mod error;
pub mod fire;
pub mod input;
pub mod ledger;
pub mod money;
pub mod quote;
pub mod user;
pub mod valuation;
