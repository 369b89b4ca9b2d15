// src/lib.rs

//! Coursewatch: polls course listings, reports new free courses once, and
//! keeps a durable record of what has already been reported.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;

#[cfg(test)]
mod testing;
