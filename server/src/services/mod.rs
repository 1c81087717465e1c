pub mod account;
pub mod admin;
pub mod audit;
pub mod catalog;
pub mod checkout;
pub mod export;
pub mod handoff;
pub mod prediction;
pub mod reservation;
pub mod stats;
pub mod storage;
