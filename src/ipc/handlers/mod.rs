pub mod config;
pub mod core;
pub mod grades;
pub mod rankings;
pub mod reports;
pub mod roster;
