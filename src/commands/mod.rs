pub mod common;
pub mod states;
pub mod proj;
pub mod sortorbs;
pub mod deck;
pub mod band;
