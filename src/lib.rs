pub mod common;
pub mod configs;
pub mod player;
pub mod sources;
