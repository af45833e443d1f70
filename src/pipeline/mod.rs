pub mod instrument;
pub mod persistence;
pub mod song;
