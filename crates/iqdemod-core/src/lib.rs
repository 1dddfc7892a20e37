pub mod config;
pub mod dsp;
pub mod pipeline;
pub mod protocol;
