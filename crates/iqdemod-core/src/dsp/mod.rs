pub mod audio_decim;
pub mod demod;
pub mod iq_decim;
pub mod kernel;
pub mod sample;
