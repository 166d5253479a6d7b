pub mod analysis;
pub mod config;
pub mod diagnostics;
pub mod errors;
pub mod hazard;
pub mod health;
pub mod imputation;
pub mod network;
pub mod null_model;
pub mod params;
pub mod sampler;
pub mod util;
