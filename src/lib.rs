//! Speech emotion recognition: decode an uploaded clip, extract spectral
//! features, score them with a pre-trained classifier and report the most
//! likely emotion, or "uncertain" when confidence is low.

pub mod audio;
pub mod config;
pub mod emotion;
pub mod features;
pub mod inference;
pub mod model;
pub mod server;
