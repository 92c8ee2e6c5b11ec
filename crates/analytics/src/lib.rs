#![warn(clippy::unwrap_used)]

pub mod recorder;

pub use recorder::AnalyticsRecorder;
