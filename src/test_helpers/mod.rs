// Test Helpers Module - shared fixtures for unit and integration tests
//
// A scripted reporting backend and an event recorder, so fetch paths can be
// driven without a remote API.

pub mod event_recorder;
pub mod scripted_backend;

pub use event_recorder::EventRecorder;
pub use scripted_backend::{sample_report, ScriptedBackend};
