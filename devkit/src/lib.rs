/*!
# Monic DevKit - scripted collaborators for engine tests

Helpers for exercising the monitoring engine without a real host:
- Scripted resource, endpoint and container collaborators
- Recording and failing alert channels
- A harness wiring them into a [`monic_core::Monitor`]
*/

pub mod stubs;
pub mod test_utils;

pub use stubs::{
    FailingChannel, RecordingChannel, ScriptedProber, ScriptedResourceCollector, StaticContainerLister,
};
pub use test_utils::{init_tracing, TestHarness};
