//! Test doubles and a fully wired in-memory harness.

mod doubles;
mod harness;

pub use doubles::{
    FailingPasteRepository, FlakyShortlinkRepository, FlakyStorage, RecordingNotifier,
    SentVerification, SequenceIdGenerator, StubFetcher,
};
pub use harness::TestHarness;
