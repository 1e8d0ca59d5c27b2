pub mod activation;
pub mod assembler;
pub mod capture;
pub mod directory;
pub mod queue;
pub mod types;

pub use assembler::ChunkAssembler;
pub use capture::CaptureEngine;
pub use directory::SessionDirectory;
pub use queue::{channel, FrameQueueConsumer, FrameQueueProducer};
pub use types::{
    AudioFormat, AudioSession, CaptureState, Chunk, InclusionMode, SessionState,
};
