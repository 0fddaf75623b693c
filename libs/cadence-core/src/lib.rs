pub mod config;
pub mod error;
pub mod mqtt;
pub mod record;
pub mod recorder;
pub mod replay;
pub mod store;

pub use config::{BrokerSettings, CadenceConfig, StorageSettings};
pub use error::CadenceError;
pub use record::MessageRecord;
pub use recorder::{Recorder, RecorderStats};
pub use replay::{replay, MessageSink, ReplayStats};
pub use store::{
    list_recordings, next_index, open_recording, RecordingCursor, RecordingSelector,
    RecordingSession, RecordingSummary,
};
