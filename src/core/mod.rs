//! Core functionality module
//!
//! Contains snapshotting, change recognition, the service lifecycle, failure
//! throttling, event dispatch and the scan engine that ties them together.

pub mod discovery;
pub mod dispatcher;
pub mod events;
pub mod lifecycle;
pub mod monitor;
pub mod recognizer;
pub mod snapshot;
pub mod throttle;

// Re-export main types
pub use discovery::DirectoryDiscovery;
pub use dispatcher::{ChannelListener, EventDispatcher, MonitorListener};
pub use events::{FileEvent, FileEventKind, MonitorEvent, StatusEvent, StatusKind};
pub use lifecycle::{ServiceState, StateMachine, Transition};
pub use monitor::{DirectoryMonitor, MIN_DELAY};
pub use recognizer::{
    default_recognizers, CreatedRecognizer, DeletedRecognizer, FinishedWritingRecognizer,
    ModifiedRecognizer, Recognizer,
};
pub use snapshot::{FileKey, FileRecord, Snapshot};
pub use throttle::Throttler;
