pub mod config;
pub mod filter;
pub mod number;
pub mod policy;
pub mod source;

pub use filter::{CallFilter, DialResult, IncomingCall, IncomingResult, NumberFilter};
pub use number::CallerNumber;
pub use policy::{Decision, FilterList, ListChanges, ListKind, PolicyError, PolicyStore, SyncState};
pub use source::{FileListSource, ListSource, MemoryListSource, SourceError, Subscription};
