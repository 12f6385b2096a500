pub mod domain;
pub mod fallback;
pub mod form;
pub mod orchestrator;
pub mod remote;

pub use self::domain::{LocalIdGenerator, PostDraft, PostRecord, LOCAL_ID_PREFIX};
pub use self::fallback::{
    LocalFallbackStore, MemoryFallbackStore, PersistenceError, SqliteFallbackStore,
    PENDING_POSTS_KEY,
};
pub use self::form::{Field, PostForm};
pub use self::orchestrator::{
    Completion, ErrorKind, SubmissionError, SubmissionOrchestrator, SubmissionState,
};
pub use self::remote::{
    AssumeOnline, ConnectivityHint, HttpRemoteClient, OnlineFlag, RemoteError, RemoteWriteClient,
};
