pub mod hash;
pub mod select;
pub mod chunker;
pub mod manifest;
pub mod signer;
pub mod symlink;
pub mod snapshot;
pub mod builder;
pub mod verify;
pub mod watch;

pub use hash::{compute_content_hash, sha256_file};
pub use select::{PathSelector, Selection};
pub use chunker::Chunker;
pub use manifest::{ChunkDescriptor, Encoding, FeedEntry, FileEntry, Manifest, ManifestBuilder, Status};
pub use signer::{sign_manifest, verify_signature, KeySource, SigningKey};
pub use snapshot::{resolve_site, SnapshotStore};
pub use builder::{BuildOutcome, SnapshotBuilder};
pub use verify::{ChunkFailure, SampleSize, Verifier, VerifyError, VerifyReport};
pub use watch::{Debouncer, Watcher};
