pub mod archive;
pub mod export;
pub mod io_utils;
pub mod lease;
pub mod transfer;

pub use archive::{Archive, ArchiveBuilder, ArchiveError, StagingSet};
pub use export::{
    ExportError, ExportOutcome, ExportPipeline, Listing, PathProbe, ReadyExport, ResolvedRoot,
};
pub use lease::{Lease, ShareLeases};
pub use transfer::{copy_tree, CopyReport, TransferError};
