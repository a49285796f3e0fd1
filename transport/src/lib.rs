//! Four interchangeable implementations of the [`uploader::Uploader`]
//! capability: `sftp`, `scp`, `rsync`, `local`. Each can connect,
//! disconnect, transfer a file, optionally delete, and optionally expose
//! two extra capabilities: `get_diff` (rsync only) and `list_remote_files`
//! (sftp/local).

pub mod local;
pub mod rsync;
pub mod scp;
pub mod sftp;
pub mod uploader;

pub use uploader::{
    make_uploader, DiffCapable, GetDiffOptions, ListCapable, RemoteFile, TransportError,
    TransportResult, Uploader,
};
