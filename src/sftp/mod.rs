//! SFTP module
//!
//! File-transfer channel and the progress monitor that wraps each transfer.

pub mod progress;
pub mod session;

pub use progress::{TransferProgress, TransferState};
pub use session::{RemoteEntry, SftpChannel};
