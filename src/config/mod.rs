pub mod paths;
pub mod settings;

pub use settings::{CacheSettings, RemoteLayout, Settings, SshSettings, TransferSettings};
