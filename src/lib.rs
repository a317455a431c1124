//! Minecraft 存档备份与还原工具
//!
//! 将每个世界目录打包为压缩归档存入存储目录，并可从存储目录还原

pub mod archive;
pub mod config;
pub mod container;
pub mod error;
pub mod naming;
pub mod platform;
pub mod restore;

pub use archive::{archive_worlds, ArchiveReport};
pub use config::{Config, ConflictPolicy, Edition, SyncConfiguration};
pub use error::SyncError;
pub use platform::SyncEnv;
pub use restore::{restore_worlds, RestoreReport};
