mod entry;
mod journal;
mod virtual_fs;

pub use entry::{Entry, EntryType, MetaOverrides, Metadata};
pub use virtual_fs::{StorageUsage, VirtualFileSystem};
