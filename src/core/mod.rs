pub mod comparator;
pub mod files;
pub mod mirror;
pub mod path;
pub mod reconcile;
pub mod resource;
pub mod scanner;
pub mod tree;

pub use comparator::{ActionSummary, FileAction};
pub use files::{list_remote_files, RemoteFile};
pub use mirror::{DirectoryMirror, MirrorReport};
pub use path::CategoryPath;
pub use reconcile::{CategoryPlan, CategoryTarget, CategoryTree, CategoryUpdateReport};
pub use resource::{ResourceKind, ResourcePolicy};
pub use scanner::{list_directory, LocalFile};
pub use tree::{flatten_tree, CategoryRow, CategoryTable};
