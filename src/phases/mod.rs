//! Concrete phase behaviors: the C-family build phases and the external
//! repository fetcher, built on the shared option/step helpers in
//! [`common`].

pub mod archive;
pub mod common;
pub mod compile;
pub mod compound;
pub mod external_repo;
pub mod link_to_exe;
pub mod link_to_shared_object;

pub use archive::{archive_defaults, ArchiveBehavior};
pub use compile::{compile_defaults, CompileBehavior};
pub use compound::{
    compile_and_archive_defaults, compile_and_link_to_exe_defaults, compile_and_link_to_shared_object_defaults,
    CompileAndArchiveBehavior, CompileAndLinkToExeBehavior, CompileAndLinkToSharedObjectBehavior,
};
pub use external_repo::{external_repo_defaults, ExternalRepoBehavior};
pub use link_to_exe::{link_to_exe_defaults, LinkToExeBehavior};
pub use link_to_shared_object::{link_to_shared_object_defaults, LinkToSharedObjectBehavior};
