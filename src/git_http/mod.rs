//! Git smart HTTP protocol surface.
//!
//! Advertisement and RPC exchanges are delegated to the system git toolchain
//! in stateless-RPC mode; object, pack and text files are served directly out
//! of the repository's object store.

pub mod errors;
pub mod files;
pub mod pkt;
pub mod routes;
pub mod smart;

use std::fmt;

/// The two services git speaks over smart HTTP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitService {
    UploadPack,
    ReceivePack,
}

impl GitService {
    pub fn as_str(&self) -> &'static str {
        match self {
            GitService::UploadPack => "git-upload-pack",
            GitService::ReceivePack => "git-receive-pack",
        }
    }

    /// The subcommand passed to the git binary (`git upload-pack ...`).
    pub fn subcommand(&self) -> &'static str {
        match self {
            GitService::UploadPack => "upload-pack",
            GitService::ReceivePack => "receive-pack",
        }
    }

    /// Parse a client-supplied service name. Anything other than the two
    /// known services is rejected, never spawned.
    pub fn parse(name: &str) -> Option<GitService> {
        match name {
            "git-upload-pack" => Some(GitService::UploadPack),
            "git-receive-pack" => Some(GitService::ReceivePack),
            _ => None,
        }
    }
}

impl fmt::Display for GitService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
