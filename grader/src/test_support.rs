//! Test-only helpers for building namespaces and workspaces.

use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Mutex};

use crate::io::git::Git;
use crate::io::privilege::PrivilegeDropper;
use crate::registry::Namespace;

/// Build a namespace from `(name, body)` pairs, panicking on definition errors.
pub fn namespace(name: &str, problems: &[(&str, &str)]) -> Namespace {
    let mut builder = Namespace::builder(name).expect("valid namespace name");
    for (problem, body) in problems {
        builder = builder
            .problem(problem, body)
            .unwrap_or_else(|err| panic!("problem {problem} should compile: {err}"));
    }
    builder.build()
}

/// A transcript whose final answer is `answer`.
pub fn transcript(answer: &str) -> String {
    format!("Let me think about it.\n<answer>{answer}</answer>\n")
}

/// Initialise a repository in `dir` and commit `files` as a single commit.
pub fn commit_files(dir: &Path, message: &str, files: &[(&str, &str)]) -> Git {
    let git = Git::new(dir);
    if !git.is_repo() {
        git.init().expect("git init");
    }
    for (path, contents) in files {
        let path = dir.join(path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(&path, contents).expect("write file");
    }
    git.commit_all(message).expect("commit");
    git
}

/// Records requested uids and leaves commands unchanged.
#[derive(Debug, Default, Clone)]
pub struct RecordingDropper {
    pub uids: Arc<Mutex<Vec<Option<u32>>>>,
}

impl RecordingDropper {
    pub fn recorded(&self) -> Vec<Option<u32>> {
        self.uids.lock().expect("uids lock").clone()
    }
}

impl PrivilegeDropper for RecordingDropper {
    fn as_user(&self, cmd: Command, uid: Option<u32>) -> Command {
        self.uids.lock().expect("uids lock").push(uid);
        cmd
    }
}
