//! The file-operation planner: the artifact manifest a phase publishes once
//! its options are frozen for an action, and that its dependents query to
//! discover what it produces.

use std::path::PathBuf;

use crate::phase::PhaseId;

/// The semantic type tag carried by a [`FileData`] handle. `Other` covers
/// user-extensible tags (e.g. a foreign makefile format published by the
/// external-repository phase).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Source,
    Header,
    Object,
    Archive,
    SharedObject,
    Executable,
    Dir,
    SoftLink,
    PykeMakefile,
    CMakeMakefile,
    Other,
}

/// A typed handle to a file path, and (if any) the phase that produces it.
/// `None` means the file pre-exists / is external to the graph.
#[derive(Debug, Clone)]
pub struct FileData {
    pub path: PathBuf,
    pub kind: FileKind,
    pub generating_phase: Option<PhaseId>,
}

impl FileData {
    pub fn external(path: impl Into<PathBuf>, kind: FileKind) -> Self {
        FileData { path: path.into(), kind, generating_phase: None }
    }

    pub fn generated(path: impl Into<PathBuf>, kind: FileKind, phase: PhaseId) -> Self {
        FileData { path: path.into(), kind, generating_phase: Some(phase) }
    }
}

/// The kind of work a [`FileOperation`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Compile,
    Archive,
    Link,
    LinkToSharedObject,
    CreateDirectory,
    GenerateSoftLinks,
    SoftLink,
    Build,
    Generate,
}

/// One declared unit of planned work: its inputs, its outputs, and the
/// operation it represents. Appended to a phase's [`Plan`] during planning;
/// read-only thereafter.
#[derive(Debug, Clone)]
pub struct FileOperation {
    pub inputs: Vec<FileData>,
    pub outputs: Vec<FileData>,
    pub op: OpKind,
}

/// The ordered sequence of file operations a phase would perform for the
/// current action. Both the phase's own execution worklist and the
/// published manifest its dependents query.
#[derive(Debug, Clone, Default)]
pub struct Plan {
    operations: Vec<FileOperation>,
}

impl Plan {
    pub fn new() -> Self {
        Plan::default()
    }

    /// Appends an operation. `create directory` operations are deduplicated
    /// by output path, per the idempotence invariant.
    pub fn push(&mut self, op: FileOperation) {
        if op.op == OpKind::CreateDirectory {
            let path = &op.outputs[0].path;
            if self
                .operations
                .iter()
                .any(|existing| existing.op == OpKind::CreateDirectory && &existing.outputs[0].path == path)
            {
                return;
            }
        }
        self.operations.push(op);
    }

    pub fn operations(&self) -> &[FileOperation] {
        &self.operations
    }

    /// Queries all outputs tagged `kind` across every operation in this
    /// plan. This is the sole mechanism by which a dependent phase
    /// discovers a dependency's artifacts.
    pub fn outputs_of_kind(&self, kind: FileKind) -> Vec<&FileData> {
        self.operations
            .iter()
            .flat_map(|op| op.outputs.iter())
            .filter(|f| f.kind == kind)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_directory_is_deduplicated() {
        let mut plan = Plan::new();
        let push_mkdir = |plan: &mut Plan| {
            plan.push(FileOperation {
                inputs: vec![],
                outputs: vec![FileData::external("build/int", FileKind::Dir)],
                op: OpKind::CreateDirectory,
            });
        };
        push_mkdir(&mut plan);
        push_mkdir(&mut plan);
        assert_eq!(
            plan.operations()
                .iter()
                .filter(|o| o.op == OpKind::CreateDirectory)
                .count(),
            1
        );
    }

    #[test]
    fn outputs_of_kind_filters_across_operations() {
        let mut plan = Plan::new();
        plan.push(FileOperation {
            inputs: vec![],
            outputs: vec![FileData::external("build/int/a.o", FileKind::Object)],
            op: OpKind::Compile,
        });
        plan.push(FileOperation {
            inputs: vec![],
            outputs: vec![FileData::external("build/int/b.o", FileKind::Object)],
            op: OpKind::Compile,
        });
        assert_eq!(plan.outputs_of_kind(FileKind::Object).len(), 2);
        assert_eq!(plan.outputs_of_kind(FileKind::Archive).len(), 0);
    }
}
