//! Task data model and dependency graph.

pub mod graph;
pub mod types;

pub use graph::{SubTaskGraph, SubTaskNode};
pub use types::{
    ExecutionResult, FailureInfo, SubTask, SubTaskId, SubTaskSnapshot, Task, TaskCategory, TaskId,
    TaskSnapshot, TaskStatus,
};
