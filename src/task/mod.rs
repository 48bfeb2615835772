//! Bounty tasks and their workflow.

mod core;
mod endpoints;

pub use core::{
    BountyTask, NewTask, TaskStatus, TaskUpdate, create_task, create_task_table, delete_task,
    get_task, list_tasks, update_task,
};
pub use endpoints::{
    TaskState, create_task_endpoint, delete_task_endpoint, get_task_endpoint,
    list_tasks_endpoint, update_task_endpoint,
};
