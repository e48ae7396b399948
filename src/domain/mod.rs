pub mod sort;
pub mod task;
