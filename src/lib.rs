pub mod cache;
pub mod catalog;
pub mod constants;
pub mod dataset;
pub mod exec;
pub mod expr;
pub mod frame;
pub mod functors;
pub mod matcher;
pub mod skyframe_errors;
