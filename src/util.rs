pub mod fixed;
pub mod year_ext;
