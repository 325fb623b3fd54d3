pub mod check;
pub mod render;
pub mod run;
pub mod types;
