pub mod namespace;
pub mod run;
