pub mod prune;
pub mod resume;
pub mod run;
pub mod status;
