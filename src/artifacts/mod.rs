/// Artifact sinks and structured step records.
pub mod store;
