//! BDD coverage for the pipelines against the scripted cloud.

mod bdd_steps;
mod scenarios;
mod test_helpers;
