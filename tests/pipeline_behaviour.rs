//! Behavioural scenarios for the backup, restore and delete pipelines.

mod pipeline;
