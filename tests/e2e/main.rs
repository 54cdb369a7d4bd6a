//! End-to-end scenarios driving the public registry API.

mod harness;
mod scenarios;
