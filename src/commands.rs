//! One module per `lab` subcommand, each adding a `cmd_*` method to [`App`](crate::App).

pub mod ci;
pub mod mr_checkout;
pub mod todo;
