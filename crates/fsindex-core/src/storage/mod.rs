pub mod command;
pub mod models;
pub mod queries;
pub mod sqlite;
pub mod worker;

pub use command::{CommandOutput, SqlCommand, Table};
pub use sqlite::Database;
pub use worker::{BatchReport, BatchTicket, CommandReply, StoreHandle};
