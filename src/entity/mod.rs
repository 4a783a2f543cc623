//! SeaORM entity definitions.

pub mod automation_script;
pub mod notification;
pub mod test_case;
pub mod test_run;
pub mod ticket;
pub mod user;
