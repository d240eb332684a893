pub mod maintenance;
pub mod pickup;

pub use maintenance::{cmd_redeliver, cmd_sweep};
pub use pickup::{
    cmd_cancel, cmd_complete, cmd_confirm, cmd_create, cmd_list, cmd_present, cmd_propose,
    cmd_request_token, cmd_show,
};

use serde::Serialize;

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
