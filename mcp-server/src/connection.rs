use anyhow::Result;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

pub fn conn(database_url: &str) -> Result<Arc<Mutex<Connection>>> {
    // Opens the file and makes sure every table exists.
    let conn = prize_wheel::database::create_database(database_url)?;

    Ok(Arc::new(Mutex::new(conn)))
}
