mod demo;

use prize_wheel::database::create_database;
use prize_wheel::reports::generate_and_save_report;
use prize_wheel::utils::list_generated_reports;
use prize_wheel::{EventBus, SpinService};
use std::env;
use std::error::Error;
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .init();

    let db_path = env::var("PRIZE_WHEEL_DB_PATH").unwrap_or_else(|_| "data/prize_wheel.db".to_string());
    let report_path = env::var("PRIZE_WHEEL_REPORT_PATH").unwrap_or_else(|_| "reports".to_string());
    let spins = env::args()
        .nth(1)
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(5);

    let conn = create_database(&db_path)?;
    demo::seed_demo_data(&conn)?;

    let service = SpinService::with_events(Arc::new(Mutex::new(conn)), EventBus::default());
    demo::demonstrate_spins(&service, spins)?;

    println!("\n📋 Generating HTML report...");
    match generate_and_save_report(&service.lock(), &report_path) {
        Ok(path) => println!("✅ Report saved to {}", path.display()),
        Err(e) => println!("❌ Failed to generate report: {}", e),
    }

    for report in list_generated_reports(&report_path)? {
        println!("  📄 {}/{}", report_path, report);
    }

    Ok(())
}
