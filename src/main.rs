//! Tealeaf Exporter - entry point
//!
//! Runs one export-and-upload cycle, or keeps running on a timer when
//! `TEALEAF_INTERVAL_MINUTES` is set. All settings come from the
//! environment; see `AppConfig::from_env`.

use tracing::{error, info};

use tealeaf_exporter::scheduler::Scheduler;
use tealeaf_exporter::workflow::ExportRunner;
use tealeaf_exporter::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _guard = tealeaf_exporter::init_logging();

    info!("Starting tealeaf-exporter");
    if let Some(dir) = tealeaf_exporter::log_dir() {
        info!("Log files saved to: {}", dir.display());
    }

    let config = AppConfig::from_env()?;
    tealeaf_exporter::log_config(&config);

    let schedule = config.schedule.clone();
    let runner = ExportRunner::new(config)?;

    if schedule.enabled {
        let runner_ref = &runner;
        Scheduler::new(schedule)
            .run(move || {
                let runner = runner_ref;
                async move {
                    match runner.run().await {
                        Ok(report) => info!(
                            "Run complete ({} uploaded, {} pending)",
                            report.uploaded, report.skipped
                        ),
                        Err(e) => error!("Run failed: {}", e),
                    }
                }
            })
            .await;
        unreachable!("scheduler loop never returns");
    }

    let report = runner.run().await?;
    info!(
        "Done ({} uploaded, {} pending)",
        report.uploaded, report.skipped
    );
    Ok(())
}
