mod cli;
mod infra;
mod report;
mod routes;
mod server;

use site_scanner::error::AppError;

pub async fn run() -> Result<(), AppError> {
    cli::run().await
}
