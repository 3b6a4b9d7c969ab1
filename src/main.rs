use clap::Parser;
use colorpage::config::setup_logging;
use sea_orm_migration::MigratorTrait;
use tracing::error;

#[tokio::main(flavor = "multi_thread")]
async fn main() {
    let cli = colorpage::cli::CliOptions::parse();

    if let Err(err) = setup_logging(cli.debug) {
        eprintln!("Failed to set up logging: {}", err);
        return;
    }

    let database_path = cli
        .database_path
        .clone()
        .unwrap_or_else(|| "colorpage.sqlite".to_string());

    let db = match colorpage::db::connect_db(&database_path).await {
        Ok(db) => db,
        Err(err) => {
            error!("Database connection error: {}", err);
            return;
        }
    };

    if let Err(err) = colorpage::db::migrations::Migrator::up(&db, None).await {
        error!("Database migration error: {}", err);
        return;
    }

    if let Err(err) = colorpage::web::setup_server(&cli, db).await {
        error!("Application error: {}", err);
    }
}
