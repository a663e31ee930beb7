use anyhow::Result;
use sea_orm::{Database, DatabaseConnection};
use tracing::info;

pub async fn get_db_connection(database_url: &str) -> Result<DatabaseConnection> {
    info!("Connecting to database via Sea-ORM");
    let db = Database::connect(database_url).await?;
    Ok(db)
}
